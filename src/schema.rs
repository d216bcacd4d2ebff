//! Collection schemas: the per-collection settings of a controller.

use crate::error::{CollectionError, Result};
use crate::subscriptions::{OrderPolicy, Query};
use crate::types::Fields;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// How a required field is checked and normalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Non-blank string.
    Text,
    /// Finite number; numeric strings are converted.
    Number,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
}

/// Settings of one live collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Remote collection name.
    pub name: String,

    /// Fields every record must carry.
    pub required: Vec<FieldRule>,

    /// Order of the visible list.
    pub order: OrderPolicy,

    /// Object-store folder for this collection's assets.
    pub asset_folder: String,

    /// Reject creates that carry no asset.
    pub asset_required_on_create: bool,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            asset_folder: name.clone(),
            name,
            required: Vec::new(),
            order: OrderPolicy::default(),
            asset_required_on_create: false,
        }
    }

    /// The product catalog.
    pub fn products() -> Self {
        Self::new("productos")
            .text("titulo")
            .text("descripcion")
            .text("categoria")
            .number("precio")
            .ordered_by(OrderPolicy::CreatedDesc)
            .require_asset()
    }

    /// The message board.
    pub fn messages() -> Self {
        Self::new("post")
            .text("mensaje")
            .ordered_by(OrderPolicy::CreatedAsc)
    }

    pub fn text(mut self, name: impl Into<String>) -> Self {
        self.required.push(FieldRule {
            name: name.into(),
            kind: FieldKind::Text,
        });
        self
    }

    pub fn number(mut self, name: impl Into<String>) -> Self {
        self.required.push(FieldRule {
            name: name.into(),
            kind: FieldKind::Number,
        });
        self
    }

    pub fn ordered_by(mut self, order: OrderPolicy) -> Self {
        self.order = order;
        self
    }

    pub fn with_asset_folder(mut self, folder: impl Into<String>) -> Self {
        self.asset_folder = folder.into();
        self
    }

    pub fn require_asset(mut self) -> Self {
        self.asset_required_on_create = true;
        self
    }

    /// Query covering the whole collection.
    pub fn query(&self) -> Query {
        Query::collection(self.name.clone())
    }

    /// Check a creation payload and return its normalized fields.
    pub fn validate_create(&self, fields: &Fields, has_asset: bool) -> Result<Fields> {
        let mut normalized = fields.clone();
        for rule in &self.required {
            let value = fields.get(&rule.name).ok_or_else(|| missing(&rule.name))?;
            normalized.insert(rule.name.clone(), normalize(rule, value)?);
        }
        if self.asset_required_on_create && !has_asset {
            return Err(CollectionError::Validation(format!(
                "an asset is required to create a {} record",
                self.name
            )));
        }
        Ok(normalized)
    }

    /// Check the changed fields of a partial update.
    ///
    /// Only the fields present are checked: a required field may be omitted
    /// but not blanked.
    pub fn validate_update(&self, changed: &Fields) -> Result<Fields> {
        let mut normalized = changed.clone();
        for rule in &self.required {
            if let Some(value) = changed.get(&rule.name) {
                normalized.insert(rule.name.clone(), normalize(rule, value)?);
            }
        }
        Ok(normalized)
    }
}

fn missing(name: &str) -> CollectionError {
    CollectionError::Validation(format!("missing required field `{}`", name))
}

fn normalize(rule: &FieldRule, value: &Value) -> Result<Value> {
    match rule.kind {
        FieldKind::Text => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(value.clone()),
            Value::String(_) | Value::Null => Err(missing(&rule.name)),
            _ => Err(CollectionError::Validation(format!(
                "field `{}` must be text",
                rule.name
            ))),
        },
        FieldKind::Number => {
            let parsed = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) if s.trim().is_empty() => return Err(missing(&rule.name)),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Null => return Err(missing(&rule.name)),
                _ => None,
            };
            match parsed.filter(|n| n.is_finite()) {
                Some(n) => Ok(number_value(n)),
                None => Err(CollectionError::Validation(format!(
                    "field `{}` must be a number",
                    rule.name
                ))),
            }
        }
    }
}

/// Integral values stay integers so `20` and `"20"` normalize identically.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
