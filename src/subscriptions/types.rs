//! Subscription types for live collections.

use crate::error::CollectionError;
use crate::types::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A collection query the remote store can push snapshots for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,

    /// Equality filter on one field (None = whole collection).
    pub filter: Option<FieldFilter>,
}

/// Equality filter on a single field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub equals: serde_json::Value,
}

impl Query {
    /// Every document of a collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filter: None,
        }
    }

    /// Restrict to documents whose `field` equals `value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            equals: value,
        });
        self
    }

    /// Check if a record of this query's collection matches the filter.
    pub fn matches(&self, record: &Record) -> bool {
        match &self.filter {
            Some(filter) => record.fields.get(&filter.field) == Some(&filter.equals),
            None => true,
        }
    }
}

/// Deterministic ordering applied to every snapshot.
///
/// All policies break ties by record id, so two snapshots with the same
/// contents always come out in the same order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Newest first.
    #[default]
    CreatedDesc,
    /// Oldest first.
    CreatedAsc,
    /// By a field value; records missing the field sort last.
    Field { name: String, descending: bool },
}

impl OrderPolicy {
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = match self {
            OrderPolicy::CreatedDesc => b.created_at.cmp(&a.created_at),
            OrderPolicy::CreatedAsc => a.created_at.cmp(&b.created_at),
            OrderPolicy::Field { name, descending } => {
                match (a.fields.get(name), b.fields.get(name)) {
                    (Some(x), Some(y)) => {
                        let ord = compare_values(x, y);
                        if *descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// Sort a snapshot in place.
    pub fn sort(&self, records: &mut [Record]) {
        records.sort_by(|a, b| self.compare(a, b));
    }

    /// Position at which `record` would be inserted into an already sorted slice.
    pub fn insertion_point(&self, records: &[Record], record: &Record) -> usize {
        records.partition_point(|existing| self.compare(existing, record) == Ordering::Less)
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value;

    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        // Compound values only need a stable order.
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Events delivered by a [`FeedHandle`](super::FeedHandle).
#[derive(Clone, Debug)]
pub enum FeedEvent {
    /// Full, ordered replacement of the query's result set.
    Snapshot(Vec<Record>),
    /// The push channel failed. No further events follow on this handle.
    Error(CollectionError),
}
