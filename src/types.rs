//! Core types for live collections.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field values of a record, keyed by field name.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Opaque document identifier (assigned by the remote store).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    pub fn as_millis(&self) -> i64 {
        self.0 / 1000
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A persisted item of a remote collection (a product or a message).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Server-assigned, immutable.
    pub id: RecordId,

    pub fields: Fields,

    /// Retrieval URL of the attached asset. Always points at a stored object.
    pub asset_url: Option<String>,

    /// Server creation time.
    pub created_at: Timestamp,

    /// Server time of the last update, if ever updated.
    pub updated_at: Option<Timestamp>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// True if every field of `fields` is present here with the same value.
    pub fn contains_fields(&self, fields: &Fields) -> bool {
        fields
            .iter()
            .all(|(name, value)| self.fields.get(name) == Some(value))
    }
}

/// Payload for a document creation write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewDocument {
    pub fields: Fields,
    pub asset_url: Option<String>,
}

/// Partial update of a document.
///
/// Fields absent from `fields` are left as they are; `asset_url: None` leaves
/// the stored URL untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentPatch {
    pub fields: Fields,
    pub asset_url: Option<String>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.asset_url.is_none()
    }
}

/// SHA-256 digest of asset content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({}...)", &self.to_hex()[..8])
    }
}

/// A binary asset selected for upload (e.g. a product image).
#[derive(Clone, Debug, PartialEq)]
pub struct AssetPayload {
    /// Original file name, used as the readable tail of the storage key.
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl AssetPayload {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::from_bytes(&self.bytes)
    }
}

/// Object-store key of an uploaded asset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey(pub String);

impl AssetKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one successful upload attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadResult {
    pub key: AssetKey,
    pub url: String,
}

/// The authenticated user, as reported by the auth service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl User {
    /// Display name, falling back to the email, then to a generic label.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("user")
    }
}
