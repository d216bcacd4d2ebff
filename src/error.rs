//! Error types for live collections.

use crate::types::{AssetKey, RecordId};
use thiserror::Error;

/// Failure reported by a remote collaborator (document store or binary store).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("remote object not found: {0}")]
    NotFound(String),

    #[error("remote rejected request: {0}")]
    Rejected(String),
}

/// Result type for remote collaborator calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Main error type for controller, feed and sequencer operations.
#[derive(Clone, Debug, Error)]
pub enum CollectionError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("upload of {key} failed: {source}")]
    Upload {
        key: AssetKey,
        #[source]
        source: RemoteError,
    },

    #[error("write failed: {0}")]
    Write(#[source] RemoteError),

    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("permission denied: no authenticated user")]
    PermissionDenied,

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("another edit is in progress ({0})")]
    EditInProgress(String),

    #[error("no active draft")]
    NoDraft,

    #[error("illegal attempt transition: {0}")]
    IllegalTransition(String),

    #[error("feed is closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("asset store is locked by another process")]
    Locked,
}

/// Flat classification of [`CollectionError`] for presentation code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Upload,
    Write,
    Subscription,
    PermissionDenied,
    NotFound,
    EditInProgress,
    NoDraft,
    Internal,
}

impl CollectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollectionError::Validation(_) => ErrorKind::Validation,
            CollectionError::Upload { .. } => ErrorKind::Upload,
            CollectionError::Write(_) => ErrorKind::Write,
            CollectionError::Subscription(_) | CollectionError::Closed => ErrorKind::Subscription,
            CollectionError::PermissionDenied => ErrorKind::PermissionDenied,
            CollectionError::NotFound(_) => ErrorKind::NotFound,
            CollectionError::EditInProgress(_) => ErrorKind::EditInProgress,
            CollectionError::NoDraft => ErrorKind::NoDraft,
            CollectionError::IllegalTransition(_)
            | CollectionError::Serialization(_)
            | CollectionError::Io(_)
            | CollectionError::Corruption(_)
            | CollectionError::Locked => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for CollectionError {
    fn from(e: serde_json::Error) -> Self {
        CollectionError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for CollectionError {
    fn from(e: std::io::Error) -> Self {
        CollectionError::Io(e.to_string())
    }
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

/// Structured authentication failure, replacing provider-specific error codes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredential,

    #[error("no account exists for this email")]
    UserNotFound,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("email already registered")]
    EmailAlreadyInUse,

    #[error("password too weak")]
    WeakPassword,

    #[error("authentication failed: {0}")]
    Other(String),
}

impl AuthError {
    /// Classify a provider error code such as `auth/wrong-password`.
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "auth/invalid-credential" | "auth/wrong-password" => AuthError::InvalidCredential,
            "auth/user-not-found" => AuthError::UserNotFound,
            "auth/invalid-email" => AuthError::InvalidEmail,
            "auth/email-already-in-use" => AuthError::EmailAlreadyInUse,
            "auth/weak-password" => AuthError::WeakPassword,
            other => AuthError::Other(other.to_string()),
        }
    }
}
