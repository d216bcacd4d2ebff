//! Remote collaborators consumed by the controller.
//!
//! - [`DocumentStore`]: push-subscribable document collections
//! - [`BinaryStore`]: object storage for assets
//! - [`AuthService`]: the identity provider
//!
//! In-memory implementations of all three are provided for embedding and
//! tests; [`FsBinaryStore`](crate::assets::FsBinaryStore) stores assets on disk.

mod auth;
mod documents;
mod objects;

pub use auth::MemoryAuth;
pub use documents::{CallCounts, MemoryDocumentStore};
pub use objects::MemoryBinaryStore;

use crate::error::{AuthError, RemoteResult};
use crate::subscriptions::Query;
use crate::types::{AssetKey, AssetPayload, DocumentPatch, NewDocument, Record, RecordId, User};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of full snapshots pushed for one subscription.
///
/// Snapshots are unordered; ordering is applied by the subscription feed.
pub type PushStream = Pin<Box<dyn Stream<Item = RemoteResult<Vec<Record>>> + Send>>;

/// Remote document collection API.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a push subscription. The first item is the current result set.
    async fn subscribe(&self, query: &Query) -> RemoteResult<PushStream>;

    /// Insert a document; the server assigns the id and creation time.
    async fn add_document(&self, collection: &str, document: NewDocument) -> RemoteResult<RecordId>;

    /// Merge `patch` into an existing document.
    ///
    /// Returns `RemoteError::NotFound` if the document does not exist.
    async fn update_document(
        &self,
        collection: &str,
        id: &RecordId,
        patch: DocumentPatch,
    ) -> RemoteResult<()>;

    /// Remove a document. May return `RemoteError::NotFound` for a missing id.
    async fn delete_document(&self, collection: &str, id: &RecordId) -> RemoteResult<()>;
}

/// Remote object storage API.
#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Store `payload` under `key`.
    async fn put(&self, key: &AssetKey, payload: &AssetPayload) -> RemoteResult<()>;

    /// Resolve the retrieval URL of a stored object.
    async fn get_url(&self, key: &AssetKey) -> RemoteResult<String>;

    /// Name of the backend for logging.
    fn backend_name(&self) -> &'static str;
}

/// Identity provider.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// The signed-in user, if any. Never performs a network call.
    fn current_user(&self) -> Option<User>;

    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, AuthError>;

    async fn logout(&self) -> Result<(), AuthError>;
}
