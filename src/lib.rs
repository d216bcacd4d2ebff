//! # Live Collection
//!
//! Keeps a local, ordered list in sync with a remote document collection
//! through a push subscription, while the user edits records inline and
//! writes run as multi-step sequences (asset upload, then document write).
//!
//! ## Core Concepts
//!
//! - **Feed**: push subscription yielding full, ordered snapshots
//! - **Edit session**: a single slot holding at most one local draft
//! - **Upload pipeline**: store bytes under a fresh key, resolve a URL
//! - **Write sequencer**: permission gate, validation, upload, write
//! - **Controller**: composes the above into a live list with CRUD
//!
//! ## Example
//!
//! ```ignore
//! use live_collection::{
//!     CollectionSchema, ControllerConfig, LiveCollectionController, MemoryAuth,
//!     MemoryBinaryStore, MemoryDocumentStore,
//! };
//!
//! let controller = LiveCollectionController::new(
//!     CollectionSchema::products(),
//!     Arc::new(MemoryDocumentStore::new()),
//!     Arc::new(MemoryBinaryStore::new()),
//!     Arc::new(MemoryAuth::signed_in(user)),
//!     ControllerConfig::default(),
//! );
//! controller.start().await?;
//!
//! // Create a product with its image
//! let id = controller.create(fields, Some(image)).await?;
//!
//! // Edit it inline
//! controller.begin_edit(&id)?;
//! controller.edit_field("precio", json!(99))?;
//! controller.commit_edit().await?;
//!
//! let mut changes = controller.watch();
//! changes.changed().await?;
//! render(&changes.borrow().records);
//! ```

pub mod assets;
pub mod board;
pub mod config;
pub mod controller;
pub mod edit;
pub mod error;
pub mod remote;
pub mod schema;
pub mod subscriptions;
pub mod types;
pub mod writes;

// Re-exports
pub use assets::{fresh_key, AssetUploadPipeline, FsBinaryStore, FsBinaryStoreConfig, StoredAsset};
pub use board::{Message, MessageBoard};
pub use config::{BackoffConfig, ControllerConfig};
pub use controller::{ListView, LiveCollectionController};
pub use edit::{DraftTicket, EditDraft, EditSession};
pub use error::{AuthError, CollectionError, ErrorKind, RemoteError, RemoteResult, Result};
pub use remote::{
    AuthService, BinaryStore, CallCounts, DocumentStore, MemoryAuth, MemoryBinaryStore,
    MemoryDocumentStore, PushStream,
};
pub use schema::{CollectionSchema, FieldKind, FieldRule};
pub use subscriptions::{
    FeedEvent, FeedHandle, FieldFilter, OrderPolicy, Query, SubscriptionFeed, SubscriptionId,
    SubscriptionRegistry,
};
pub use types::*;
pub use writes::{AttemptState, IdLocks, PlannedWrite, WriteAttempt, WriteReceipt, WriteSequencer};
