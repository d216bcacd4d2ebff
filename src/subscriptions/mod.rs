//! Live subscriptions to remote collections.
//!
//! Two sides:
//! - [`SubscriptionRegistry`] is the push side, used by document stores to
//!   broadcast full snapshots to their subscribers.
//! - [`SubscriptionFeed`] is the client side. It acquires a [`FeedHandle`]
//!   that yields ordered snapshots and an explicit error when the channel
//!   fails.
//!
//! # Example
//!
//! ```ignore
//! let feed = SubscriptionFeed::new(store);
//! let mut handle = feed
//!     .subscribe(Query::collection("productos"), OrderPolicy::CreatedDesc)
//!     .await?;
//!
//! while let Some(event) = handle.next().await {
//!     match event {
//!         FeedEvent::Snapshot(records) => render(records),
//!         FeedEvent::Error(e) => break,
//!     }
//! }
//! handle.unsubscribe();
//! ```

mod feed;
mod registry;
mod types;

pub use feed::{FeedHandle, SubscriptionFeed};
pub use registry::SubscriptionRegistry;
pub use types::{FeedEvent, FieldFilter, OrderPolicy, Query, SubscriptionId};
