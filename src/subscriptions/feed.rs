//! Client-side subscription feed.

use super::types::{FeedEvent, OrderPolicy, Query, SubscriptionId};
use crate::error::{CollectionError, Result};
use crate::remote::{DocumentStore, PushStream};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opens push subscriptions and turns them into ordered snapshot feeds.
pub struct SubscriptionFeed {
    store: Arc<dyn DocumentStore>,
    next_id: AtomicU64,
}

impl SubscriptionFeed {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(1),
        }
    }

    /// Acquire a subscription handle.
    ///
    /// The handle owns the remote channel; it is released exactly once, by
    /// [`FeedHandle::unsubscribe`] or when the handle is dropped.
    pub async fn subscribe(&self, query: Query, order: OrderPolicy) -> Result<FeedHandle> {
        let stream = self
            .store
            .subscribe(&query)
            .await
            .map_err(|e| CollectionError::Subscription(e.to_string()))?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        tracing::debug!(subscription = id.0, collection = %query.collection, "subscribed");

        Ok(FeedHandle {
            id,
            query,
            order,
            stream: Some(stream),
        })
    }
}

/// An acquired subscription.
pub struct FeedHandle {
    id: SubscriptionId,
    query: Query,
    order: OrderPolicy,
    /// None once released or failed.
    stream: Option<PushStream>,
}

impl FeedHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Wait for the next event.
    ///
    /// Every snapshot is the complete, ordered result set. A failed channel
    /// yields one [`FeedEvent::Error`], and a channel the store closed yields
    /// `Error(Closed)`. After either this returns `None`.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        let stream = self.stream.as_mut()?;
        match stream.next().await {
            Some(Ok(mut records)) => {
                self.order.sort(&mut records);
                Some(FeedEvent::Snapshot(records))
            }
            Some(Err(e)) => {
                self.release();
                Some(FeedEvent::Error(CollectionError::Subscription(e.to_string())))
            }
            None => {
                self.release();
                Some(FeedEvent::Error(CollectionError::Closed))
            }
        }
    }

    /// Stop delivery and release the remote channel.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(
                subscription = self.id.0,
                collection = %self.query.collection,
                "released"
            );
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDocumentStore;
    use crate::types::{Fields, NewDocument, Record, RecordId, Timestamp};
    use serde_json::json;

    fn snapshot(event: FeedEvent) -> Vec<Record> {
        match event {
            FeedEvent::Snapshot(records) => records,
            FeedEvent::Error(e) => panic!("Expected snapshot, got {:?}", e),
        }
    }

    fn remote_record(id: &str, created: i64) -> Record {
        Record {
            id: RecordId::new(id),
            fields: Fields::new(),
            asset_url: None,
            created_at: Timestamp(created),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_snapshots_are_ordered() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.apply_remote("post", |docs| {
            for (id, created) in [("b", 2), ("a", 3), ("c", 1)] {
                docs.insert(RecordId::new(id), remote_record(id, created));
            }
        });

        let feed = SubscriptionFeed::new(store.clone());
        let mut handle = feed
            .subscribe(Query::collection("post"), OrderPolicy::CreatedDesc)
            .await
            .unwrap();

        let records = snapshot(handle.next().await.unwrap());
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_each_emission_replaces_the_previous() {
        let store = Arc::new(MemoryDocumentStore::new());
        let feed = SubscriptionFeed::new(store.clone());
        let mut handle = feed
            .subscribe(Query::collection("post"), OrderPolicy::CreatedAsc)
            .await
            .unwrap();
        assert!(snapshot(handle.next().await.unwrap()).is_empty());

        let mut fields = Fields::new();
        fields.insert("mensaje".into(), json!("hola"));
        let id = store
            .add_document(
                "post",
                NewDocument {
                    fields,
                    asset_url: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(snapshot(handle.next().await.unwrap()).len(), 1);

        store.remove_remote("post", &id);
        assert!(snapshot(handle.next().await.unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_channel_failure_is_an_explicit_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let feed = SubscriptionFeed::new(store.clone());
        let mut handle = feed
            .subscribe(Query::collection("post"), OrderPolicy::CreatedAsc)
            .await
            .unwrap();
        handle.next().await.unwrap();

        store.break_subscriptions("connection reset");

        assert!(matches!(
            handle.next().await,
            Some(FeedEvent::Error(CollectionError::Subscription(_)))
        ));
        assert!(!handle.is_open());
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_failure() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_next_subscribes(1);
        let feed = SubscriptionFeed::new(store.clone());

        let result = feed
            .subscribe(Query::collection("post"), OrderPolicy::CreatedAsc)
            .await;
        assert!(matches!(result, Err(CollectionError::Subscription(_))));
    }

    #[tokio::test]
    async fn test_dropped_by_store_reports_closed() {
        let store = Arc::new(MemoryDocumentStore::with_buffer_size(1));
        let feed = SubscriptionFeed::new(store.clone());
        let mut handle = feed
            .subscribe(Query::collection("post"), OrderPolicy::CreatedAsc)
            .await
            .unwrap();

        // The initial snapshot fills the buffer, so this push drops us.
        store.insert_remote("post", remote_record("x", 1));
        assert_eq!(store.subscription_count(), 0);

        assert!(snapshot(handle.next().await.unwrap()).is_empty());
        assert!(matches!(
            handle.next().await,
            Some(FeedEvent::Error(CollectionError::Closed))
        ));
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_remote_channel() {
        let store = Arc::new(MemoryDocumentStore::new());
        let feed = SubscriptionFeed::new(store.clone());
        let handle = feed
            .subscribe(Query::collection("post"), OrderPolicy::CreatedAsc)
            .await
            .unwrap();
        assert_eq!(store.subscription_count(), 1);

        handle.unsubscribe();

        // The registry notices the closed client on its next broadcast.
        store.insert_remote("post", remote_record("x", 1));
        assert_eq!(store.subscription_count(), 0);
    }
}
