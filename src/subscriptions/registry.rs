//! Push-side subscription registry.
//!
//! Tracks the open subscriptions of a document store and broadcasts full
//! snapshots to every subscriber whose query covers a changed collection.
//! Buffers are bounded; a subscriber whose buffer is full is dropped, which
//! ends its stream and lets the client resubscribe for a fresh snapshot.

use crate::error::{RemoteError, RemoteResult};
use crate::types::{Record, RecordId};
use futures::stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::types::{Query, SubscriptionId};
use crate::remote::PushStream;

/// Default snapshots buffered per subscriber.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

type Delivery = RemoteResult<Vec<Record>>;

/// Internal subscriber state.
struct Subscriber {
    query: Query,
    sender: mpsc::Sender<Delivery>,
}

impl Subscriber {
    /// Try to deliver. Returns false if the buffer is full or the client is gone.
    fn try_send(&self, delivery: Delivery) -> bool {
        match self.sender.try_send(delivery) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn snapshot(&self, documents: &HashMap<RecordId, Record>) -> Vec<Record> {
        documents
            .values()
            .filter(|record| self.query.matches(record))
            .cloned()
            .collect()
    }
}

/// Registry of live subscriptions.
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a subscription and deliver its initial snapshot.
    ///
    /// `documents` must be the current contents of the query's collection,
    /// read under the same lock that serializes mutations.
    pub fn subscribe(
        &self,
        query: Query,
        documents: &HashMap<RecordId, Record>,
    ) -> (SubscriptionId, PushStream) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(self.buffer_size);

        let subscriber = Subscriber { query, sender };
        let initial = subscriber.snapshot(documents);
        // Fresh buffer, cannot be full.
        subscriber.try_send(Ok(initial));

        self.subscriptions.write().insert(id, subscriber);

        let stream: PushStream = Box::pin(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|delivery| (delivery, receiver))
        }));
        (id, stream)
    }

    /// Remove a subscription. Its stream ends once buffered snapshots drain.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.write().remove(&id);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Broadcast the new state of `collection` to every matching subscriber.
    pub fn broadcast(&self, collection: &str, documents: &HashMap<RecordId, Record>) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.query.collection != collection {
                    continue;
                }
                if !sub.try_send(Ok(sub.snapshot(documents))) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if subs.remove(&id).is_some() {
                    tracing::debug!(subscription = id.0, collection, "dropped lagging subscriber");
                }
            }
        }
    }

    /// Fail every open subscription with `error` and forget them all.
    pub fn fail_all(&self, error: RemoteError) {
        let drained: Vec<_> = self.subscriptions.write().drain().collect();
        for (id, sub) in drained {
            // Best effort; a full buffer still ends the stream when `sub` drops.
            let _ = sub.sender.try_send(Err(error.clone()));
            tracing::debug!(subscription = id.0, %error, "subscription failed");
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
