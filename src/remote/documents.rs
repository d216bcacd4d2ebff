//! In-memory document store with push subscriptions.

use super::{DocumentStore, PushStream};
use crate::error::{RemoteError, RemoteResult};
use crate::subscriptions::{Query, SubscriptionRegistry};
use crate::types::{DocumentPatch, NewDocument, Record, RecordId, Timestamp};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Number of calls received per operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub subscribe: usize,
    pub add: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.subscribe + self.add + self.update + self.delete
    }

    pub fn writes(&self) -> usize {
        self.add + self.update + self.delete
    }
}

#[derive(Default)]
struct Counters {
    subscribe: AtomicUsize,
    add: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

/// Injected failures, consumed one per call.
#[derive(Default)]
struct Faults {
    subscribe_failures: u32,
    write_failures: u32,
    write_latency: Option<Duration>,
}

struct Inner {
    collections: HashMap<String, HashMap<RecordId, Record>>,
    /// Last server timestamp handed out; keeps creation times strictly increasing.
    last_timestamp: i64,
}

impl Inner {
    fn next_timestamp(&mut self) -> Timestamp {
        let now = Timestamp::now().0.max(self.last_timestamp + 1);
        self.last_timestamp = now;
        Timestamp(now)
    }
}

/// Document store kept in process memory.
///
/// Every mutation is broadcast as a full snapshot to the subscribers of the
/// touched collection while the store lock is held, so subscribers observe
/// snapshots in mutation order. [`apply_remote`](Self::apply_remote) applies
/// several changes under one notification, the way a real backend coalesces.
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
    registry: SubscriptionRegistry,
    faults: Mutex<Faults>,
    counters: Counters,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_registry(SubscriptionRegistry::new())
    }

    /// Store whose subscribers are dropped once `buffer_size` snapshots are pending.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self::with_registry(SubscriptionRegistry::with_buffer_size(buffer_size))
    }

    fn with_registry(registry: SubscriptionRegistry) -> Self {
        Self {
            inner: Mutex::new(Inner {
                collections: HashMap::new(),
                last_timestamp: 0,
            }),
            registry,
            faults: Mutex::new(Faults::default()),
            counters: Counters::default(),
        }
    }

    // --- Inspection ---

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            subscribe: self.counters.subscribe.load(Ordering::SeqCst),
            add: self.counters.add.load(Ordering::SeqCst),
            update: self.counters.update.load(Ordering::SeqCst),
            delete: self.counters.delete.load(Ordering::SeqCst),
        }
    }

    pub fn document(&self, collection: &str, id: &RecordId) -> Option<Record> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    pub fn documents(&self, collection: &str) -> Vec<Record> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    // --- Fault injection ---

    /// Fail the next `n` subscribe calls.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.faults.lock().subscribe_failures = n;
    }

    /// Fail the next `n` add/update/delete calls.
    pub fn fail_next_writes(&self, n: u32) {
        self.faults.lock().write_failures = n;
    }

    /// Delay every write by `latency` before it is applied.
    pub fn set_write_latency(&self, latency: Option<Duration>) {
        self.faults.lock().write_latency = latency;
    }

    /// Break every open push channel.
    pub fn break_subscriptions(&self, reason: &str) {
        self.registry
            .fail_all(RemoteError::Unavailable(reason.to_string()));
    }

    // --- Changes made by other clients ---

    /// Apply an arbitrary change to a collection and notify once.
    pub fn apply_remote<F>(&self, collection: &str, change: F)
    where
        F: FnOnce(&mut HashMap<RecordId, Record>),
    {
        let mut inner = self.inner.lock();
        let docs = inner
            .collections
            .entry(collection.to_string())
            .or_default();
        change(docs);
        self.registry.broadcast(collection, docs);
    }

    /// Insert or replace a document as another client would.
    pub fn insert_remote(&self, collection: &str, record: Record) {
        self.apply_remote(collection, |docs| {
            docs.insert(record.id.clone(), record);
        });
    }

    /// Remove a document as another client would.
    pub fn remove_remote(&self, collection: &str, id: &RecordId) {
        self.apply_remote(collection, |docs| {
            docs.remove(id);
        });
    }

    // --- Internal ---

    async fn before_write(&self) -> RemoteResult<()> {
        let latency = {
            let mut faults = self.faults.lock();
            if faults.write_failures > 0 {
                faults.write_failures -= 1;
                return Err(RemoteError::Unavailable("injected write failure".into()));
            }
            faults.write_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn subscribe(&self, query: &Query) -> RemoteResult<PushStream> {
        self.counters.subscribe.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.lock();
            if faults.subscribe_failures > 0 {
                faults.subscribe_failures -= 1;
                return Err(RemoteError::Unavailable("injected subscribe failure".into()));
            }
        }

        let mut inner = self.inner.lock();
        let docs = inner
            .collections
            .entry(query.collection.clone())
            .or_default();
        let (_, stream) = self.registry.subscribe(query.clone(), docs);
        Ok(stream)
    }

    async fn add_document(
        &self,
        collection: &str,
        document: NewDocument,
    ) -> RemoteResult<RecordId> {
        self.counters.add.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;

        let mut inner = self.inner.lock();
        let created_at = inner.next_timestamp();
        let id = RecordId(uuid::Uuid::new_v4().simple().to_string());
        let record = Record {
            id: id.clone(),
            fields: document.fields,
            asset_url: document.asset_url,
            created_at,
            updated_at: None,
        };

        let docs = inner
            .collections
            .entry(collection.to_string())
            .or_default();
        docs.insert(id.clone(), record);
        self.registry.broadcast(collection, docs);
        Ok(id)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &RecordId,
        patch: DocumentPatch,
    ) -> RemoteResult<()> {
        self.counters.update.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;

        let mut inner = self.inner.lock();
        let updated_at = inner.next_timestamp();
        let docs = inner
            .collections
            .entry(collection.to_string())
            .or_default();
        let record = docs
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", collection, id)))?;

        record.fields.extend(patch.fields);
        if let Some(url) = patch.asset_url {
            record.asset_url = Some(url);
        }
        record.updated_at = Some(updated_at);

        self.registry.broadcast(collection, docs);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &RecordId) -> RemoteResult<()> {
        self.counters.delete.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;

        let mut inner = self.inner.lock();
        let docs = inner
            .collections
            .entry(collection.to_string())
            .or_default();
        if docs.remove(id).is_none() {
            return Err(RemoteError::NotFound(format!("{}/{}", collection, id)));
        }
        self.registry.broadcast(collection, docs);
        Ok(())
    }
}
