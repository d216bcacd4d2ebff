//! In-memory object store.

use super::BinaryStore;
use crate::error::{RemoteError, RemoteResult};
use crate::types::{AssetKey, AssetPayload, ContentDigest};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default URL prefix for stored objects.
pub const DEFAULT_BASE_URL: &str = "mem://assets";

#[derive(Clone)]
struct StoredObject {
    content_type: String,
    bytes: Bytes,
    digest: ContentDigest,
}

#[derive(Default)]
struct Faults {
    put_failures: u32,
    url_failures: u32,
}

/// Object store kept in process memory.
pub struct MemoryBinaryStore {
    objects: RwLock<HashMap<AssetKey, StoredObject>>,
    base_url: String,
    faults: Mutex<Faults>,
    puts: AtomicUsize,
    url_lookups: AtomicUsize,
}

impl MemoryBinaryStore {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            faults: Mutex::new(Faults::default()),
            puts: AtomicUsize::new(0),
            url_lookups: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` put calls.
    pub fn fail_next_puts(&self, n: u32) {
        self.faults.lock().put_failures = n;
    }

    /// Fail the next `n` URL lookups.
    pub fn fail_next_url_lookups(&self, n: u32) {
        self.faults.lock().url_failures = n;
    }

    /// Number of put and get_url calls received.
    pub fn calls(&self) -> (usize, usize) {
        (
            self.puts.load(Ordering::SeqCst),
            self.url_lookups.load(Ordering::SeqCst),
        )
    }

    pub fn contains(&self, key: &AssetKey) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub fn keys(&self) -> Vec<AssetKey> {
        let mut keys: Vec<_> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Content type and bytes of a stored object.
    pub fn get(&self, key: &AssetKey) -> Option<(String, Bytes)> {
        self.objects
            .read()
            .get(key)
            .map(|o| (o.content_type.clone(), o.bytes.clone()))
    }

    /// Fetch the object a retrieval URL points at, as a browser would.
    pub fn fetch(&self, url: &str) -> Option<Bytes> {
        let key = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        let objects = self.objects.read();
        let object = objects.get(&AssetKey(key.to_string()))?;
        (ContentDigest::from_bytes(&object.bytes) == object.digest).then(|| object.bytes.clone())
    }

    fn url_for(&self, key: &AssetKey) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

impl Default for MemoryBinaryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BinaryStore for MemoryBinaryStore {
    async fn put(&self, key: &AssetKey, payload: &AssetPayload) -> RemoteResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.lock();
            if faults.put_failures > 0 {
                faults.put_failures -= 1;
                return Err(RemoteError::Unavailable("injected put failure".into()));
            }
        }

        self.objects.write().insert(
            key.clone(),
            StoredObject {
                content_type: payload.content_type.clone(),
                bytes: payload.bytes.clone(),
                digest: payload.digest(),
            },
        );
        Ok(())
    }

    async fn get_url(&self, key: &AssetKey) -> RemoteResult<String> {
        self.url_lookups.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.lock();
            if faults.url_failures > 0 {
                faults.url_failures -= 1;
                return Err(RemoteError::Unavailable("injected url failure".into()));
            }
        }

        if !self.contains(key) {
            return Err(RemoteError::NotFound(key.to_string()));
        }
        Ok(self.url_for(key))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
