//! Filesystem object store.

use crate::error::{CollectionError, RemoteError, RemoteResult, Result};
use crate::remote::BinaryStore;
use crate::types::{AssetKey, AssetPayload, ContentDigest};
use async_trait::async_trait;
use bytes::Bytes;
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Magic bytes for asset files.
const ASSET_MAGIC: &[u8; 4] = b"AST\0";

/// Current asset file format version.
const ASSET_VERSION: u8 = 1;

/// Lock file guarding the store directory.
const LOCK_FILE: &str = ".lock";

/// Filesystem store configuration.
#[derive(Clone, Debug)]
pub struct FsBinaryStoreConfig {
    /// Root directory for objects.
    pub path: PathBuf,

    /// Read cache size (number of objects).
    pub cache_size: usize,

    /// Public URL prefix; `None` serves `file://` URLs.
    pub base_url: Option<String>,
}

impl Default for FsBinaryStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./assets"),
            cache_size: 128,
            base_url: None,
        }
    }
}

/// An object read back from disk.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredAsset {
    pub content_type: String,
    pub bytes: Bytes,
    pub digest: ContentDigest,
}

struct Shared {
    root: PathBuf,
    base_url: Option<String>,
    cache: Mutex<LruCache<AssetKey, StoredAsset>>,
    _lock_file: File,
}

/// Object store writing one checksummed file per key.
///
/// Layout of an object file:
/// `magic | version | content-type len (u16) | content type | sha256 (32) |
/// content len (u64) | content | crc32 (u32)`, little-endian.
#[derive(Clone)]
pub struct FsBinaryStore {
    shared: Arc<Shared>,
}

impl FsBinaryStore {
    /// Open (creating if needed) a store and take its directory lock.
    pub fn open(config: FsBinaryStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;

        let lock_file = File::create(config.path.join(LOCK_FILE))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| CollectionError::Locked)?;

        let cache_size = NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            shared: Arc::new(Shared {
                root: config.path,
                base_url: config
                    .base_url
                    .map(|url| url.trim_end_matches('/').to_string()),
                cache: Mutex::new(LruCache::new(cache_size)),
                _lock_file: lock_file,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Check if an object exists.
    pub fn exists(&self, key: &AssetKey) -> bool {
        if self.shared.cache.lock().contains(key) {
            return true;
        }
        object_path(&self.shared.root, key)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Read an object, verifying its checksum and digest.
    pub fn read(&self, key: &AssetKey) -> Result<Option<StoredAsset>> {
        if let Some(cached) = self.shared.cache.lock().get(key).cloned() {
            return Ok(Some(cached));
        }

        let path = object_path(&self.shared.root, key)?;
        if !path.exists() {
            return Ok(None);
        }

        let asset = read_object(&path)?;
        self.shared.cache.lock().put(key.clone(), asset.clone());
        Ok(Some(asset))
    }

    fn write(&self, key: &AssetKey, payload: &AssetPayload) -> Result<()> {
        let path = object_path(&self.shared.root, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write under a temporary name so a crash never leaves a torn object.
        let tmp_path = path.with_extension("partial");
        write_object(&tmp_path, payload)?;
        fs::rename(&tmp_path, &path)?;

        self.shared.cache.lock().put(
            key.clone(),
            StoredAsset {
                content_type: payload.content_type.clone(),
                bytes: payload.bytes.clone(),
                digest: payload.digest(),
            },
        );
        Ok(())
    }

    fn url_for(&self, key: &AssetKey) -> Result<String> {
        match &self.shared.base_url {
            Some(base) => Ok(format!("{}/{}", base, key)),
            None => Ok(format!(
                "file://{}",
                object_path(&self.shared.root, key)?.display()
            )),
        }
    }
}

#[async_trait]
impl BinaryStore for FsBinaryStore {
    async fn put(&self, key: &AssetKey, payload: &AssetPayload) -> RemoteResult<()> {
        let store = self.clone();
        let key = key.clone();
        let payload = payload.clone();
        tokio::task::spawn_blocking(move || store.write(&key, &payload))
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?
            .map_err(to_remote)
    }

    async fn get_url(&self, key: &AssetKey) -> RemoteResult<String> {
        if !self.exists(key) {
            return Err(RemoteError::NotFound(key.to_string()));
        }
        self.url_for(key).map_err(to_remote)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

fn to_remote(e: CollectionError) -> RemoteError {
    match e {
        CollectionError::Validation(msg) => RemoteError::Rejected(msg),
        other => RemoteError::Unavailable(other.to_string()),
    }
}

/// Map a key to a path under `root`, rejecting keys that would escape it.
fn object_path(root: &Path, key: &AssetKey) -> Result<PathBuf> {
    let raw = key.as_str();
    let valid = !raw.is_empty()
        && !raw.contains('\\')
        && raw
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".." | LOCK_FILE));
    if !valid {
        return Err(CollectionError::Validation(format!(
            "invalid asset key: {}",
            key
        )));
    }
    Ok(root.join(raw))
}

fn write_object(path: &Path, payload: &AssetPayload) -> Result<()> {
    let content_type = payload.content_type.as_bytes();
    if content_type.len() > u16::MAX as usize {
        return Err(CollectionError::Validation("content type too long".into()));
    }

    let mut file = File::create(path)?;

    // Header
    file.write_all(ASSET_MAGIC)?;
    file.write_all(&[ASSET_VERSION])?;
    file.write_all(&(content_type.len() as u16).to_le_bytes())?;
    file.write_all(content_type)?;
    file.write_all(&payload.digest().0)?;

    // Content
    file.write_all(&(payload.bytes.len() as u64).to_le_bytes())?;
    file.write_all(&payload.bytes)?;

    // Checksum
    file.write_all(&crc32fast::hash(&payload.bytes).to_le_bytes())?;

    file.sync_all()?;
    Ok(())
}

fn read_object(path: &Path) -> Result<StoredAsset> {
    let mut file = File::open(path)?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != ASSET_MAGIC {
        return Err(CollectionError::Corruption("invalid asset magic".into()));
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != ASSET_VERSION {
        return Err(CollectionError::Corruption(format!(
            "unsupported asset version: {}",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 2];
    file.read_exact(&mut len_bytes)?;
    let mut content_type = vec![0u8; u16::from_le_bytes(len_bytes) as usize];
    file.read_exact(&mut content_type)?;
    let content_type = String::from_utf8_lossy(&content_type).into_owned();

    let mut digest = [0u8; 32];
    file.read_exact(&mut digest)?;

    let mut content_len = [0u8; 8];
    file.read_exact(&mut content_len)?;
    let mut content = vec![0u8; u64::from_le_bytes(content_len) as usize];
    file.read_exact(&mut content)?;

    let mut checksum = [0u8; 4];
    file.read_exact(&mut checksum)?;
    let stored = u32::from_le_bytes(checksum);
    let computed = crc32fast::hash(&content);
    if stored != computed {
        return Err(CollectionError::Corruption(format!(
            "checksum mismatch: expected {}, got {}",
            stored, computed
        )));
    }

    let digest = ContentDigest(digest);
    if ContentDigest::from_bytes(&content) != digest {
        return Err(CollectionError::Corruption(format!(
            "digest mismatch for {}",
            path.display()
        )));
    }

    Ok(StoredAsset {
        content_type,
        bytes: Bytes::from(content),
        digest,
    })
}
