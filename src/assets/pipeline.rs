//! Upload pipeline: store bytes, then resolve a retrieval URL.

use crate::error::{CollectionError, Result};
use crate::remote::BinaryStore;
use crate::types::{AssetKey, AssetPayload, Timestamp, UploadResult};
use std::sync::Arc;

/// Longest file-name tail kept in a key.
const MAX_NAME_LEN: usize = 64;

/// Uploads assets to a [`BinaryStore`].
#[derive(Clone)]
pub struct AssetUploadPipeline {
    store: Arc<dyn BinaryStore>,
}

impl AssetUploadPipeline {
    pub fn new(store: Arc<dyn BinaryStore>) -> Self {
        Self { store }
    }

    /// Upload `payload` into `folder`.
    ///
    /// Each call is one attempt under a freshly generated key. The attempt
    /// succeeds only if both the put and the URL lookup succeed. Bytes stored
    /// by a put whose URL lookup then failed are left where they are.
    pub async fn upload(&self, payload: &AssetPayload, folder: &str) -> Result<UploadResult> {
        if payload.is_empty() {
            return Err(CollectionError::Validation(format!(
                "asset `{}` is empty",
                payload.name
            )));
        }

        let key = fresh_key(folder, &payload.name);
        tracing::debug!(
            key = %key,
            bytes = payload.len(),
            backend = self.store.backend_name(),
            "uploading asset"
        );

        self.store
            .put(&key, payload)
            .await
            .map_err(|source| CollectionError::Upload {
                key: key.clone(),
                source,
            })?;

        let url = self
            .store
            .get_url(&key)
            .await
            .map_err(|source| CollectionError::Upload {
                key: key.clone(),
                source,
            })?;

        tracing::info!(key = %key, "asset uploaded");
        Ok(UploadResult { key, url })
    }
}

/// Key for a new upload attempt: `<folder>/<millis>-<uuid>-<name>`.
pub fn fresh_key(folder: &str, name: &str) -> AssetKey {
    let folder = folder.trim_matches('/');
    let unique = uuid::Uuid::new_v4().simple().to_string();
    let tail = format!(
        "{}-{}-{}",
        Timestamp::now().as_millis(),
        unique,
        sanitize_name(name)
    );
    if folder.is_empty() {
        AssetKey(tail)
    } else {
        AssetKey(format!("{}/{}", folder, tail))
    }
}

/// Reduce a file name to characters that are safe in keys and URLs.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "asset".to_string()
    } else {
        cleaned.to_string()
    }
}
