//! Asset uploads.
//!
//! [`AssetUploadPipeline`] turns an [`AssetPayload`](crate::types::AssetPayload)
//! into an [`UploadResult`](crate::types::UploadResult) by storing the bytes
//! under a fresh key and resolving the retrieval URL. [`FsBinaryStore`] is a
//! local [`BinaryStore`](crate::remote::BinaryStore) backend that keeps one
//! checksummed file per key.

mod fs_store;
mod pipeline;

pub use fs_store::{FsBinaryStore, FsBinaryStoreConfig, StoredAsset};
pub use pipeline::{fresh_key, AssetUploadPipeline};
