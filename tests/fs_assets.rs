//! Integration tests for products stored with the filesystem asset store.

mod common;

use common::*;
use live_collection::{
    AssetKey, CollectionSchema, ControllerConfig, FsBinaryStore, FsBinaryStoreConfig,
    LiveCollectionController, MemoryAuth, MemoryDocumentStore,
};
use std::sync::Arc;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> FsBinaryStore {
    FsBinaryStore::open(FsBinaryStoreConfig {
        path: dir.path().join("assets"),
        cache_size: 16,
        base_url: Some("https://cdn.example.com".into()),
    })
    .unwrap()
}

#[tokio::test]
async fn test_product_image_lands_on_disk() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let assets = Arc::new(open_store(&dir));
    let documents = Arc::new(MemoryDocumentStore::new());
    let controller = LiveCollectionController::new(
        CollectionSchema::products(),
        documents.clone(),
        assets.clone(),
        Arc::new(MemoryAuth::signed_in(user())),
        ControllerConfig::default(),
    );
    controller.start().await.unwrap();

    let id = controller
        .create(product("Lamp", 20), Some(image("lamp.png")))
        .await
        .unwrap();

    let stored = documents.document("productos", &id).unwrap();
    let url = stored.asset_url.unwrap();
    let key = url
        .strip_prefix("https://cdn.example.com/")
        .map(|k| AssetKey(k.to_string()))
        .unwrap();

    assert!(key.as_str().starts_with("productos/"));
    let asset = assets.read(&key).unwrap().unwrap();
    assert_eq!(asset.content_type, "image/png");
    assert_eq!(asset.bytes.as_ref(), b"pixels of lamp.png");
    assert!(dir.path().join("assets").join(key.as_str()).exists());
}

#[tokio::test]
async fn test_assets_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let key = {
        let assets = Arc::new(open_store(&dir));
        let pipeline = live_collection::AssetUploadPipeline::new(assets);
        pipeline
            .upload(&image("desk.png"), "productos")
            .await
            .unwrap()
            .key
    };

    let assets = open_store(&dir);
    let asset = assets.read(&key).unwrap().unwrap();
    assert_eq!(asset.bytes.as_ref(), b"pixels of desk.png");
}
