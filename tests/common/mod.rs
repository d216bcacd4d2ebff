//! Shared fixtures for integration tests.

#![allow(dead_code)]

use live_collection::{
    AssetPayload, BackoffConfig, CollectionSchema, ControllerConfig, Fields, ListView,
    LiveCollectionController, MemoryAuth, MemoryBinaryStore, MemoryDocumentStore, Record,
    RecordId, Timestamp, User,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Route library logs to the test output (once per process).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub struct Harness {
    pub documents: Arc<MemoryDocumentStore>,
    pub binaries: Arc<MemoryBinaryStore>,
    pub auth: Arc<MemoryAuth>,
    pub controller: Arc<LiveCollectionController>,
}

pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        backoff: BackoffConfig {
            initial_delay_ms: 10,
            max_delay_ms: 50,
            multiplier: 2.0,
            max_attempts: 5,
        },
        ..Default::default()
    }
}

pub fn user() -> User {
    User {
        id: "u1".into(),
        display_name: Some("Ana".into()),
        email: Some("ana@example.com".into()),
    }
}

pub fn harness(schema: CollectionSchema) -> Harness {
    harness_with(schema, MemoryDocumentStore::new(), fast_config())
}

pub fn harness_with(
    schema: CollectionSchema,
    documents: MemoryDocumentStore,
    config: ControllerConfig,
) -> Harness {
    init_tracing();
    let documents = Arc::new(documents);
    let binaries = Arc::new(MemoryBinaryStore::new());
    let auth = Arc::new(MemoryAuth::signed_in(user()));
    let controller = Arc::new(LiveCollectionController::new(
        schema,
        documents.clone(),
        binaries.clone(),
        auth.clone(),
        config,
    ));
    Harness {
        documents,
        binaries,
        auth,
        controller,
    }
}

pub fn product(titulo: &str, precio: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("titulo".into(), json!(titulo));
    fields.insert("descripcion".into(), json!(format!("{} description", titulo)));
    fields.insert("categoria".into(), json!("home"));
    fields.insert("precio".into(), json!(precio));
    fields
}

pub fn image(name: &str) -> AssetPayload {
    AssetPayload::new(name, "image/png", format!("pixels of {}", name).into_bytes())
}

/// A product as another client would have written it.
pub fn remote_product(id: &str, created: i64, titulo: &str, precio: i64) -> Record {
    Record {
        id: RecordId::new(id),
        fields: product(titulo, precio),
        asset_url: Some(format!("mem://assets/productos/{}.png", id)),
        created_at: Timestamp(created),
        updated_at: None,
    }
}

/// Wait until the visible list satisfies `condition`.
pub async fn wait_for<F>(rx: &mut watch::Receiver<ListView>, condition: F) -> ListView
where
    F: Fn(&ListView) -> bool,
{
    let waiting = async {
        loop {
            {
                let view = rx.borrow_and_update();
                if condition(&view) {
                    return view.clone();
                }
            }
            if rx.changed().await.is_err() {
                panic!("list publisher dropped");
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .expect("timed out waiting for list state")
}

pub fn titles(view: &ListView) -> Vec<String> {
    view.records
        .iter()
        .map(|r| r.fields["titulo"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Wait until every write shown in the list has been settled by the feed.
pub async fn wait_settled(controller: &LiveCollectionController) {
    let settling = async {
        while controller.pending_writes() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), settling)
        .await
        .expect("timed out waiting for pending writes to settle")
}
