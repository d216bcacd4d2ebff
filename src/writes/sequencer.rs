//! Write sequencing: permission gate, validation, upload, then the write.

use super::attempt::{AttemptState, PlannedWrite, WriteAttempt};
use super::queue::{IdGuard, IdLocks};
use crate::assets::AssetUploadPipeline;
use crate::error::{CollectionError, RemoteError, Result};
use crate::remote::{AuthService, BinaryStore, DocumentStore};
use crate::schema::CollectionSchema;
use crate::types::{AssetPayload, DocumentPatch, Fields, NewDocument, RecordId, UploadResult, User};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of a successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Created, updated or deleted record.
    pub id: RecordId,
    /// Upload performed by this attempt, if any.
    pub upload: Option<UploadResult>,
}

/// Orchestrates create, update and delete for one collection.
///
/// Every operation first checks for a signed-in user and validates its
/// input, both without any network call. A write that carries a binary
/// uploads it first; if the upload fails no document write is issued.
pub struct WriteSequencer {
    schema: CollectionSchema,
    documents: Arc<dyn DocumentStore>,
    uploads: AssetUploadPipeline,
    auth: Arc<dyn AuthService>,
    id_locks: Option<IdLocks>,
    next_attempt: AtomicU64,
}

impl WriteSequencer {
    pub fn new(
        schema: CollectionSchema,
        documents: Arc<dyn DocumentStore>,
        binaries: Arc<dyn BinaryStore>,
        auth: Arc<dyn AuthService>,
        serialize_same_id: bool,
    ) -> Self {
        Self {
            schema,
            documents,
            uploads: AssetUploadPipeline::new(binaries),
            auth,
            id_locks: serialize_same_id.then(IdLocks::new),
            next_attempt: AtomicU64::new(1),
        }
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// The signed-in user, or `PermissionDenied`.
    pub fn require_user(&self) -> Result<User> {
        self.auth
            .current_user()
            .ok_or(CollectionError::PermissionDenied)
    }

    pub async fn create(
        &self,
        fields: Fields,
        asset: Option<AssetPayload>,
    ) -> Result<WriteReceipt> {
        self.create_with(fields, asset, |_| {}).await
    }

    /// Create a record, calling `on_writing` just before the document write.
    pub async fn create_with<F>(
        &self,
        fields: Fields,
        asset: Option<AssetPayload>,
        on_writing: F,
    ) -> Result<WriteReceipt>
    where
        F: FnOnce(&PlannedWrite) + Send,
    {
        let mut attempt = self.begin();
        let user = self.require_user().map_err(|e| attempt.fail(e))?;
        let fields = self
            .schema
            .validate_create(&fields, asset.is_some())
            .map_err(|e| attempt.fail(e))?;

        tracing::debug!(
            collection = %self.schema.name,
            attempt = attempt.number(),
            user = %user.id,
            with_asset = asset.is_some(),
            "create started"
        );

        let upload = self.upload_if_any(&mut attempt, asset.as_ref()).await?;

        attempt.advance(AttemptState::Writing)?;
        let asset_url = upload.as_ref().map(|u| u.url.clone());
        on_writing(&PlannedWrite::Create {
            fields: fields.clone(),
            asset_url: asset_url.clone(),
        });

        let id = self
            .documents
            .add_document(&self.schema.name, NewDocument { fields, asset_url })
            .await
            .map_err(|e| attempt.fail(self.write_error(e)))?;

        attempt.advance(AttemptState::Done)?;
        tracing::info!(
            collection = %self.schema.name,
            attempt = attempt.number(),
            id = %id,
            "record created"
        );
        Ok(WriteReceipt { id, upload })
    }

    pub async fn update(
        &self,
        id: &RecordId,
        changed: Fields,
        asset: Option<AssetPayload>,
    ) -> Result<WriteReceipt> {
        self.update_with(id, changed, asset, |_| {}).await
    }

    /// Partially update a record. Fields not in `changed` are left as they
    /// are, and so is the asset URL unless `asset` is given.
    pub async fn update_with<F>(
        &self,
        id: &RecordId,
        changed: Fields,
        asset: Option<AssetPayload>,
        on_writing: F,
    ) -> Result<WriteReceipt>
    where
        F: FnOnce(&PlannedWrite) + Send,
    {
        let mut attempt = self.begin();
        self.require_user().map_err(|e| attempt.fail(e))?;
        let changed = self
            .schema
            .validate_update(&changed)
            .map_err(|e| attempt.fail(e))?;
        if changed.is_empty() && asset.is_none() {
            return Err(attempt.fail(CollectionError::Validation(
                "update carries no changes".to_string(),
            )));
        }

        let _turn = self.turn(id).await;
        tracing::debug!(
            collection = %self.schema.name,
            attempt = attempt.number(),
            id = %id,
            fields = changed.len(),
            with_asset = asset.is_some(),
            "update started"
        );

        let upload = self.upload_if_any(&mut attempt, asset.as_ref()).await?;

        attempt.advance(AttemptState::Writing)?;
        let patch = DocumentPatch {
            fields: changed,
            asset_url: upload.as_ref().map(|u| u.url.clone()),
        };
        on_writing(&PlannedWrite::Update {
            id: id.clone(),
            patch: patch.clone(),
        });

        self.documents
            .update_document(&self.schema.name, id, patch)
            .await
            .map_err(|e| {
                attempt.fail(match e {
                    RemoteError::NotFound(_) => CollectionError::NotFound(id.clone()),
                    other => self.write_error(other),
                })
            })?;

        attempt.advance(AttemptState::Done)?;
        tracing::info!(
            collection = %self.schema.name,
            attempt = attempt.number(),
            id = %id,
            "record updated"
        );
        Ok(WriteReceipt {
            id: id.clone(),
            upload,
        })
    }

    /// Delete a record. Deleting a record that does not exist succeeds.
    pub async fn delete(&self, id: &RecordId) -> Result<WriteReceipt> {
        self.delete_with(id, |_| {}).await
    }

    pub async fn delete_with<F>(&self, id: &RecordId, on_writing: F) -> Result<WriteReceipt>
    where
        F: FnOnce(&PlannedWrite) + Send,
    {
        let mut attempt = self.begin();
        self.require_user().map_err(|e| attempt.fail(e))?;

        let _turn = self.turn(id).await;
        attempt.advance(AttemptState::Writing)?;
        on_writing(&PlannedWrite::Delete { id: id.clone() });

        match self.documents.delete_document(&self.schema.name, id).await {
            Ok(()) => {
                tracing::info!(
                    collection = %self.schema.name,
                    attempt = attempt.number(),
                    id = %id,
                    "record deleted"
                );
            }
            Err(RemoteError::NotFound(_)) => {
                tracing::debug!(collection = %self.schema.name, id = %id, "record already absent");
            }
            Err(e) => return Err(attempt.fail(self.write_error(e))),
        }

        attempt.advance(AttemptState::Done)?;
        Ok(WriteReceipt {
            id: id.clone(),
            upload: None,
        })
    }

    fn begin(&self) -> WriteAttempt {
        WriteAttempt::new(self.next_attempt.fetch_add(1, Ordering::Relaxed))
    }

    async fn turn(&self, id: &RecordId) -> Option<IdGuard> {
        match &self.id_locks {
            Some(locks) => Some(locks.acquire(id).await),
            None => None,
        }
    }

    async fn upload_if_any(
        &self,
        attempt: &mut WriteAttempt,
        asset: Option<&AssetPayload>,
    ) -> Result<Option<UploadResult>> {
        let Some(payload) = asset else {
            return Ok(None);
        };

        attempt.advance(AttemptState::Uploading)?;
        match self.uploads.upload(payload, &self.schema.asset_folder).await {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                tracing::warn!(
                    collection = %self.schema.name,
                    attempt = attempt.number(),
                    error = %e,
                    "upload failed, write aborted"
                );
                Err(attempt.fail(e))
            }
        }
    }

    fn write_error(&self, error: RemoteError) -> CollectionError {
        tracing::warn!(collection = %self.schema.name, error = %error, "write failed");
        CollectionError::Write(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryAuth, MemoryBinaryStore, MemoryDocumentStore};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        documents: Arc<MemoryDocumentStore>,
        binaries: Arc<MemoryBinaryStore>,
        auth: Arc<MemoryAuth>,
        sequencer: WriteSequencer,
    }

    fn fixture(schema: CollectionSchema) -> Fixture {
        let documents = Arc::new(MemoryDocumentStore::new());
        let binaries = Arc::new(MemoryBinaryStore::new());
        let auth = Arc::new(MemoryAuth::signed_in(User {
            id: "u1".into(),
            display_name: Some("Ana".into()),
            email: None,
        }));
        let sequencer = WriteSequencer::new(
            schema,
            documents.clone(),
            binaries.clone(),
            auth.clone(),
            true,
        );
        Fixture {
            documents,
            binaries,
            auth,
            sequencer,
        }
    }

    fn lamp_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("titulo".into(), json!("Lamp"));
        fields.insert("descripcion".into(), json!("Desk lamp"));
        fields.insert("categoria".into(), json!("home"));
        fields.insert("precio".into(), json!("20"));
        fields
    }

    fn image() -> AssetPayload {
        AssetPayload::new("lamp.png", "image/png", b"pixels".to_vec())
    }

    #[tokio::test]
    async fn test_create_uploads_before_writing() {
        let f = fixture(CollectionSchema::products());
        let seen = Mutex::new(None);

        let receipt = f
            .sequencer
            .create_with(lamp_fields(), Some(image()), |plan| {
                *seen.lock() = Some(plan.clone());
            })
            .await
            .unwrap();

        let upload = receipt.upload.unwrap();
        assert!(f.binaries.contains(&upload.key));
        assert!(upload.key.as_str().starts_with("productos/"));

        // The hook saw the final asset URL before the write.
        match seen.lock().take().unwrap() {
            PlannedWrite::Create { asset_url, fields } => {
                assert_eq!(asset_url.as_deref(), Some(upload.url.as_str()));
                assert_eq!(fields["precio"], json!(20));
            }
            other => panic!("Expected create plan, got {:?}", other),
        }

        let stored = f.documents.document("productos", &receipt.id).unwrap();
        assert_eq!(stored.asset_url, Some(upload.url));
    }

    #[tokio::test]
    async fn test_failed_upload_writes_nothing() {
        let f = fixture(CollectionSchema::products());
        f.binaries.fail_next_puts(1);

        let result = f.sequencer.create(lamp_fields(), Some(image())).await;

        assert!(matches!(result, Err(CollectionError::Upload { .. })));
        assert_eq!(f.documents.calls().add, 0);
        assert!(f.documents.documents("productos").is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_makes_no_network_call() {
        let f = fixture(CollectionSchema::products());
        f.auth.sign_out();

        let result = f.sequencer.create(lamp_fields(), Some(image())).await;
        assert!(matches!(result, Err(CollectionError::PermissionDenied)));
        assert!(matches!(
            f.sequencer.delete(&RecordId::new("x")).await,
            Err(CollectionError::PermissionDenied)
        ));

        assert_eq!(f.documents.calls().total(), 0);
        assert_eq!(f.binaries.calls(), (0, 0));
    }

    #[tokio::test]
    async fn test_missing_required_asset() {
        let f = fixture(CollectionSchema::products());
        let result = f.sequencer.create(lamp_fields(), None).await;
        assert!(matches!(result, Err(CollectionError::Validation(_))));
        assert_eq!(f.documents.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_asset_url() {
        let f = fixture(CollectionSchema::products());
        let created = f
            .sequencer
            .create(lamp_fields(), Some(image()))
            .await
            .unwrap();
        let url = created.upload.unwrap().url;

        let mut changed = Fields::new();
        changed.insert("titulo".into(), json!("X"));
        f.sequencer.update(&created.id, changed, None).await.unwrap();

        let stored = f.documents.document("productos", &created.id).unwrap();
        assert_eq!(stored.fields["titulo"], json!("X"));
        assert_eq!(stored.fields["categoria"], json!("home"));
        assert_eq!(stored.asset_url, Some(url));
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let f = fixture(CollectionSchema::messages());
        let mut changed = Fields::new();
        changed.insert("mensaje".into(), json!("hola"));

        let result = f.sequencer.update(&RecordId::new("gone"), changed, None).await;
        assert!(matches!(result, Err(CollectionError::NotFound(id)) if id.as_str() == "gone"));
    }

    #[tokio::test]
    async fn test_update_rejects_blanked_field() {
        let f = fixture(CollectionSchema::messages());
        let mut changed = Fields::new();
        changed.insert("mensaje".into(), json!("   "));

        let result = f.sequencer.update(&RecordId::new("a"), changed, None).await;
        assert!(matches!(result, Err(CollectionError::Validation(_))));
        assert_eq!(f.documents.calls().update, 0);
    }

    #[tokio::test]
    async fn test_delete_twice_succeeds() {
        let f = fixture(CollectionSchema::messages());
        let mut fields = Fields::new();
        fields.insert("mensaje".into(), json!("hola"));
        let created = f.sequencer.create(fields, None).await.unwrap();

        f.sequencer.delete(&created.id).await.unwrap();
        f.sequencer.delete(&created.id).await.unwrap();
        assert!(f.documents.documents("post").is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let f = fixture(CollectionSchema::messages());
        f.documents.fail_next_writes(1);
        let mut fields = Fields::new();
        fields.insert("mensaje".into(), json!("hola"));

        let result = f.sequencer.create(fields, None).await;
        assert!(matches!(
            result,
            Err(CollectionError::Write(RemoteError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_same_id_updates_apply_in_call_order() {
        let f = fixture(CollectionSchema::messages());
        let mut fields = Fields::new();
        fields.insert("mensaje".into(), json!("v0"));
        let id = f.sequencer.create(fields, None).await.unwrap().id;

        f.documents.set_write_latency(Some(Duration::from_millis(20)));
        let sequencer = Arc::new(f.sequencer);
        let mut tasks = Vec::new();
        for version in 1..=3 {
            let sequencer = sequencer.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                let mut changed = Fields::new();
                changed.insert("mensaje".into(), json!(format!("v{}", version)));
                sequencer.update(&id, changed, None).await
            }));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = f.documents.document("post", &id).unwrap();
        assert_eq!(stored.fields["mensaje"], json!("v3"));
    }
}
