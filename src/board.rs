//! Message board over the `post` collection.

use crate::config::ControllerConfig;
use crate::controller::LiveCollectionController;
use crate::error::{CollectionError, Result};
use crate::remote::{AuthService, BinaryStore, DocumentStore};
use crate::schema::CollectionSchema;
use crate::types::{Fields, Record, RecordId, Timestamp};
use serde_json::json;
use std::sync::Arc;

const TEXT_FIELD: &str = "mensaje";

/// One posted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: RecordId,
    pub text: String,
    pub created_at: Timestamp,
    /// Set once the message has been edited.
    pub edited_at: Option<Timestamp>,
}

impl Message {
    fn from_record(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            text: record
                .field(TEXT_FIELD)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            created_at: record.created_at,
            edited_at: record.updated_at,
        }
    }
}

/// Live list of messages, oldest first.
pub struct MessageBoard {
    controller: LiveCollectionController,
}

impl MessageBoard {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        binaries: Arc<dyn BinaryStore>,
        auth: Arc<dyn AuthService>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            controller: LiveCollectionController::new(
                CollectionSchema::messages(),
                documents,
                binaries,
                auth,
                config,
            ),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.controller.start().await
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    /// The underlying controller, for inline editing and watching.
    pub fn controller(&self) -> &LiveCollectionController {
        &self.controller
    }

    pub fn messages(&self) -> Vec<Message> {
        self.controller
            .list()
            .iter()
            .map(Message::from_record)
            .collect()
    }

    /// Post a message. Requires a signed-in user; blank text is rejected.
    pub async fn post(&self, text: &str) -> Result<RecordId> {
        self.controller.require_user()?;
        self.controller.create(text_fields(text)?, None).await
    }

    /// Replace the text of a message.
    pub async fn edit(&self, id: &RecordId, text: &str) -> Result<()> {
        self.controller.require_user()?;
        self.controller.update(id, text_fields(text)?, None).await
    }

    pub async fn remove(&self, id: &RecordId) -> Result<()> {
        self.controller.delete(id).await
    }
}

fn text_fields(text: &str) -> Result<Fields> {
    if text.trim().is_empty() {
        return Err(CollectionError::Validation("no message to send".to_string()));
    }
    let mut fields = Fields::new();
    fields.insert(TEXT_FIELD.to_string(), json!(text));
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryAuth, MemoryBinaryStore, MemoryDocumentStore};
    use crate::types::User;

    fn board(signed_in: bool) -> (MessageBoard, Arc<MemoryDocumentStore>) {
        let documents = Arc::new(MemoryDocumentStore::new());
        let auth = Arc::new(MemoryAuth::new());
        if signed_in {
            auth.sign_in_as(User {
                id: "u1".into(),
                display_name: None,
                email: Some("ana@example.com".into()),
            });
        }
        let board = MessageBoard::new(
            documents.clone(),
            Arc::new(MemoryBinaryStore::new()),
            auth,
            ControllerConfig::default(),
        );
        (board, documents)
    }

    #[tokio::test]
    async fn test_post_edit_remove() {
        let (board, documents) = board(true);

        let id = board.post("hola").await.unwrap();
        board.edit(&id, "hola, editado").await.unwrap();

        let stored = documents.document("post", &id).unwrap();
        assert_eq!(stored.fields["mensaje"], json!("hola, editado"));
        assert!(stored.updated_at.is_some());

        board.remove(&id).await.unwrap();
        board.remove(&id).await.unwrap();
        assert!(documents.documents("post").is_empty());
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let (board, documents) = board(true);
        assert!(matches!(
            board.post("   ").await,
            Err(CollectionError::Validation(_))
        ));
        assert_eq!(documents.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_posting_requires_sign_in() {
        let (board, documents) = board(false);
        assert!(matches!(
            board.post("hola").await,
            Err(CollectionError::PermissionDenied)
        ));
        assert_eq!(documents.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_is_checked_before_text() {
        let (board, documents) = board(false);
        assert!(matches!(
            board.post("   ").await,
            Err(CollectionError::PermissionDenied)
        ));
        assert!(matches!(
            board.edit(&RecordId::new("m1"), "").await,
            Err(CollectionError::PermissionDenied)
        ));
        assert_eq!(documents.calls().total(), 0);
    }
}
