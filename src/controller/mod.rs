//! Live collection controller.
//!
//! Keeps a local ordered list in sync with one remote collection, owns the
//! single edit slot of that collection, and runs writes through a
//! [`WriteSequencer`]. Three timelines meet here:
//!
//! - push snapshots, applied by a background pump task
//! - the local edit draft, touched only by caller operations
//! - multi-step writes, shown as pending-write shadows while in flight
//!
//! The pump never touches the edit slot, and nothing is published once
//! [`stop`](LiveCollectionController::stop) has returned.

mod view;

pub use view::ListView;

use crate::config::{BackoffConfig, ControllerConfig};
use crate::edit::{DraftTicket, EditDraft, EditSession};
use crate::error::{CollectionError, Result};
use crate::remote::{AuthService, BinaryStore, DocumentStore};
use crate::schema::CollectionSchema;
use crate::subscriptions::{FeedEvent, FeedHandle, OrderPolicy, Query, SubscriptionFeed};
use crate::types::{AssetPayload, Fields, Record, RecordId, User};
use crate::writes::{PlannedWrite, WriteSequencer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use view::ListState;

/// CRUD and live-list surface over one remote collection.
pub struct LiveCollectionController {
    schema: CollectionSchema,
    config: ControllerConfig,
    feed: Arc<SubscriptionFeed>,
    sequencer: WriteSequencer,
    state: Arc<Mutex<ListState>>,
    session: Mutex<EditSession>,
    pump: Mutex<Option<JoinHandle<()>>>,
    next_shadow: AtomicU64,
}

impl LiveCollectionController {
    pub fn new(
        schema: CollectionSchema,
        documents: Arc<dyn DocumentStore>,
        binaries: Arc<dyn BinaryStore>,
        auth: Arc<dyn AuthService>,
        config: ControllerConfig,
    ) -> Self {
        let sequencer = WriteSequencer::new(
            schema.clone(),
            documents.clone(),
            binaries,
            auth,
            config.serialize_same_id,
        );
        Self {
            state: Arc::new(Mutex::new(ListState::new(schema.order.clone()))),
            feed: Arc::new(SubscriptionFeed::new(documents)),
            sequencer,
            schema,
            config,
            session: Mutex::new(EditSession::new()),
            pump: Mutex::new(None),
            next_shadow: AtomicU64::new(1),
        }
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    // --- Lifecycle ---

    /// Subscribe and start applying snapshots.
    ///
    /// Fails if the initial subscription fails. Later channel failures are
    /// handled by resubscribing with backoff. Calling `start` on a running
    /// controller does nothing.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let handle = self
            .feed
            .subscribe(self.schema.query(), self.schema.order.clone())
            .await?;

        let mut pump = self.pump.lock();
        if pump.as_ref().map(|task| !task.is_finished()).unwrap_or(false) {
            // Lost a race with a concurrent start; `handle` is released on drop.
            return Ok(());
        }
        self.state.lock().open();
        *pump = Some(tokio::spawn(run_pump(
            self.feed.clone(),
            self.schema.query(),
            self.schema.order.clone(),
            self.state.clone(),
            self.config.backoff.clone(),
            handle,
        )));
        tracing::info!(collection = %self.schema.name, "live collection started");
        Ok(())
    }

    /// Stop delivery. No snapshot is applied or published after this returns.
    pub fn stop(&self) {
        self.state.lock().close();
        if let Some(task) = self.pump.lock().take() {
            task.abort();
            tracing::info!(collection = %self.schema.name, "live collection stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.pump
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    // --- Live list ---

    /// Current visible list.
    pub fn list(&self) -> Vec<Record> {
        self.view().records
    }

    pub fn view(&self) -> ListView {
        self.state.lock().view()
    }

    /// Receiver notified on every change of the visible list.
    pub fn watch(&self) -> watch::Receiver<ListView> {
        self.state.lock().watch()
    }

    pub fn is_stale(&self) -> bool {
        self.view().stale
    }

    /// Writes installed in the visible list and not yet settled.
    pub fn pending_writes(&self) -> usize {
        self.state.lock().pending_writes()
    }

    // --- Writes ---

    /// The signed-in user, or `PermissionDenied`. No network call is made.
    pub fn require_user(&self) -> Result<User> {
        self.sequencer.require_user()
    }

    /// Create a record, uploading `asset` first if given.
    pub async fn create(&self, fields: Fields, asset: Option<AssetPayload>) -> Result<RecordId> {
        let mut pending = PendingShadow::new(&self.state);
        let receipt = self
            .sequencer
            .create_with(fields, asset, |plan| pending.install(self.shadow_id(), plan))
            .await?;
        pending.settle(Some(receipt.id.clone()));
        Ok(receipt.id)
    }

    /// Partially update a record, replacing its asset if `asset` is given.
    pub async fn update(
        &self,
        id: &RecordId,
        changed: Fields,
        asset: Option<AssetPayload>,
    ) -> Result<()> {
        let mut pending = PendingShadow::new(&self.state);
        self.sequencer
            .update_with(id, changed, asset, |plan| {
                pending.install(self.shadow_id(), plan)
            })
            .await?;
        pending.settle(None);
        Ok(())
    }

    /// Delete a record. Deleting a missing record succeeds.
    pub async fn delete(&self, id: &RecordId) -> Result<()> {
        let mut pending = PendingShadow::new(&self.state);
        self.sequencer
            .delete_with(id, |plan| pending.install(self.shadow_id(), plan))
            .await?;
        pending.settle(None);
        Ok(())
    }

    fn shadow_id(&self) -> u64 {
        self.next_shadow.fetch_add(1, Ordering::Relaxed)
    }

    // --- Editing ---

    /// Start editing the record `id`, seeding a draft from the current list.
    ///
    /// Fails with `EditInProgress` if another record is under edit.
    pub fn begin_edit(&self, id: &RecordId) -> Result<EditDraft> {
        let record = self
            .state
            .lock()
            .find(id)
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;

        let mut session = self.session.lock();
        session.enter(&record)?;
        session.draft().cloned().ok_or(CollectionError::NoDraft)
    }

    /// Start a draft for a new record.
    pub fn begin_new(&self) -> Result<()> {
        self.session.lock().enter_new()
    }

    /// Change one field of the draft.
    ///
    /// Fails with `NotFound` if the record under edit has disappeared; the
    /// draft is kept until cancelled.
    pub fn edit_field(&self, name: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let mut session = self.session.lock();
        if let Some(target) = session.target() {
            if self.state.lock().find(target).is_none() {
                return Err(CollectionError::NotFound(target.clone()));
            }
        }
        session.update(name, value)
    }

    pub fn attach_asset(&self, payload: AssetPayload) -> Result<()> {
        self.session.lock().attach_asset(payload)
    }

    /// Discard the draft, returning it.
    pub fn cancel_edit(&self) -> Option<EditDraft> {
        self.session.lock().cancel()
    }

    pub fn draft(&self) -> Option<EditDraft> {
        self.session.lock().draft().cloned()
    }

    /// Hand the draft to the write path.
    ///
    /// The draft is cleared only if the write succeeds and no other draft
    /// was opened meanwhile. On failure it is kept for another try.
    pub async fn commit_edit(&self) -> Result<RecordId> {
        let checkout = Checkout {
            ticket: self.session.lock().checkout()?,
            session: &self.session,
            done: false,
        };
        let draft = &checkout.ticket.draft;

        let id = match &draft.target_id {
            Some(id) => {
                let changes = draft.changes();
                if !changes.is_empty() || draft.pending_asset.is_some() {
                    self.update(id, changes, draft.pending_asset.clone()).await?;
                }
                id.clone()
            }
            None => {
                self.create(draft.fields.clone(), draft.pending_asset.clone())
                    .await?
            }
        };

        if !checkout.complete() {
            tracing::debug!(
                collection = %self.schema.name,
                id = %id,
                "draft replaced during commit"
            );
        }
        Ok(id)
    }
}

/// Shadow of one write in the visible list. Reverted when dropped unless
/// settled, including when the write's future is dropped mid-flight.
struct PendingShadow<'a> {
    state: &'a Mutex<ListState>,
    id: Option<u64>,
}

impl<'a> PendingShadow<'a> {
    fn new(state: &'a Mutex<ListState>) -> Self {
        Self { state, id: None }
    }

    fn install(&mut self, shadow_id: u64, plan: &PlannedWrite) {
        self.state.lock().install(shadow_id, plan);
        self.id = Some(shadow_id);
    }

    /// The write succeeded; keep the shadow until the feed confirms it.
    fn settle(mut self, created: Option<RecordId>) {
        if let Some(shadow_id) = self.id.take() {
            self.state.lock().commit(shadow_id, created);
        }
    }
}

impl Drop for PendingShadow<'_> {
    fn drop(&mut self) {
        if let Some(shadow_id) = self.id.take() {
            self.state.lock().revert(shadow_id);
        }
    }
}

/// A draft checked out for commit. Handed back to the session on drop
/// unless completed.
struct Checkout<'a> {
    session: &'a Mutex<EditSession>,
    ticket: DraftTicket,
    done: bool,
}

impl Checkout<'_> {
    fn complete(mut self) -> bool {
        self.done = true;
        self.session.lock().complete(&self.ticket)
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.session.lock().release(&self.ticket);
        }
    }
}

impl Drop for LiveCollectionController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply snapshots until stopped, resubscribing with backoff after failures.
async fn run_pump(
    feed: Arc<SubscriptionFeed>,
    query: Query,
    order: OrderPolicy,
    state: Arc<Mutex<ListState>>,
    backoff: BackoffConfig,
    mut handle: FeedHandle,
) {
    // Consecutive failed resubscribe attempts; reset by a delivered snapshot.
    let mut failures = 0u32;

    loop {
        match handle.next().await {
            Some(FeedEvent::Snapshot(records)) => {
                failures = 0;
                if !state.lock().apply_snapshot(records) {
                    return;
                }
            }
            event => {
                if let Some(FeedEvent::Error(e)) = &event {
                    tracing::warn!(
                        collection = %query.collection,
                        error = %e,
                        "push channel failed"
                    );
                }
                state.lock().mark_stale();
                match resubscribe(&feed, &query, &order, &state, &backoff, &mut failures).await {
                    Some(next) => handle = next,
                    None => return,
                }
            }
        }
    }
}

async fn resubscribe(
    feed: &SubscriptionFeed,
    query: &Query,
    order: &OrderPolicy,
    state: &Mutex<ListState>,
    backoff: &BackoffConfig,
    failures: &mut u32,
) -> Option<FeedHandle> {
    loop {
        *failures += 1;
        if *failures > backoff.max_attempts {
            tracing::warn!(
                collection = %query.collection,
                attempts = backoff.max_attempts,
                "giving up on resubscribe"
            );
            state.lock().mark_failed();
            return None;
        }

        let delay = backoff.delay(*failures);
        tracing::debug!(
            collection = %query.collection,
            attempt = *failures,
            delay_ms = delay.as_millis() as u64,
            "resubscribing"
        );
        tokio::time::sleep(delay).await;
        if state.lock().is_closed() {
            return None;
        }

        match feed.subscribe(query.clone(), order.clone()).await {
            Ok(handle) => return Some(handle),
            Err(e) => {
                tracing::warn!(
                    collection = %query.collection,
                    attempt = *failures,
                    error = %e,
                    "resubscribe failed"
                );
            }
        }
    }
}
