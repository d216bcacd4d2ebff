//! Visible list state: authoritative snapshot plus pending-write shadows.

use crate::subscriptions::OrderPolicy;
use crate::types::{Fields, Record, RecordId, Timestamp};
use crate::writes::PlannedWrite;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// What presentation code renders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListView {
    /// Ordered records, including writes still in flight.
    pub records: Vec<Record>,

    /// The push channel failed; `records` may be out of date.
    pub stale: bool,

    /// Resubscribing gave up; only a restart brings the list back.
    pub failed: bool,

    /// Bumped on every publish.
    pub revision: u64,
}

impl ListView {
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }
}

#[derive(Debug)]
enum ShadowChange {
    Create {
        placeholder: Record,
        /// Server id, once the write is acknowledged.
        confirmed_id: Option<RecordId>,
    },
    Update {
        id: RecordId,
        fields: Fields,
        asset_url: Option<String>,
        /// `updated_at` of the record when the write was issued.
        stamp_at_install: Option<Timestamp>,
    },
    Delete {
        id: RecordId,
    },
}

#[derive(Debug)]
struct Shadow {
    change: ShadowChange,
    committed: bool,
}

impl Shadow {
    /// Check if `records` already reflect this write.
    ///
    /// A committed update also counts as confirmed once the record carries a
    /// newer server stamp than at install, since the store may have
    /// normalized the written values.
    fn is_confirmed(&self, records: &[Record]) -> bool {
        match &self.change {
            ShadowChange::Create { confirmed_id, .. } => confirmed_id
                .as_ref()
                .map(|id| records.iter().any(|r| &r.id == id))
                .unwrap_or(false),
            ShadowChange::Update {
                id,
                fields,
                asset_url,
                stamp_at_install,
            } => match records.iter().find(|r| &r.id == id) {
                None => true,
                Some(r) => {
                    let matches = r.contains_fields(fields)
                        && (asset_url.is_none() || &r.asset_url == asset_url);
                    let restamped = self.committed
                        && r.updated_at.is_some()
                        && r.updated_at > *stamp_at_install;
                    matches || restamped
                }
            },
            ShadowChange::Delete { id } => !records.iter().any(|r| &r.id == id),
        }
    }
}

/// Shared list state of a controller.
///
/// Snapshot application, shadow changes and publishing all happen under the
/// lock around this value. Once closed, nothing is published.
pub(crate) struct ListState {
    order: OrderPolicy,
    authoritative: Vec<Record>,
    shadows: BTreeMap<u64, Shadow>,
    stale: bool,
    failed: bool,
    closed: bool,
    revision: u64,
    publisher: watch::Sender<ListView>,
}

impl ListState {
    pub(crate) fn new(order: OrderPolicy) -> Self {
        let (publisher, _) = watch::channel(ListView::default());
        Self {
            order,
            authoritative: Vec::new(),
            shadows: BTreeMap::new(),
            stale: false,
            failed: false,
            closed: true,
            revision: 0,
            publisher,
        }
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ListView> {
        self.publisher.subscribe()
    }

    pub(crate) fn view(&self) -> ListView {
        self.publisher.borrow().clone()
    }

    /// Find a record in the authoritative list.
    pub(crate) fn find(&self, id: &RecordId) -> Option<&Record> {
        self.authoritative.iter().find(|r| &r.id == id)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn open(&mut self) {
        self.closed = false;
        self.stale = false;
        self.failed = false;
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Replace the authoritative list. Returns false once closed.
    pub(crate) fn apply_snapshot(&mut self, records: Vec<Record>) -> bool {
        if self.closed {
            return false;
        }
        self.authoritative = records;
        self.stale = false;
        self.failed = false;

        // A snapshot generated before a write landed leaves its shadow alone.
        let authoritative = &self.authoritative;
        self.shadows
            .retain(|_, shadow| !shadow.is_confirmed(authoritative));

        self.publish();
        true
    }

    pub(crate) fn mark_stale(&mut self) {
        if !self.stale {
            self.stale = true;
            self.publish();
        }
    }

    pub(crate) fn mark_failed(&mut self) {
        self.stale = true;
        self.failed = true;
        self.publish();
    }

    /// Show `plan` in the visible list until it is committed and confirmed,
    /// or reverted.
    pub(crate) fn install(&mut self, shadow_id: u64, plan: &PlannedWrite) {
        let change = match plan {
            PlannedWrite::Create { fields, asset_url } => ShadowChange::Create {
                placeholder: Record {
                    id: RecordId(format!("pending-{}", shadow_id)),
                    fields: fields.clone(),
                    asset_url: asset_url.clone(),
                    created_at: Timestamp::now(),
                    updated_at: None,
                },
                confirmed_id: None,
            },
            PlannedWrite::Update { id, patch } => ShadowChange::Update {
                id: id.clone(),
                fields: patch.fields.clone(),
                asset_url: patch.asset_url.clone(),
                stamp_at_install: self.find(id).and_then(|r| r.updated_at),
            },
            PlannedWrite::Delete { id } => ShadowChange::Delete { id: id.clone() },
        };
        self.shadows.insert(
            shadow_id,
            Shadow {
                change,
                committed: false,
            },
        );
        self.publish();
    }

    /// The write behind `shadow_id` succeeded. `created` is the server id of a
    /// created record.
    pub(crate) fn commit(&mut self, shadow_id: u64, created: Option<RecordId>) {
        let Some(shadow) = self.shadows.get_mut(&shadow_id) else {
            return;
        };
        shadow.committed = true;
        if let (ShadowChange::Create { confirmed_id, .. }, Some(id)) = (&mut shadow.change, created)
        {
            *confirmed_id = Some(id);
        }

        // The confirming snapshot may already have been applied.
        if shadow.is_confirmed(&self.authoritative) {
            self.shadows.remove(&shadow_id);
        }
        self.publish();
    }

    /// The write behind `shadow_id` failed.
    pub(crate) fn revert(&mut self, shadow_id: u64) {
        if self.shadows.remove(&shadow_id).is_some() {
            self.publish();
        }
    }

    pub(crate) fn pending_writes(&self) -> usize {
        self.shadows.len()
    }

    fn render(&self) -> Vec<Record> {
        let mut records = self.authoritative.clone();
        for shadow in self.shadows.values() {
            match &shadow.change {
                ShadowChange::Create {
                    placeholder,
                    confirmed_id,
                } => {
                    if let Some(id) = confirmed_id {
                        if records.iter().any(|r| &r.id == id) {
                            continue;
                        }
                    }
                    let mut record = placeholder.clone();
                    if let Some(id) = confirmed_id {
                        record.id = id.clone();
                    }
                    let at = self.order.insertion_point(&records, &record);
                    records.insert(at, record);
                }
                ShadowChange::Update {
                    id,
                    fields,
                    asset_url,
                    ..
                } => {
                    if let Some(record) = records.iter_mut().find(|r| &r.id == id) {
                        record
                            .fields
                            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                        if asset_url.is_some() {
                            record.asset_url = asset_url.clone();
                        }
                    }
                }
                ShadowChange::Delete { id } => records.retain(|r| &r.id != id),
            }
        }
        // Field updates can move a record under a field ordering.
        self.order.sort(&mut records);
        records
    }

    fn publish(&mut self) {
        if self.closed {
            return;
        }
        self.revision += 1;
        let view = ListView {
            records: self.render(),
            stale: self.stale,
            failed: self.failed,
            revision: self.revision,
        };
        self.publisher.send_replace(view);
    }
}
