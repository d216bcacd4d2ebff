//! Single-slot edit session.

use crate::error::{CollectionError, Result};
use crate::types::{AssetPayload, Fields, Record, RecordId};

/// A local, uncommitted copy of a record's fields.
#[derive(Clone, Debug, PartialEq)]
pub struct EditDraft {
    /// Record under edit; `None` for a record not created yet.
    pub target_id: Option<RecordId>,
    pub fields: Fields,
    /// Replacement asset chosen during the edit.
    pub pending_asset: Option<AssetPayload>,
    /// Asset URL of the source record at edit start, for previews.
    pub current_asset_url: Option<String>,
    /// Fields as seeded at edit start.
    original: Fields,
}

impl EditDraft {
    /// Fields whose value differs from the seed.
    pub fn changes(&self) -> Fields {
        self.fields
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.pending_asset.is_some() || !self.changes().is_empty()
    }

    pub fn original(&self) -> &Fields {
        &self.original
    }
}

/// A draft checked out for commit.
///
/// Carries the generation of the slot it came from, so completing it cannot
/// clear a different draft opened while the commit was in flight.
#[derive(Clone, Debug)]
pub struct DraftTicket {
    generation: u64,
    pub draft: EditDraft,
}

/// Holds at most one active draft.
#[derive(Debug, Default)]
pub struct EditSession {
    slot: Option<(u64, EditDraft)>,
    generation: u64,
    /// Generation of the draft currently checked out for commit.
    committing: Option<u64>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start editing `record`, seeding the draft from it.
    ///
    /// Entering the record already under edit keeps the existing draft.
    /// Entering any other record while a draft is active fails and leaves the
    /// active draft as it is.
    pub fn enter(&mut self, record: &Record) -> Result<()> {
        if let Some((_, active)) = &self.slot {
            if active.target_id.as_ref() == Some(&record.id) {
                return Ok(());
            }
            return Err(CollectionError::EditInProgress(describe(active)));
        }

        self.open(EditDraft {
            target_id: Some(record.id.clone()),
            fields: record.fields.clone(),
            pending_asset: None,
            current_asset_url: record.asset_url.clone(),
            original: record.fields.clone(),
        });
        Ok(())
    }

    /// Start a draft for a new record.
    pub fn enter_new(&mut self) -> Result<()> {
        if let Some((_, active)) = &self.slot {
            if active.target_id.is_none() {
                return Ok(());
            }
            return Err(CollectionError::EditInProgress(describe(active)));
        }

        self.open(EditDraft {
            target_id: None,
            fields: Fields::new(),
            pending_asset: None,
            current_asset_url: None,
            original: Fields::new(),
        });
        Ok(())
    }

    /// Set a field of the draft. The source record is never touched.
    pub fn update(&mut self, name: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let draft = self.active_mut()?;
        draft.fields.insert(name.into(), value);
        Ok(())
    }

    /// Choose a replacement asset for the draft.
    pub fn attach_asset(&mut self, payload: AssetPayload) -> Result<()> {
        self.active_mut()?.pending_asset = Some(payload);
        Ok(())
    }

    /// Discard the draft, returning it.
    pub fn cancel(&mut self) -> Option<EditDraft> {
        self.slot.take().map(|(_, draft)| draft)
    }

    pub fn draft(&self) -> Option<&EditDraft> {
        self.slot.as_ref().map(|(_, draft)| draft)
    }

    pub fn target(&self) -> Option<&RecordId> {
        self.draft().and_then(|d| d.target_id.as_ref())
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }

    /// Copy the draft out for commit. The draft stays in the slot.
    ///
    /// Only one commit of a draft may be in flight; a second checkout fails
    /// with `EditInProgress` until the first is completed or released.
    pub fn checkout(&mut self) -> Result<DraftTicket> {
        let (generation, draft) = self.slot.as_ref().ok_or(CollectionError::NoDraft)?;
        if self.committing == Some(*generation) {
            return Err(CollectionError::EditInProgress(format!(
                "{}, commit in flight",
                describe(draft)
            )));
        }
        let ticket = DraftTicket {
            generation: *generation,
            draft: draft.clone(),
        };
        self.committing = Some(ticket.generation);
        Ok(ticket)
    }

    pub fn is_committing(&self) -> bool {
        matches!(&self.slot, Some((generation, _)) if self.committing == Some(*generation))
    }

    /// Clear the slot after a successful commit of `ticket`.
    ///
    /// Returns false (and clears nothing) if the slot now holds another draft.
    pub fn complete(&mut self, ticket: &DraftTicket) -> bool {
        self.release(ticket);
        match &self.slot {
            Some((generation, _)) if *generation == ticket.generation => {
                self.slot = None;
                true
            }
            _ => false,
        }
    }

    /// Give `ticket` back after a failed commit. The draft stays for a retry.
    pub fn release(&mut self, ticket: &DraftTicket) {
        if self.committing == Some(ticket.generation) {
            self.committing = None;
        }
    }

    fn open(&mut self, draft: EditDraft) {
        self.generation += 1;
        self.slot = Some((self.generation, draft));
    }

    fn active_mut(&mut self) -> Result<&mut EditDraft> {
        self.slot
            .as_mut()
            .map(|(_, draft)| draft)
            .ok_or(CollectionError::NoDraft)
    }
}

fn describe(draft: &EditDraft) -> String {
    match &draft.target_id {
        Some(id) => format!("editing {}", id),
        None => "creating a new record".to_string(),
    }
}
