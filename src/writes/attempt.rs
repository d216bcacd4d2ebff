//! Per-attempt write state machine.

use crate::error::{CollectionError, Result};
use crate::types::{DocumentPatch, Fields, RecordId};
use std::fmt;

/// Phase of one write attempt.
///
/// `Idle -> Uploading (only with a binary) -> Writing -> Done | Failed`.
/// `Done` and `Failed` are terminal; a retry is a new attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Idle,
    Uploading,
    Writing,
    Done,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Done | AttemptState::Failed)
    }

    fn can_advance_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Idle, Writing)
                | (Idle, Failed)
                | (Uploading, Writing)
                | (Uploading, Failed)
                | (Writing, Done)
                | (Writing, Failed)
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Idle => "idle",
            AttemptState::Uploading => "uploading",
            AttemptState::Writing => "writing",
            AttemptState::Done => "done",
            AttemptState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One attempt at a create, update or delete.
#[derive(Debug)]
pub struct WriteAttempt {
    number: u64,
    state: AttemptState,
}

impl WriteAttempt {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            state: AttemptState::Idle,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, next: AttemptState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(CollectionError::IllegalTransition(format!(
                "attempt {}: {} -> {}",
                self.number, self.state, next
            )));
        }
        tracing::trace!(
            attempt = self.number,
            from = %self.state,
            to = %next,
            "attempt transition"
        );
        self.state = next;
        Ok(())
    }

    /// Mark the attempt failed and hand back `error`.
    ///
    /// A terminal attempt keeps its state.
    pub fn fail(&mut self, error: CollectionError) -> CollectionError {
        if !self.state.is_terminal() {
            self.state = AttemptState::Failed;
        }
        error
    }
}

/// The document mutation an attempt is about to issue.
///
/// Handed to the `on_writing` hook once any upload has finished, so the
/// asset URL is already known.
#[derive(Clone, Debug, PartialEq)]
pub enum PlannedWrite {
    Create {
        fields: Fields,
        asset_url: Option<String>,
    },
    Update {
        id: RecordId,
        patch: DocumentPatch,
    },
    Delete {
        id: RecordId,
    },
}

impl PlannedWrite {
    /// Record targeted by the write; `None` for a create.
    pub fn target(&self) -> Option<&RecordId> {
        match self {
            PlannedWrite::Create { .. } => None,
            PlannedWrite::Update { id, .. } | PlannedWrite::Delete { id } => Some(id),
        }
    }
}
