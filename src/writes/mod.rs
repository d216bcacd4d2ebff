//! Multi-step writes.
//!
//! [`WriteSequencer`] runs each create, update or delete as one
//! [`WriteAttempt`]: permission gate, validation, optional upload, then the
//! document write. A failed attempt is terminal; retrying starts a new
//! attempt, which uploads under a fresh key.

mod attempt;
mod queue;
mod sequencer;

pub use attempt::{AttemptState, PlannedWrite, WriteAttempt};
pub use queue::{IdGuard, IdLocks};
pub use sequencer::{WriteReceipt, WriteSequencer};
