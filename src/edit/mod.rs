//! Inline editing.
//!
//! A controller owns one [`EditSession`], a single slot holding at most one
//! [`EditDraft`]. Drafts are seeded once from their source record and are
//! never refreshed from later snapshots.

mod session;

pub use session::{DraftTicket, EditDraft, EditSession};
