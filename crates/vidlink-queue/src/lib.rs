//! Download queue: duplicate-submission guard and reconciliation with the backend.

pub mod dedup;
pub mod reconcile;

#[cfg(test)]
mod fakes;

pub use dedup::{canonical_key, RequestDeduplicator, SubmitOutcome, SubmitReply};
pub use reconcile::{merge_snapshot, QueueReconciler};
