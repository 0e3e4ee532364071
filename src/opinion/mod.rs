pub mod engine;
pub mod record;

pub use engine::{Change, Reconciled, ReconciliationEngine};
pub use record::{OpinionRecord, REVISION_MAX, SCORE_MAX, SCORE_MIN, store_key};
