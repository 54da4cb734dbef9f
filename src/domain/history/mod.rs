pub mod entity;
pub mod invariants;

pub use entity::{now_millis, HistoryEntry, NaturalKey};
pub use invariants::validate_history_entry;
