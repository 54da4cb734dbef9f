use super::entity::HistoryEntry;
use crate::domain::{DomainError, DomainResult};

/// Validates the HistoryEntry invariants the store cannot enforce itself.
///
/// Offsets, `row_id` and episode context are stored as given.
pub fn validate_history_entry(entry: &HistoryEntry) -> DomainResult<()> {
    if entry.media_id.trim().is_empty() {
        return Err(DomainError::InvariantViolation(
            "media_id must not be empty".to_string(),
        ));
    }
    if !entry.percent_watched.is_finite() {
        return Err(DomainError::InvariantViolation(
            "percent_watched must be finite".to_string(),
        ));
    }
    Ok(())
}
