// src/repositories/mod.rs
//
// Repository layer
//
// CRITICAL RULES:
// - Repositories are DUMB data mappers
// - NO business logic
// - NO invariant enforcement
// - NO event emission
// - Explicit SQL only

pub mod history_repository;

#[cfg(test)]
pub use history_repository::MockHistoryRepository;
pub use history_repository::{HistoryRepository, SqliteHistoryRepository, UpsertOutcome};
