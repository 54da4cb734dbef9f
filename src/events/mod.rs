// src/events/mod.rs
//
// Internal Event System - Public API
//
// EventHandler is internal to the bus and must NOT be exported

pub mod bus;
pub mod types;

pub use types::DomainEvent;

pub use types::{
    CompactionKind, HistoryCleared, HistoryCompacted, HistoryEntryDeleted, HistoryEntryInserted,
    HistoryEntryUpdated,
};

pub use bus::{EventBus, EventLogEntry};

