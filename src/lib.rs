// src/lib.rs
// Watch History - local playback history store with live queries
//
// Architecture:
// - Domain-centric: the history record and its invariants live in `domain`
// - Persistence: SQLite (WAL) behind a pooled repository trait
// - Event-driven: every committed write emits one event on the bus
// - Reactive: live queries re-run on those events and push snapshots
// - Application layer: one shared handle (`AppState`) owning all of it

pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod live;
pub mod repositories;
pub mod services;

pub mod application;

// ============================================================================
// PUBLIC API - Domain
// ============================================================================

pub use domain::{now_millis, validate_history_entry, DomainError, HistoryEntry, NaturalKey};

// ============================================================================
// PUBLIC API - Error Types
// ============================================================================

pub use error::{AppError, AppResult};

// ============================================================================
// PUBLIC API - Events
// ============================================================================

pub use events::{
    CompactionKind,
    DomainEvent,
    EventBus,
    EventLogEntry,
    HistoryCleared,
    HistoryCompacted,
    HistoryEntryDeleted,
    HistoryEntryInserted,
    HistoryEntryUpdated,
};

// ============================================================================
// PUBLIC API - Database
// ============================================================================

pub use db::{create_connection_pool, initialize_database, ConnectionPool, DatabaseConfig};

// ============================================================================
// PUBLIC API - Repositories
// ============================================================================

pub use repositories::{HistoryRepository, SqliteHistoryRepository, UpsertOutcome};

// ============================================================================
// PUBLIC API - Services
// ============================================================================

pub use services::{ContinueWatchingPage, HistoryConfig, HistoryService, RecordProgressRequest};

// ============================================================================
// PUBLIC API - Live Queries
// ============================================================================

pub use live::{LiveQuery, LiveQueryHub, LiveResult, Snapshot, Subscription, SubscriptionId};

// ============================================================================
// PUBLIC API - Application Layer
// ============================================================================

pub use application::{AppState, ErrorResponse, ErrorType};
