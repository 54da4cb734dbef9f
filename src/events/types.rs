// events/types.rs
//
// All history events in the system.
// Each event represents an immutable fact: a write that has already committed.
//
// CRITICAL RULES:
// - Events are facts, not commands
// - Events are emitted only after a successful commit
// - Events carry only the data needed to react

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::history::NaturalKey;

/// Trait that all domain events must implement
pub trait DomainEvent: std::fmt::Debug + Clone {
    /// Unique identifier for this event instance
    fn event_id(&self) -> Uuid;

    /// When this event occurred
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Human-readable event type name
    fn event_type(&self) -> &'static str;
}

macro_rules! impl_domain_event {
    ($event:ident) => {
        impl DomainEvent for $event {
            fn event_id(&self) -> Uuid {
                self.event_id
            }
            fn occurred_at(&self) -> DateTime<Utc> {
                self.occurred_at
            }
            fn event_type(&self) -> &'static str {
                stringify!($event)
            }
        }
    };
}

// ============================================================================
// WRITE EVENTS
// ============================================================================

/// A row was inserted (or replaced by row id, or created by a progress upsert)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntryInserted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub row_id: i64,
    pub media_id: String,
    pub episode_id: Option<String>,
}

impl HistoryEntryInserted {
    pub fn new(row_id: i64, key: NaturalKey) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            row_id,
            media_id: key.media_id,
            episode_id: key.episode_id,
        }
    }
}

impl_domain_event!(HistoryEntryInserted);

/// An existing row was updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntryUpdated {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub row_id: i64,
    pub position: i64,
    pub completed: bool,
}

impl HistoryEntryUpdated {
    pub fn new(row_id: i64, position: i64, completed: bool) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            row_id,
            position,
            completed,
        }
    }
}

impl_domain_event!(HistoryEntryUpdated);

/// Rows matching a natural key were deleted. `removed` may be 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntryDeleted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub media_id: String,
    pub episode_id: Option<String>,
    pub removed: usize,
}

impl HistoryEntryDeleted {
    pub fn new(key: NaturalKey, removed: usize) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            media_id: key.media_id,
            episode_id: key.episode_id,
            removed,
        }
    }
}

impl_domain_event!(HistoryEntryDeleted);

/// Every row was deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryCleared {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub removed: usize,
}

impl HistoryCleared {
    pub fn new(removed: usize) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            removed,
        }
    }
}

impl_domain_event!(HistoryCleared);

/// Maintenance that removed rows (duplicate cleanup or pruning)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionKind {
    Duplicates,
    Pruned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryCompacted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub kind: CompactionKind,
    pub removed: usize,
}

impl HistoryCompacted {
    pub fn new(kind: CompactionKind, removed: usize) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            kind,
            removed,
        }
    }
}

impl_domain_event!(HistoryCompacted);
