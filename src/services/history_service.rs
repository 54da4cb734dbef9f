// src/services/history_service.rs
//
// History Service - Orchestration over the history repository
//
// CRITICAL RULES:
// - Writes validate, persist, then emit exactly one event
// - Events are emitted only after the repository call returned Ok
//   (the transaction has committed)
// - Reads never emit

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::history::{now_millis, validate_history_entry, HistoryEntry, NaturalKey};
use crate::error::AppResult;
use crate::events::{
    CompactionKind, EventBus, HistoryCleared, HistoryCompacted, HistoryEntryDeleted,
    HistoryEntryInserted, HistoryEntryUpdated,
};
use crate::repositories::{HistoryRepository, UpsertOutcome};

/// Tunables for the service layer
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryConfig {
    /// `percent_watched` at or above which `record_progress` marks an entry completed
    pub completion_threshold: f64,
    /// Limit used when the caller does not give one
    pub default_recent_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            completion_threshold: 90.0,
            default_recent_limit: 50,
        }
    }
}

/// A playback progress report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProgressRequest {
    pub media_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    pub poster_image: Option<String>,
    pub episode_id: Option<String>,
    pub episode_title: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub position: i64,
    pub duration: i64,
}

/// One page of the "continue watching" row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueWatchingPage {
    /// Most recent incomplete entry per title, recent-first
    pub entries: Vec<HistoryEntry>,
    /// All incomplete rows in the store
    pub total: u64,
    pub has_more: bool,
}

pub struct HistoryService {
    history_repo: Arc<dyn HistoryRepository>,
    event_bus: Arc<EventBus>,
    config: HistoryConfig,
}

impl HistoryService {
    pub fn new(
        history_repo: Arc<dyn HistoryRepository>,
        event_bus: Arc<EventBus>,
        config: HistoryConfig,
    ) -> Self {
        Self {
            history_repo,
            event_bus,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert `entry`, or replace the row with the same non-zero `row_id`.
    pub fn insert(&self, entry: &HistoryEntry) -> AppResult<i64> {
        validate_history_entry(entry)?;

        let row_id = self.history_repo.insert(entry)?;
        self.event_bus
            .emit(HistoryEntryInserted::new(row_id, entry.natural_key()));

        Ok(row_id)
    }

    pub fn update(&self, entry: &HistoryEntry) -> AppResult<()> {
        validate_history_entry(entry)?;

        self.history_repo.update(entry)?;
        log::debug!("Updated history row {}", entry.row_id);
        self.event_bus.emit(HistoryEntryUpdated::new(
            entry.row_id,
            entry.position,
            entry.completed,
        ));

        Ok(())
    }

    /// Delete every record for the natural key. Zero matches is not an error.
    pub fn delete_entry(&self, media_id: &str, episode_id: Option<String>) -> AppResult<usize> {
        let key = NaturalKey::new(media_id, episode_id);

        let removed = self.history_repo.delete_entry(&key)?;
        log::debug!("Deleted {} history row(s) for {}", removed, key);
        self.event_bus.emit(HistoryEntryDeleted::new(key, removed));

        Ok(removed)
    }

    pub fn clear_all(&self) -> AppResult<usize> {
        let removed = self.history_repo.clear_all()?;
        log::info!("Cleared watch history ({} rows)", removed);
        self.event_bus.emit(HistoryCleared::new(removed));

        Ok(removed)
    }

    /// Record a progress report for a title or episode.
    ///
    /// Updates the progress of the first record with the same natural key,
    /// or creates one. `first_watched` is only set on creation.
    pub fn record_progress(&self, request: RecordProgressRequest) -> AppResult<UpsertOutcome> {
        let now = now_millis();

        let mut entry = HistoryEntry::new(
            request.media_id,
            request.title,
            request.media_type,
            request.url,
        );
        if let Some(episode_id) = request.episode_id {
            entry = entry.with_episode(
                episode_id,
                request.episode_title,
                request.season_number,
                request.episode_number,
            );
        }
        entry.poster_image = request.poster_image;
        entry.first_watched = now;
        entry.apply_progress(
            request.position,
            request.duration,
            self.config.completion_threshold,
            now,
        );

        validate_history_entry(&entry)?;

        let outcome = self.history_repo.upsert_progress(&entry)?;
        if outcome.inserted {
            self.event_bus
                .emit(HistoryEntryInserted::new(outcome.row_id, entry.natural_key()));
        } else {
            self.event_bus.emit(HistoryEntryUpdated::new(
                outcome.row_id,
                entry.position,
                entry.completed,
            ));
        }

        Ok(outcome)
    }

    /// Keep only the newest record per natural key.
    pub fn remove_duplicates(&self) -> AppResult<usize> {
        let removed = self.history_repo.remove_duplicates()?;
        if removed > 0 {
            log::info!("Removed {} duplicate history row(s)", removed);
            self.event_bus
                .emit(HistoryCompacted::new(CompactionKind::Duplicates, removed));
        }
        Ok(removed)
    }

    /// Keep only the `keep` most recently watched records.
    pub fn prune_oldest(&self, keep: usize) -> AppResult<usize> {
        let removed = self.history_repo.prune_oldest(keep)?;
        if removed > 0 {
            log::info!("Pruned {} history row(s), kept {}", removed, keep);
            self.event_bus
                .emit(HistoryCompacted::new(CompactionKind::Pruned, removed));
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn recent_history(&self, limit: Option<usize>) -> AppResult<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(self.config.default_recent_limit);
        self.history_repo.recent(limit)
    }

    pub fn incomplete_history(&self) -> AppResult<Vec<HistoryEntry>> {
        self.history_repo.incomplete()
    }

    pub fn history_entry(
        &self,
        media_id: &str,
        episode_id: Option<String>,
    ) -> AppResult<Option<HistoryEntry>> {
        self.history_repo
            .get_entry(&NaturalKey::new(media_id, episode_id))
    }

    pub fn history_count(&self) -> AppResult<u64> {
        self.history_repo.count()
    }

    pub fn all_history(&self) -> AppResult<Vec<HistoryEntry>> {
        self.history_repo.all()
    }

    pub fn history_by_show(&self, title: &str) -> AppResult<Vec<HistoryEntry>> {
        self.history_repo.by_title(title)
    }

    pub fn continue_watching(&self, limit: usize, offset: usize) -> AppResult<ContinueWatchingPage> {
        let mut rows = self
            .history_repo
            .incomplete_page(limit.saturating_add(1), offset)?;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let total = self.history_repo.incomplete_count()?;

        Ok(ContinueWatchingPage {
            entries: latest_per_media(rows),
            total,
            has_more,
        })
    }
}

/// Keep the most recently watched entry for each `media_id`, recent-first.
fn latest_per_media(mut rows: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    rows.sort_by(|a, b| {
        b.last_watched
            .cmp(&a.last_watched)
            .then(b.row_id.cmp(&a.row_id))
    });

    let mut seen = HashSet::new();
    rows.retain(|entry| seen.insert(entry.media_id.clone()));
    rows
}
