// src/repositories/history_repository.rs
//
// Watch History Repository
//
// - Every write runs in its own BEGIN IMMEDIATE transaction: SQLite's write
//   lock is taken up front, so writers serialise and a failure rolls back
//   the whole operation.
// - Reads run outside any transaction and see the last committed snapshot
//   (WAL).
// - The natural key (media_id, episode_id) is matched with `IS`, so a
//   missing episode_id matches NULL rather than nothing.

use crate::db::{get_connection, ConnectionPool};
use crate::domain::history::{HistoryEntry, NaturalKey};
use crate::error::{AppError, AppResult};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::sync::Arc;

const COLUMNS: &str = "row_id, media_id, episode_id, title, media_type, url, poster_image,
     episode_title, season_number, episode_number,
     position, duration, percent_watched, completed, last_watched, first_watched";

/// Most recent first; ties go to the most recently inserted row.
const RECENT_ORDER: &str = "ORDER BY last_watched DESC, row_id DESC";

const INSERT_SQL: &str = "INSERT OR REPLACE INTO watch_history (
        row_id, media_id, episode_id, title, media_type, url, poster_image,
        episode_title, season_number, episode_number,
        position, duration, percent_watched, completed, last_watched, first_watched
    ) VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

const UPDATE_SQL: &str = "UPDATE watch_history SET
        media_id = ?2, episode_id = ?3, title = ?4, media_type = ?5, url = ?6,
        poster_image = ?7, episode_title = ?8, season_number = ?9, episode_number = ?10,
        position = ?11, duration = ?12, percent_watched = ?13, completed = ?14,
        last_watched = ?15, first_watched = ?16
    WHERE row_id = ?1";

const DELETE_BY_KEY_SQL: &str =
    "DELETE FROM watch_history WHERE media_id = ?1 AND episode_id IS ?2";

const FIRST_ROW_ID_BY_KEY_SQL: &str = "SELECT row_id FROM watch_history
    WHERE media_id = ?1 AND episode_id IS ?2 ORDER BY row_id ASC LIMIT 1";

/// Result of a natural-key upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub row_id: i64,
    /// true when a new row was created, false when an existing one was updated
    pub inserted: bool,
}

// ---------------------------------------------------------------------
// Repository contract
// ---------------------------------------------------------------------
#[cfg_attr(test, mockall::automock)]
pub trait HistoryRepository: Send + Sync {
    /// Insert-or-replace by `row_id` (0 assigns a fresh key). Returns the row id.
    fn insert(&self, entry: &HistoryEntry) -> AppResult<i64>;

    /// Update the row matching `entry.row_id`; aborts if none matches.
    fn update(&self, entry: &HistoryEntry) -> AppResult<()>;

    /// Delete every row with this natural key. Returns the number removed.
    fn delete_entry(&self, key: &NaturalKey) -> AppResult<usize>;

    fn clear_all(&self) -> AppResult<usize>;

    /// Update progress on the first row with the entry's natural key, or
    /// insert the entry if there is none.
    fn upsert_progress(&self, entry: &HistoryEntry) -> AppResult<UpsertOutcome>;

    /// Keep only the newest row (highest row_id) per natural key.
    fn remove_duplicates(&self) -> AppResult<usize>;

    /// Keep the `keep` most recently watched rows.
    fn prune_oldest(&self, keep: usize) -> AppResult<usize>;

    /// First match by ascending row_id
    fn get_entry(&self, key: &NaturalKey) -> AppResult<Option<HistoryEntry>>;

    fn recent(&self, limit: usize) -> AppResult<Vec<HistoryEntry>>;

    fn incomplete(&self) -> AppResult<Vec<HistoryEntry>>;

    fn incomplete_page(&self, limit: usize, offset: usize) -> AppResult<Vec<HistoryEntry>>;

    fn incomplete_count(&self) -> AppResult<u64>;

    fn all(&self) -> AppResult<Vec<HistoryEntry>>;

    fn by_title(&self, title: &str) -> AppResult<Vec<HistoryEntry>>;

    fn count(&self) -> AppResult<u64>;
}

// ---------------------------------------------------------------------
// SQLite Implementation
// ---------------------------------------------------------------------
pub struct SqliteHistoryRepository {
    pool: Arc<ConnectionPool>,
}

impl SqliteHistoryRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<HistoryEntry> {
        Ok(HistoryEntry {
            row_id: row.get("row_id")?,
            media_id: row.get("media_id")?,
            episode_id: row.get("episode_id")?,
            title: row.get("title")?,
            media_type: row.get("media_type")?,
            url: row.get("url")?,
            poster_image: row.get("poster_image")?,
            episode_title: row.get("episode_title")?,
            season_number: row.get("season_number")?,
            episode_number: row.get("episode_number")?,
            position: row.get("position")?,
            duration: row.get("duration")?,
            percent_watched: row.get("percent_watched")?,
            completed: row.get("completed")?,
            last_watched: row.get("last_watched")?,
            first_watched: row.get("first_watched")?,
        })
    }

    /// Run `op` inside a BEGIN IMMEDIATE transaction, committing only if it
    /// returns Ok. Dropping the transaction on error rolls it back.
    fn write<T, F>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction) -> AppResult<T>,
    {
        let mut conn = get_connection(&self.pool)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn query_entries<P>(&self, sql: &str, params: P) -> AppResult<Vec<HistoryEntry>>
    where
        P: rusqlite::Params,
    {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare_cached(sql)?;
        let entries = stmt
            .query_map(params, Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn query_count<P>(&self, sql: &str, params: P) -> AppResult<u64>
    where
        P: rusqlite::Params,
    {
        let conn = get_connection(&self.pool)?;
        let count: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        Ok(count as u64)
    }

    fn insert_row(tx: &Transaction, entry: &HistoryEntry) -> AppResult<i64> {
        tx.prepare_cached(INSERT_SQL)?.execute(params![
            entry.row_id,
            entry.media_id,
            entry.episode_id,
            entry.title,
            entry.media_type,
            entry.url,
            entry.poster_image,
            entry.episode_title,
            entry.season_number,
            entry.episode_number,
            entry.position,
            entry.duration,
            entry.percent_watched,
            entry.completed,
            entry.last_watched,
            entry.first_watched,
        ])?;
        Ok(tx.last_insert_rowid())
    }
}

fn sql_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl HistoryRepository for SqliteHistoryRepository {
    fn insert(&self, entry: &HistoryEntry) -> AppResult<i64> {
        let row_id = self.write(|tx| Self::insert_row(tx, entry))?;
        let action = if entry.is_unassigned() { "Inserted" } else { "Replaced" };
        log::debug!("{} history row {} for {}", action, row_id, entry.natural_key());
        Ok(row_id)
    }

    fn update(&self, entry: &HistoryEntry) -> AppResult<()> {
        self.write(|tx| {
            let changed = tx.prepare_cached(UPDATE_SQL)?.execute(params![
                entry.row_id,
                entry.media_id,
                entry.episode_id,
                entry.title,
                entry.media_type,
                entry.url,
                entry.poster_image,
                entry.episode_title,
                entry.season_number,
                entry.episode_number,
                entry.position,
                entry.duration,
                entry.percent_watched,
                entry.completed,
                entry.last_watched,
                entry.first_watched,
            ])?;

            if changed == 0 {
                log::warn!("Update aborted: no history row {}", entry.row_id);
                return Err(AppError::TransactionAborted(format!(
                    "no history entry with row_id {}",
                    entry.row_id
                )));
            }
            Ok(())
        })
    }

    fn delete_entry(&self, key: &NaturalKey) -> AppResult<usize> {
        self.write(|tx| {
            let removed = tx
                .prepare_cached(DELETE_BY_KEY_SQL)?
                .execute(params![key.media_id, key.episode_id])?;
            Ok(removed)
        })
    }

    fn clear_all(&self) -> AppResult<usize> {
        self.write(|tx| Ok(tx.execute("DELETE FROM watch_history", [])?))
    }

    fn upsert_progress(&self, entry: &HistoryEntry) -> AppResult<UpsertOutcome> {
        self.write(|tx| {
            let existing: Option<i64> = tx
                .prepare_cached(FIRST_ROW_ID_BY_KEY_SQL)?
                .query_row(params![entry.media_id, entry.episode_id], |row| row.get(0))
                .optional()?;

            match existing {
                Some(row_id) => {
                    tx.prepare_cached(
                        "UPDATE watch_history SET
                            position = ?2, duration = ?3, percent_watched = ?4,
                            completed = ?5, last_watched = ?6
                         WHERE row_id = ?1",
                    )?
                    .execute(params![
                        row_id,
                        entry.position,
                        entry.duration,
                        entry.percent_watched,
                        entry.completed,
                        entry.last_watched,
                    ])?;
                    Ok(UpsertOutcome {
                        row_id,
                        inserted: false,
                    })
                }
                None => {
                    let mut fresh = entry.clone();
                    fresh.row_id = 0;
                    let row_id = Self::insert_row(tx, &fresh)?;
                    Ok(UpsertOutcome {
                        row_id,
                        inserted: true,
                    })
                }
            }
        })
    }

    fn remove_duplicates(&self) -> AppResult<usize> {
        self.write(|tx| {
            Ok(tx.execute(
                "DELETE FROM watch_history WHERE row_id NOT IN (
                    SELECT MAX(row_id) FROM watch_history GROUP BY media_id, episode_id
                 )",
                [],
            )?)
        })
    }

    fn prune_oldest(&self, keep: usize) -> AppResult<usize> {
        let sql = format!(
            "DELETE FROM watch_history WHERE row_id NOT IN (
                SELECT row_id FROM watch_history {} LIMIT ?1
             )",
            RECENT_ORDER
        );
        self.write(|tx| Ok(tx.execute(&sql, params![sql_limit(keep)])?))
    }

    fn get_entry(&self, key: &NaturalKey) -> AppResult<Option<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM watch_history
             WHERE media_id = ?1 AND episode_id IS ?2
             ORDER BY row_id ASC LIMIT 1",
            COLUMNS
        );
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let entry = stmt
            .query_row(params![key.media_id, key.episode_id], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }

    fn recent(&self, limit: usize) -> AppResult<Vec<HistoryEntry>> {
        let sql = format!("SELECT {} FROM watch_history {} LIMIT ?1", COLUMNS, RECENT_ORDER);
        self.query_entries(&sql, params![sql_limit(limit)])
    }

    fn incomplete(&self) -> AppResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM watch_history WHERE completed = 0 {}",
            COLUMNS, RECENT_ORDER
        );
        self.query_entries(&sql, [])
    }

    fn incomplete_page(&self, limit: usize, offset: usize) -> AppResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM watch_history WHERE completed = 0 {} LIMIT ?1 OFFSET ?2",
            COLUMNS, RECENT_ORDER
        );
        self.query_entries(&sql, params![sql_limit(limit), sql_limit(offset)])
    }

    fn incomplete_count(&self) -> AppResult<u64> {
        self.query_count("SELECT COUNT(*) FROM watch_history WHERE completed = 0", [])
    }

    fn all(&self) -> AppResult<Vec<HistoryEntry>> {
        let sql = format!("SELECT {} FROM watch_history {}", COLUMNS, RECENT_ORDER);
        self.query_entries(&sql, [])
    }

    fn by_title(&self, title: &str) -> AppResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM watch_history WHERE title = ?1 {}",
            COLUMNS, RECENT_ORDER
        );
        self.query_entries(&sql, params![title])
    }

    fn count(&self) -> AppResult<u64> {
        self.query_count("SELECT COUNT(*) FROM watch_history", [])
    }
}
