// src/application/state.rs
//
// Application state: the one shared storage handle.
//
// Built once by `AppState::open` and injected wherever history is needed.
// Everything inside is Arc-wrapped so callers can clone parts out to other
// threads or tasks.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::db::{
    create_connection_pool, get_connection, get_database_stats, initialize_database,
    verify_database_integrity, ConnectionPool, DatabaseConfig, DatabaseStats,
};
use crate::error::AppResult;
use crate::events::EventBus;
use crate::live::LiveQueryHub;
use crate::repositories::{HistoryRepository, SqliteHistoryRepository};
use crate::services::{HistoryConfig, HistoryService};

pub struct AppState {
    pub pool: Arc<ConnectionPool>,
    pub event_bus: Arc<EventBus>,
    pub history_service: Arc<HistoryService>,
    pub live_queries: Arc<LiveQueryHub>,
}

impl AppState {
    /// Open (or create) the store described by `db_config`.
    ///
    /// Live-query tasks are spawned on `runtime`.
    pub fn open(
        db_config: &DatabaseConfig,
        history_config: HistoryConfig,
        runtime: Handle,
    ) -> AppResult<Self> {
        // 1. INFRASTRUCTURE
        let pool = Arc::new(create_connection_pool(db_config)?);
        {
            let conn = get_connection(&pool)?;
            initialize_database(&conn)?;
        }
        let event_bus = Arc::new(EventBus::new());

        // 2. REPOSITORY
        let history_repo: Arc<dyn HistoryRepository> =
            Arc::new(SqliteHistoryRepository::new(Arc::clone(&pool)));

        // 3. SERVICE
        let history_service = Arc::new(HistoryService::new(
            Arc::clone(&history_repo),
            Arc::clone(&event_bus),
            history_config,
        ));

        // 4. LIVE QUERIES (subscribes to the bus)
        let live_queries = Arc::new(LiveQueryHub::new(history_repo, &event_bus, runtime));

        Ok(Self {
            pool,
            event_bus,
            history_service,
            live_queries,
        })
    }

    pub fn database_stats(&self) -> AppResult<DatabaseStats> {
        let conn = get_connection(&self.pool)?;
        get_database_stats(&conn)
    }

    pub fn verify_integrity(&self) -> AppResult<()> {
        let conn = get_connection(&self.pool)?;
        verify_database_integrity(&conn)
    }

    /// Stop live queries and release the pool.
    ///
    /// Outstanding subscriptions see their streams end.
    pub fn close(self) {
        self.live_queries.shutdown();
        log::info!("Closed watch history store");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::HistoryEntry;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_wires_service_and_live_queries() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::at(dir.path().join("history.db"));
        let state = AppState::open(&config, HistoryConfig::default(), Handle::current()).unwrap();

        let mut subscription = state.live_queries.recent_history(10);
        state
            .history_service
            .insert(&HistoryEntry::new("m", "Movie", "movie", "u"))
            .unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match subscription.next().await {
                    Some(Ok(rows)) if rows.len() == 1 => return true,
                    Some(_) => continue,
                    None => return false,
                }
            }
        })
        .await
        .unwrap();
        assert!(delivered);

        let stats = state.database_stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        state.verify_integrity().unwrap();

        state.close();
        let end = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::at(dir.path().join("history.db"));

        let state = AppState::open(&config, HistoryConfig::default(), Handle::current()).unwrap();
        state
            .history_service
            .insert(&HistoryEntry::new("m", "Movie", "movie", "u"))
            .unwrap();
        state.close();

        let state = AppState::open(&config, HistoryConfig::default(), Handle::current()).unwrap();
        assert_eq!(state.history_service.history_count().unwrap(), 1);
        state.close();
    }
}
