// src/db/connection.rs
//
// Database connection management
//
// PRINCIPLES:
// - Explicit connection pooling
// - No hidden connection creation
// - Clear error propagation
// - Thread-safe access

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::time::Duration;

use super::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled connection
pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Create a connection pool
///
/// Every pooled connection gets:
/// - WAL journal, so readers see the last committed snapshot while a
///   writer holds the lock
/// - a busy timeout, so concurrent writers queue instead of failing
pub fn create_connection_pool(config: &DatabaseConfig) -> AppResult<ConnectionPool> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let manager = SqliteConnectionManager::file(&config.path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .map_err(|e| {
            AppError::StorageUnavailable(format!(
                "Failed to open database at {}: {}",
                config.path.display(),
                e
            ))
        })?;

    log::info!(
        "Opened watch history database at {} ({} connections)",
        config.path.display(),
        config.max_connections
    );

    Ok(pool)
}

/// Get a connection from the pool
///
/// This is a convenience wrapper that provides better error messages.
pub fn get_connection(pool: &ConnectionPool) -> AppResult<PooledConn> {
    pool.get().map_err(|e| {
        AppError::StorageUnavailable(format!("Failed to get database connection: {}", e))
    })
}

/// Create a standalone connection (for testing)
///
/// This creates an in-memory database, useful for unit tests.
#[cfg(test)]
pub(crate) fn create_test_connection() -> AppResult<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_in_memory()?;
    Ok(conn)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::db::initialize_database;

    /// File-backed pool with the schema applied.
    ///
    /// In-memory databases are per-connection, so pooled tests need a real
    /// file. Keep the `TempDir` alive for the duration of the test.
    pub fn create_test_pool() -> (TempDir, Arc<ConnectionPool>) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DatabaseConfig::at(dir.path().join("history.db"));
        config.max_connections = 4;

        let pool = create_connection_pool(&config).unwrap();
        {
            let conn = get_connection(&pool).unwrap();
            initialize_database(&conn).unwrap();
        }
        (dir, Arc::new(pool))
    }
}
