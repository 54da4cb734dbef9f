// src/db/config.rs
//
// Database configuration
//
// Resolution order: explicit path (CLI flag) > environment > platform data dir.

use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

pub const DB_PATH_ENV: &str = "WATCH_HISTORY_DB";
pub const POOL_SIZE_ENV: &str = "WATCH_HISTORY_POOL_SIZE";
pub const BUSY_TIMEOUT_ENV: &str = "WATCH_HISTORY_BUSY_TIMEOUT_MS";

const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,

    /// Upper bound on pooled connections (readers + one writer at a time)
    pub max_connections: u32,

    /// How long a writer waits on SQLite's lock before giving up
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Configuration for a database at an explicit path
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Configuration for the default per-user database.
    ///
    /// Path structure: {APP_DATA}/watch-history/history.db
    pub fn default_location() -> AppResult<Self> {
        Ok(Self::at(get_database_path()?))
    }

    /// Apply `WATCH_HISTORY_*` environment overrides.
    pub fn with_env_overrides(self) -> AppResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_ENV) {
            self.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(POOL_SIZE_ENV) {
            self.max_connections = raw.parse().map_err(|e| {
                AppError::Other(format!("Invalid {} '{}': {}", POOL_SIZE_ENV, raw, e))
            })?;
            if self.max_connections == 0 {
                return Err(AppError::Other(format!("{} must be at least 1", POOL_SIZE_ENV)));
            }
        }

        if let Some(raw) = lookup(BUSY_TIMEOUT_ENV) {
            self.busy_timeout_ms = raw.parse().map_err(|e| {
                AppError::Other(format!("Invalid {} '{}': {}", BUSY_TIMEOUT_ENV, raw, e))
            })?;
        }

        Ok(self)
    }
}

/// Get the default database file path, creating its directory.
pub fn get_database_path() -> AppResult<PathBuf> {
    let app_data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::Other("Could not determine app data directory".to_string()))?;

    let history_dir = app_data_dir.join("watch-history");
    std::fs::create_dir_all(&history_dir)?;

    Ok(history_dir.join("history.db"))
}
