// src/application/error_handling.rs
//
// Error responses for callers outside the crate (CLI, embedding apps)
//
// - Maps internal errors to a stable, serialisable shape
// - Never exposes raw SQLite errors; those are logged instead
// - Carries the retry hint so callers can apply their own policy

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Standard error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error_type: ErrorType,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Requested record does not exist
    NotFound,

    /// Database file or pool could not be used; worth retrying
    StorageUnavailable,

    /// Write rolled back; the store is unchanged
    TransactionAborted,

    /// Any other persistence failure
    Database,

    FileSystem,

    Internal,
}

impl ErrorResponse {
    fn new(error_type: ErrorType, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            error_type,
            message: message.into(),
            details,
            retryable: false,
        }
    }

    pub fn from_app_error(error: &AppError) -> Self {
        let response = match error {
            AppError::NotFound => Self::new(ErrorType::NotFound, "Resource not found", None),

            AppError::StorageUnavailable(reason) => {
                log::error!("Storage unavailable: {}", reason);
                Self::new(
                    ErrorType::StorageUnavailable,
                    "History storage is unavailable",
                    Some(reason.clone()),
                )
            }

            AppError::TransactionAborted(reason) => Self::new(
                ErrorType::TransactionAborted,
                "Write was rolled back",
                Some(reason.clone()),
            ),

            AppError::Database(db_error) => {
                log::error!("Database error: {:?}", db_error);
                Self::new(
                    ErrorType::Database,
                    "Database operation failed",
                    Some("Check logs for details".to_string()),
                )
            }

            AppError::Serialization(serde_error) => {
                log::error!("Serialization error: {:?}", serde_error);
                Self::new(ErrorType::Internal, "Data serialization failed", None)
            }

            AppError::Io(io_error) => {
                log::error!("IO error: {:?}", io_error);
                Self::new(
                    ErrorType::FileSystem,
                    "File system operation failed",
                    Some(io_error.to_string()),
                )
            }

            AppError::Other(message) => {
                log::error!("Other error: {}", message);
                Self::new(ErrorType::Internal, message.clone(), None)
            }
        };

        Self {
            retryable: error.is_retryable(),
            ..response
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "Internal error".to_string())
    }
}
