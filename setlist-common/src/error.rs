//! Common error types for the setlist services

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Common result type for setlist operations
pub type Result<T> = std::result::Result<T, Error>;

/// One song that already lives in another set of the same setlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSong {
    pub song_id: Uuid,
    pub title: String,
    pub original_artist: String,
    pub set_id: Uuid,
    pub set_name: String,
}

/// Common error types across the setlist crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Uniqueness check failed (duplicate song, setlist name, ...)
    #[error("{0}")]
    Conflict(String),

    /// Songs requested for a set already appear in another set of the setlist
    #[error("Duplicate songs found in setlist ({} songs)", .0.len())]
    DuplicatesFound(Vec<DuplicateSong>),

    /// Missing or unknown bearer token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Human readable message for display in a client
    ///
    /// "No rows" and unique-constraint database failures get friendly text,
    /// everything else falls back to the error's own display string.
    pub fn user_message(&self) -> String {
        match self {
            Error::Database(sqlx::Error::RowNotFound) => "No matching record was found.".to_string(),
            Error::Database(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                "A record with these values already exists.".to_string()
            }
            Error::Database(_) => "A database error occurred. Please try again.".to_string(),
            Error::NotFound(what) => format!("{} was not found.", what),
            Error::DuplicatesFound(dups) => {
                let names: Vec<String> = dups
                    .iter()
                    .map(|d| format!("\"{}\" (in {})", d.title, d.set_name))
                    .collect();
                format!(
                    "These songs are already in another set: {}",
                    names.join(", ")
                )
            }
            other => other.to_string(),
        }
    }

    /// True for SQLite busy/locked failures that are worth retrying
    pub fn is_lock_error(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => {
                // Extended codes (e.g. 517 BUSY_SNAPSHOT) keep the primary code in the low byte
                let primary = db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                matches!(primary, Some(5) | Some(6))
                    || db_err.message().contains("database is locked")
            }
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}
