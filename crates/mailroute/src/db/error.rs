//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// An insert collided with a unique key.
    #[error("Duplicate {table} row for key '{key}'")]
    Duplicate { table: &'static str, key: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// Maps a rusqlite unique-constraint failure to [`DatabaseError::Duplicate`].
    pub(crate) fn from_insert(err: rusqlite::Error, table: &'static str, key: &str) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                DatabaseError::Duplicate {
                    table,
                    key: key.to_string(),
                }
            }
            other => DatabaseError::Sqlite(other),
        }
    }
}
