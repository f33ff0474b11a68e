//! SQLite persistence for destinations and processing records.
//!
//! One connection per [`Database`], shared behind a mutex. Repositories are
//! free functions over `&Database` in the `*_repo` modules.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

pub mod destination_repo;
pub mod error;
pub mod migrations;
pub mod record_repo;
pub mod stats_repo;

pub use error::DatabaseError;

/// How long a statement waits on a lock held by another process (a second
/// daemon or an admin tool on the same file) before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the mailroute store. Clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the store at `path`, creating parent directories and applying
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self::prepare(conn)?;
        log::info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// A private in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside an immediate transaction. Commits when `f` returns
    /// `Ok`, rolls back otherwise.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Default store location: `~/.mailroute/data/mailroute.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailroute").join("data").join("mailroute.db"))
}

/// Current time as fixed-width RFC 3339, so stored timestamps sort as text.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
