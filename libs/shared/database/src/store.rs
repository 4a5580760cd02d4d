use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use shared_config::AppConfig;

use super::{sqlite, DatabaseError};

/// Shared handle to the clinic database.
///
/// A single mutex-guarded connection serializes every writer, and write
/// operations run inside IMMEDIATE transactions, so status re-checks
/// (slot booking, overlap tests) observe a stable snapshot and exactly
/// one concurrent booking attempt can commit.
pub struct ClinicDb {
    conn: Mutex<Connection>,
}

impl ClinicDb {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(sqlite::open_database(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(sqlite::open_memory_database()?),
        })
    }

    /// Run a read-only closure against the connection.
    pub fn read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| DatabaseError::Connection("connection lock poisoned".to_string()))?;
        f(&guard)
    }

    /// Run a closure inside a single IMMEDIATE transaction. Commits when the
    /// closure returns Ok; any error rolls the whole transaction back, so a
    /// multi-record write is never partially visible.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Transaction) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| DatabaseError::Connection("connection lock poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(out)
    }
}

/// Application state shared across all routers. Services hold their own
/// `Arc<ClinicDb>` clone, mirroring how handlers construct them per request.
pub struct AppState {
    pub config: AppConfig,
    pub db: std::sync::Arc<ClinicDb>,
}
