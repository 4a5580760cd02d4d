pub mod sqlite;
pub mod store;

pub use sqlite::{decode_ts, encode_ts, open_database, open_memory_database, run_migrations};
pub use store::{AppState, ClinicDb};

use thiserror::Error;

/// Storage-layer failure. Distinct from domain errors: a `DatabaseError`
/// means "unknown outcome, the whole operation is safe to retry", whereas
/// domain errors mean the request itself was invalid or lost a race.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Connection unavailable: {0}")]
    Connection(String),
}
