//! # Database Error Types
//!
//! What can go wrong between a repository call and SQLite.
//!
//! ## Where Errors Come From
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error ──────────┐                                                │
//! │  MigrateError ─────────┼──► DbError ──► EngineError::Db                │
//! │  stored TEXT unparsable┘        │                                       │
//! │                                 │                                       │
//! │  CoreError (negative override, ─┴─ Domain ──► EngineError::Core        │
//! │  filed period, bad transition)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use agritax_core::CoreError;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// No row for the id within the farm.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write, e.g. a second `(farm_id, code)` rule.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// The row references a farm, employee or loss year that does not exist.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Any other SQL error, including writes to the append-only rule history.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Stored decimal, period or JSON payload that no longer parses.
    #[error("Corrupt value in {column}: '{value}'")]
    CorruptValue { column: String, value: String },

    /// A domain check failed inside the repository.
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn corrupt(column: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::CorruptValue {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Sorts a SQLite error message into a constraint kind.
///
/// SQLite reports `UNIQUE constraint failed: <table>.<column>` and
/// `FOREIGN KEY constraint failed`.
fn from_sqlite_message(msg: &str) -> DbError {
    if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
        DbError::duplicate(columns, "unknown")
    } else if msg.contains("FOREIGN KEY constraint failed") {
        DbError::ForeignKeyViolation {
            message: msg.to_string(),
        }
    } else {
        DbError::QueryFailed(msg.to_string())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => from_sqlite_message(db_err.message()),
            sqlx::Error::ColumnDecode { index, source } => DbError::corrupt(index, source.to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}
