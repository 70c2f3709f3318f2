//! # Engine Error Types
//!
//! One error type for every service call, classified for callers.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Domain      │  │       Database          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Core(Validation│  │  Db(QueryFailed, ...)   │ │
//! │  │  ConfigLoad/Save│  │   NotFound,     │  │                         │ │
//! │  │  CatalogLoad    │  │   PeriodLocked) │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  error_code() flattens all of them into:                               │
//! │  VALIDATION_ERROR · NOT_FOUND · CONFIGURATION_ERROR · PERIOD_LOCKED    │
//! │  DATABASE_ERROR · INTERNAL                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use agritax_core::{CoreError, ValidationError};
use agritax_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// The rule catalog file could not be read.
    #[error("Failed to load rule catalog {path}: {reason}")]
    CatalogLoadFailed { path: String, reason: String },

    // =========================================================================
    // Wrapped Layers
    // =========================================================================
    /// Domain error from a calculator or the state machine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Persistence error.
    #[error(transparent)]
    Db(DbError),

    /// Internal engine error (task join failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for EngineError {
    /// Domain errors raised inside a repository surface as `Core`, so they
    /// classify the same way wherever they were detected.
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => EngineError::Core(core),
            other => EngineError::Db(other),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl EngineError {
    /// Stable code for transport layers (CLI exit output, HTTP mapping).
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Core(CoreError::Validation(_)) => "VALIDATION_ERROR",
            EngineError::Core(CoreError::InvalidTransition { .. }) => "VALIDATION_ERROR",
            EngineError::Core(CoreError::NotFound { .. }) => "NOT_FOUND",
            EngineError::Core(CoreError::Configuration { .. }) => "CONFIGURATION_ERROR",
            EngineError::Core(CoreError::PeriodLocked { .. }) => "PERIOD_LOCKED",
            EngineError::Db(DbError::NotFound { .. }) => "NOT_FOUND",
            EngineError::Db(DbError::UniqueViolation { .. }) => "VALIDATION_ERROR",
            EngineError::Db(_) => "DATABASE_ERROR",
            EngineError::InvalidConfig(_)
            | EngineError::ConfigLoadFailed(_)
            | EngineError::ConfigSaveFailed(_)
            | EngineError::CatalogLoadFailed { .. } => "CONFIGURATION_ERROR",
            EngineError::Internal(_) => "INTERNAL",
        }
    }

    /// Returns true if this error came from bad caller input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.error_code(),
            "VALIDATION_ERROR" | "NOT_FOUND" | "PERIOD_LOCKED"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_unwrap_from_db() {
        let db = DbError::Domain(CoreError::PeriodLocked {
            kind: "CIT".into(),
            period: "2025".into(),
        });
        let err = EngineError::from(db);
        assert!(matches!(err, EngineError::Core(CoreError::PeriodLocked { .. })));
        assert_eq!(err.error_code(), "PERIOD_LOCKED");
    }

    #[test]
    fn test_error_codes() {
        let validation = EngineError::from(CoreError::from(ValidationError::Required {
            field: "period".into(),
        }));
        assert_eq!(validation.error_code(), "VALIDATION_ERROR");
        assert!(validation.is_client_error());

        let missing = EngineError::from(CoreError::configuration("CIT_DEDUCTION/TAX_RATE", "f1", "no active rule"));
        assert_eq!(missing.error_code(), "CONFIGURATION_ERROR");
        assert!(!missing.is_client_error());

        let db = EngineError::from(DbError::not_found("TaxRule", "r1"));
        assert_eq!(db.error_code(), "NOT_FOUND");
        assert_eq!(EngineError::from(DbError::PoolExhausted).error_code(), "DATABASE_ERROR");
    }
}
