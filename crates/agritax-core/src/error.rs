//! # Error Types
//!
//! Domain-specific error types for agritax-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  agritax-core errors (this file)                                       │
//! │  ├── CoreError        - Domain errors (not found, config gaps, locks)  │
//! │  └── ValidationError  - Malformed input, rejected before computing     │
//! │                                                                         │
//! │  agritax-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  agritax-engine errors                                                 │
//! │  └── EngineError      - What callers see (with a stable error code)    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → CLI / API layer     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What Is NOT An Error
//! - A VAT verdict of "not deductible" is a computed result.
//! - Recalculating an already CALCULATED period replaces the stored result.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input (bad period, negative override value, ...).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Lookup for an employee, rule, farm, etc. did not resolve.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A required rule has no matching active row for the farm.
    ///
    /// ## When This Occurs
    /// - The farm was never synced against the catalog
    /// - An operator deactivated a rate-bearing rule
    /// - All matching rules have `effective_from` after the requested date
    ///
    /// Raised loudly for rate-bearing rules; never silently treated as zero.
    #[error("Missing tax rule {rule} for farm {farm_id}: {reason}")]
    Configuration {
        rule: String,
        farm_id: String,
        reason: String,
    },

    /// The declaration for this period has been filed and must be unlocked first.
    #[error("{kind} declaration for period {period} is filed; unlock it before recalculating")]
    PeriodLocked { kind: String, period: String },

    /// A declaration state transition that the state machine does not allow.
    #[error("Invalid declaration transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Configuration error for a missing or unusable rule.
    pub fn configuration(
        rule: impl Into<String>,
        farm_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::Configuration {
            rule: rule.into(),
            farm_id: farm_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur before any computation starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative (rule values, amounts).
    #[error("{field} must not be negative (got {value})")]
    MustBeNonNegative { field: String, value: String },

    /// Invalid format (period string, tax code, UUID, decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate rule code in a catalog).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message() {
        let err = CoreError::configuration("CIT_DEDUCTION/TAX_RATE", "farm-1", "no active rule");
        assert_eq!(
            err.to_string(),
            "Missing tax rule CIT_DEDUCTION/TAX_RATE for farm farm-1: no active rule"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::MustBeNonNegative {
            field: "value".to_string(),
            value: "-1".to_string(),
        };
        assert_eq!(err.to_string(), "value must not be negative (got -1)");

        let err = ValidationError::Required {
            field: "period".to_string(),
        };
        assert_eq!(err.to_string(), "period is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "farm_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }

    #[test]
    fn test_not_found_message() {
        let err = CoreError::not_found("Employee", "emp-9");
        assert_eq!(err.to_string(), "Employee not found: emp-9");
    }
}
