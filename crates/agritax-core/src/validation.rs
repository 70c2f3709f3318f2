//! # Validation Module
//!
//! Input validation run before any tax computation starts.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (HTTP / CLI)                                          │
//! │  └── Type validation (deserialization)                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Rule values non-negative                                          │
//! │  ├── Rule codes / farm ids well-formed                                 │
//! │  └── Supplier tax codes (MST) well-formed                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (farm_id, code)                                            │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::Money;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of a rule code.
pub const MAX_RULE_CODE_LEN: usize = 64;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a rule code.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Uppercase letters, digits, underscores
///
/// ## Example
/// ```rust
/// use agritax_core::validation::validate_rule_code;
///
/// assert!(validate_rule_code("PIT_PERSONAL_DEDUCTION").is_ok());
/// assert!(validate_rule_code("pit personal").is_err());
/// ```
pub fn validate_rule_code(code: &str) -> ValidationResult<()> {
    if code.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > MAX_RULE_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_RULE_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only A-Z, 0-9 and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates that an identifier (farm, employee, user) is present.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a rule value: negative values are never meaningful.
///
/// ## Example
/// ```rust
/// use agritax_core::validation::validate_rule_value;
/// use rust_decimal::Decimal;
///
/// assert!(validate_rule_value(Decimal::ZERO).is_ok());
/// assert!(validate_rule_value(Decimal::NEGATIVE_ONE).is_err());
/// ```
pub fn validate_rule_value(value: Decimal) -> ValidationResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::MustBeNonNegative {
            field: "value".to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Validates a monetary input that must not be negative.
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustBeNonNegative {
            field: field.to_string(),
            value: amount.to_string(),
        });
    }
    Ok(())
}

/// Validates a fiscal year start month.
pub fn validate_month(month: u32) -> ValidationResult<()> {
    if !(1..=12).contains(&month) {
        return Err(ValidationError::OutOfRange {
            field: "fiscal_year_start_month".to_string(),
            min: 1,
            max: 12,
        });
    }
    Ok(())
}

// =============================================================================
// Tax Code Validators
// =============================================================================

/// Outcome of inspecting a supplier tax code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxCodeCheck {
    Valid,
    Missing,
    Malformed,
}

/// Checks a supplier tax code (MST).
///
/// ## Accepted Shapes
/// - `0101234567`       (10 digits, enterprise)
/// - `0101234567-001`   (10 digits + branch suffix)
///
/// Surrounding whitespace is ignored.
pub fn check_tax_code(code: Option<&str>) -> TaxCodeCheck {
    let code = match code.map(str::trim) {
        None | Some("") => return TaxCodeCheck::Missing,
        Some(c) => c,
    };

    let all_digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());

    let ok = match code.split_once('-') {
        None => all_digits(code, 10),
        Some((main, branch)) => all_digits(main, 10) && all_digits(branch, 3),
    };

    if ok {
        TaxCodeCheck::Valid
    } else {
        TaxCodeCheck::Malformed
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_rule_code() {
        assert!(validate_rule_code("CIT_TAX_RATE").is_ok());
        assert!(validate_rule_code("PIT_BRACKET_7").is_ok());

        assert!(validate_rule_code("").is_err());
        assert!(validate_rule_code("lower_case").is_err());
        assert!(validate_rule_code("HAS SPACE").is_err());
        assert!(validate_rule_code(&"A".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_rule_value() {
        assert!(validate_rule_value(dec!(0)).is_ok());
        assert!(validate_rule_value(dec!(4400000)).is_ok());
        assert!(validate_rule_value(dec!(-0.01)).is_err());
    }

    #[test]
    fn test_check_tax_code() {
        assert_eq!(check_tax_code(Some("0101234567")), TaxCodeCheck::Valid);
        assert_eq!(check_tax_code(Some(" 0101234567-001 ")), TaxCodeCheck::Valid);
        assert_eq!(check_tax_code(None), TaxCodeCheck::Missing);
        assert_eq!(check_tax_code(Some("  ")), TaxCodeCheck::Missing);
        assert_eq!(check_tax_code(Some("010123456")), TaxCodeCheck::Malformed);
        assert_eq!(check_tax_code(Some("0101234567-01")), TaxCodeCheck::Malformed);
        assert_eq!(check_tax_code(Some("ABC1234567")), TaxCodeCheck::Malformed);
    }

    #[test]
    fn test_validate_month() {
        assert!(validate_month(1).is_ok());
        assert!(validate_month(12).is_ok());
        assert!(validate_month(0).is_err());
        assert!(validate_month(13).is_err());
    }
}
