//! # Canonical Rule Catalog
//!
//! The versioned list of system rule defaults that Sync merges into each farm.
//!
//! ## File Shape (TOML)
//! ```toml
//! version = "2025.1"
//!
//! [[rules]]
//! code = "PIT_PERSONAL_DEDUCTION"
//! rule_type = "PIT_DEDUCTION"
//! category = "PERSONAL"
//! action = "DEDUCT"
//! default_value = "11000000"
//! name = "Personal deduction"
//! effective_from = "2020-07-01"
//! ```
//!
//! JSON catalogs use the same field names.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CoreResult, ValidationError};
use crate::types::{RuleAction, RuleType};
use crate::validation::{validate_rule_code, validate_rule_value};

fn default_true() -> bool {
    true
}

/// One canonical rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub rule_type: RuleType,
    pub category: String,
    pub action: RuleAction,
    pub default_value: Decimal,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_system: bool,
    /// Bracket lower bound for PIT_BRACKET entries.
    #[serde(default)]
    pub threshold: Option<Decimal>,
}

/// A parsed and validated catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCatalog {
    pub version: String,
    #[serde(default)]
    pub rules: Vec<CatalogEntry>,
}

impl RuleCatalog {
    /// Parses a TOML catalog and validates it.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let catalog: RuleCatalog = toml::from_str(text).map_err(|e| ValidationError::InvalidFormat {
            field: "catalog".to_string(),
            reason: e.to_string(),
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parses a JSON catalog and validates it.
    pub fn from_json_str(text: &str) -> CoreResult<Self> {
        let catalog: RuleCatalog =
            serde_json::from_str(text).map_err(|e| ValidationError::InvalidFormat {
                field: "catalog".to_string(),
                reason: e.to_string(),
            })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Checks codes, values and uniqueness.
    ///
    /// ## Rules
    /// - Every code is well-formed and appears once
    /// - Default values and thresholds are non-negative
    /// - PIT_BRACKET entries carry a threshold
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "version".to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(self.rules.len());
        for entry in &self.rules {
            validate_rule_code(&entry.code)?;
            validate_rule_value(entry.default_value)?;

            if !seen.insert(entry.code.as_str()) {
                return Err(ValidationError::Duplicate {
                    field: "code".to_string(),
                    value: entry.code.clone(),
                });
            }

            if entry.category.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: format!("{}.category", entry.code),
                });
            }

            match (entry.rule_type, entry.threshold) {
                (RuleType::PitBracket, None) => {
                    return Err(ValidationError::Required {
                        field: format!("{}.threshold", entry.code),
                    });
                }
                (_, Some(t)) => validate_rule_value(t)?,
                _ => {}
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.rules.iter().find(|e| e.code == code)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
