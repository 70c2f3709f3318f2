//! # Rule Sync Merge
//!
//! A pure merge of the canonical catalog into one farm's rules.
//!
//! ## Merge Table
//! ```text
//! ┌────────────────────────┬──────────────────────────────┬──────────┐
//! │ Farm row               │ Effect                       │ Counted  │
//! ├────────────────────────┼──────────────────────────────┼──────────┤
//! │ none                   │ insert (system, not overrid.)│ created  │
//! │ exists, not overridden │ value, effective_from and    │ updated  │
//! │                        │ metadata := canonical        │          │
//! │ exists, overridden     │ name/description/reference   │ skipped  │
//! │                        │ only; value left untouched   │          │
//! └────────────────────────┴──────────────────────────────┴──────────┘
//! ```
//!
//! `created + updated + skipped == catalog.len()` always holds. Farm rows
//! with no catalog entry are left alone, and `is_active` is never touched.
//!
//! The database layer applies a [`SyncPlan`] in one transaction; preview
//! returns the plan without applying it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::catalog::{CatalogEntry, RuleCatalog};
use crate::error::{CoreResult, ValidationError};
use crate::types::TaxRule;

/// A farm row that Sync manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdate {
    /// The row after merging.
    pub merged: TaxRule,
    /// Previous value when the merge changes it.
    pub old_value: Option<Decimal>,
}

impl RuleUpdate {
    pub fn value_changed(&self) -> bool {
        self.old_value.is_some()
    }
}

/// A farm row protected by an override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSkip {
    /// The row with descriptive metadata refreshed; value untouched.
    pub merged: TaxRule,
    pub canonical_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub farm_id: String,
    pub catalog_version: String,
    pub creates: Vec<CatalogEntry>,
    pub updates: Vec<RuleUpdate>,
    pub skips: Vec<RuleSkip>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl SyncPlan {
    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            created: self.creates.len(),
            updated: self.updates.len(),
            skipped: self.skips.len(),
        }
    }

    /// Updates that actually change a value (each one needs a history row).
    pub fn value_changes(&self) -> impl Iterator<Item = &RuleUpdate> {
        self.updates.iter().filter(|u| u.value_changed())
    }
}

/// Compares the catalog with a farm's existing rules.
///
/// ## Errors
/// Returns a validation error if the catalog repeats a code.
pub fn plan_sync(farm_id: &str, catalog: &RuleCatalog, existing: &[TaxRule]) -> CoreResult<SyncPlan> {
    catalog.validate()?;

    let by_code: HashMap<&str, &TaxRule> = existing
        .iter()
        .filter(|r| r.farm_id == farm_id)
        .map(|r| (r.code.as_str(), r))
        .collect();

    let mut plan = SyncPlan {
        farm_id: farm_id.to_string(),
        catalog_version: catalog.version.clone(),
        creates: Vec::new(),
        updates: Vec::new(),
        skips: Vec::new(),
    };

    for entry in &catalog.rules {
        match by_code.get(entry.code.as_str()) {
            None => plan.creates.push(entry.clone()),
            Some(row) if row.value.is_overridden => {
                let mut merged = (*row).clone();
                refresh_metadata(&mut merged, entry);
                plan.skips.push(RuleSkip {
                    merged,
                    canonical_value: entry.default_value,
                });
            }
            Some(row) => {
                let mut merged = (*row).clone();
                let old_value = merged.value.apply_canonical(entry.default_value);
                refresh_metadata(&mut merged, entry);
                merged.rule_type = entry.rule_type;
                merged.category = entry.category.clone();
                merged.action = entry.action;
                merged.effective_from = entry.effective_from;
                merged.priority = entry.priority;
                merged.threshold = entry.threshold;
                merged.is_system = entry.is_system;
                plan.updates.push(RuleUpdate { merged, old_value });
            }
        }
    }

    debug_assert_eq!(
        plan.creates.len() + plan.updates.len() + plan.skips.len(),
        catalog.len()
    );

    Ok(plan)
}

fn refresh_metadata(rule: &mut TaxRule, entry: &CatalogEntry) {
    rule.name = entry.name.clone();
    rule.description = entry.description.clone();
    rule.reference = entry.reference.clone();
}

/// Guards against applying a plan computed for another farm.
pub fn check_plan_farm(plan: &SyncPlan, farm_id: &str) -> Result<(), ValidationError> {
    if plan.farm_id != farm_id {
        return Err(ValidationError::InvalidFormat {
            field: "farm_id".to_string(),
            reason: format!("plan was computed for farm {}", plan.farm_id),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
