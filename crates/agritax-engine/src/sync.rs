//! # Rule Sync Service
//!
//! Loads the canonical catalog and merges it into a farm's rules; owns
//! the operator write paths (override, reset, custom rules, activation).
//!
//! ## Merge Outcomes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  catalog entry ──► (farm_id, code) row?                                │
//! │                        │                                                │
//! │          none ─────────┼──────────► CREATE   (is_system, not overridden)│
//! │                        │                                                │
//! │          row, not overridden ─────► UPDATE   value, effective_from,    │
//! │                        │                     metadata; history row     │
//! │                        │                     when the value changed    │
//! │          row, overridden ─────────► SKIP     metadata only             │
//! │                                                                         │
//! │  created + updated + skipped == catalog entries                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use agritax_core::rules::{RuleCatalog, SyncPlan};
use agritax_core::{RuleDraft, RuleHistory, RuleType, TaxRule};
use agritax_db::Database;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

/// Reads a catalog file; `.json` files parse as JSON, everything else as TOML.
pub fn load_catalog(path: &Path) -> EngineResult<RuleCatalog> {
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::CatalogLoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let catalog = if is_json {
        RuleCatalog::from_json_str(&text)?
    } else {
        RuleCatalog::from_toml_str(&text)?
    };

    info!(path = %path.display(), version = %catalog.version, entries = catalog.len(), "Rule catalog loaded");
    Ok(catalog)
}

/// Operator-facing rule maintenance.
#[derive(Debug, Clone)]
pub struct RuleSyncService {
    db: Database,
}

impl RuleSyncService {
    pub fn new(db: Database) -> Self {
        RuleSyncService { db }
    }

    /// Computes what a sync would do, writing nothing.
    pub async fn preview(&self, farm_id: &str, catalog: &RuleCatalog) -> EngineResult<SyncPlan> {
        Ok(self.db.rules().preview_sync(farm_id, catalog).await?)
    }

    /// Applies the catalog to the farm atomically.
    pub async fn apply(&self, farm_id: &str, catalog: &RuleCatalog) -> EngineResult<SyncPlan> {
        let previous = self.db.farms().catalog_version(farm_id).await?;
        if previous.as_deref() == Some(catalog.version.as_str()) {
            info!(farm_id, version = %catalog.version, "Catalog version already applied; re-syncing");
        }
        Ok(self.db.rules().apply_sync(farm_id, catalog).await?)
    }

    pub async fn override_value(
        &self,
        farm_id: &str,
        rule_id: &str,
        new_value: Decimal,
        changed_by: &str,
    ) -> EngineResult<TaxRule> {
        Ok(self.db.rules().update_value(farm_id, rule_id, new_value, changed_by).await?)
    }

    /// Overrides a rule addressed by its business code.
    pub async fn override_by_code(
        &self,
        farm_id: &str,
        code: &str,
        new_value: Decimal,
        changed_by: &str,
    ) -> EngineResult<TaxRule> {
        let rule = self.require_by_code(farm_id, code).await?;
        self.override_value(farm_id, &rule.id, new_value, changed_by).await
    }

    pub async fn reset(&self, farm_id: &str, rule_id: &str, changed_by: &str) -> EngineResult<TaxRule> {
        Ok(self.db.rules().reset_override(farm_id, rule_id, changed_by).await?)
    }

    pub async fn reset_by_code(&self, farm_id: &str, code: &str, changed_by: &str) -> EngineResult<TaxRule> {
        let rule = self.require_by_code(farm_id, code).await?;
        self.reset(farm_id, &rule.id, changed_by).await
    }

    pub async fn create_custom(&self, farm_id: &str, draft: &RuleDraft, changed_by: &str) -> EngineResult<TaxRule> {
        Ok(self.db.rules().create_custom(farm_id, draft, changed_by).await?)
    }

    pub async fn set_active(&self, farm_id: &str, rule_id: &str, active: bool) -> EngineResult<TaxRule> {
        let rule = self.db.rules().set_active(farm_id, rule_id, active).await?;
        if !active && matches!(rule.rule_type, RuleType::CitDeduction | RuleType::PitBracket) {
            warn!(farm_id, rule_code = %rule.code, "Deactivated a rule calculators may require");
        }
        Ok(rule)
    }

    pub async fn list(&self, farm_id: &str, rule_type: Option<RuleType>) -> EngineResult<Vec<TaxRule>> {
        Ok(self.db.rules().list(farm_id, rule_type).await?)
    }

    pub async fn get(&self, farm_id: &str, rule_id: &str) -> EngineResult<TaxRule> {
        self.db
            .rules()
            .get(farm_id, rule_id)
            .await?
            .ok_or_else(|| agritax_core::CoreError::not_found("TaxRule", rule_id).into())
    }

    pub async fn history(&self, farm_id: &str, rule_id: &str) -> EngineResult<Vec<RuleHistory>> {
        Ok(self.db.rules().history(farm_id, rule_id).await?)
    }

    async fn require_by_code(&self, farm_id: &str, code: &str) -> EngineResult<TaxRule> {
        self.db
            .rules()
            .get_by_code(farm_id, code)
            .await?
            .ok_or_else(|| agritax_core::CoreError::not_found("TaxRule", code).into())
    }
}
