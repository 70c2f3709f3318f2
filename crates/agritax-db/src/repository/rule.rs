//! # Tax Rule Repository
//!
//! Persistence for farm-scoped tax rules and their append-only history.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Rule Write Paths                                 │
//! │                                                                         │
//! │  update_value  ──► BEGIN                                               │
//! │                     INSERT rule_history  (old value read in the same   │
//! │                                           statement; no row ⇒ NotFound) │
//! │                     UPDATE tax_rules     (original_value set once)     │
//! │                    COMMIT                                              │
//! │                                                                         │
//! │  reset_override ─► BEGIN                                               │
//! │                     INSERT rule_history  (only if the value changes)   │
//! │                     UPDATE tax_rules     (value := original_value)     │
//! │                    COMMIT                                              │
//! │                                                                         │
//! │  apply_sync ─────► BEGIN                                               │
//! │                     UPDATE farms         (takes the write lock)        │
//! │                     SELECT farm rules ─► plan_sync (pure merge)        │
//! │                     INSERT creates / UPDATE updates + skips            │
//! │                     INSERT rule_history  (changed_by = system:sync)    │
//! │                    COMMIT                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The history insert is the first statement of every write transaction,
//! so two concurrent overrides serialize on SQLite's write lock and each
//! records the value it actually replaced.

use agritax_core::rules::sync::check_plan_farm;
use agritax_core::rules::{plan_sync, CatalogEntry, RuleCatalog, SyncPlan};
use agritax_core::validation::{validate_required, validate_rule_value};
use agritax_core::{
    CoreError, RuleAction, RuleDraft, RuleHistory, RuleType, RuleValue, TaxRule, ValidationError,
    SYSTEM_SYNC_ACTOR,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::{decode_decimal, decode_opt_decimal, encode_decimal, encode_opt_decimal};
use crate::error::{DbError, DbResult};

/// Column list for the `tax_rules` table.
const COLUMNS: &str = "id, farm_id, code, rule_type, category, action, name, description, \
                       value, original_value, is_overridden, threshold, is_system, is_active, \
                       reference, effective_from, priority, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TaxRuleRow {
    id: String,
    farm_id: String,
    code: String,
    rule_type: RuleType,
    category: String,
    action: RuleAction,
    name: String,
    description: Option<String>,
    value: String,
    original_value: Option<String>,
    is_overridden: bool,
    threshold: Option<String>,
    is_system: bool,
    is_active: bool,
    reference: Option<String>,
    effective_from: NaiveDate,
    priority: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaxRuleRow> for TaxRule {
    type Error = DbError;

    fn try_from(row: TaxRuleRow) -> DbResult<Self> {
        Ok(TaxRule {
            value: RuleValue {
                value: decode_decimal("tax_rules.value", &row.value)?,
                original_value: decode_opt_decimal(
                    "tax_rules.original_value",
                    row.original_value.as_deref(),
                )?,
                is_overridden: row.is_overridden,
            },
            threshold: decode_opt_decimal("tax_rules.threshold", row.threshold.as_deref())?,
            id: row.id,
            farm_id: row.farm_id,
            code: row.code,
            rule_type: row.rule_type,
            category: row.category,
            action: row.action,
            name: row.name,
            description: row.description,
            is_system: row.is_system,
            is_active: row.is_active,
            reference: row.reference,
            effective_from: row.effective_from,
            priority: row.priority,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: String,
    rule_id: String,
    old_value: Option<String>,
    new_value: String,
    changed_by: String,
    changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for RuleHistory {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> DbResult<Self> {
        Ok(RuleHistory {
            old_value: decode_opt_decimal("rule_history.old_value", row.old_value.as_deref())?,
            new_value: decode_decimal("rule_history.new_value", &row.new_value)?,
            id: row.id,
            rule_id: row.rule_id,
            changed_by: row.changed_by,
            changed_at: row.changed_at,
        })
    }
}

fn rows_to_rules(rows: Vec<TaxRuleRow>) -> DbResult<Vec<TaxRule>> {
    rows.into_iter().map(TaxRule::try_from).collect()
}

/// Repository for tax rules and rule history.
#[derive(Debug, Clone)]
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    /// Creates a new RuleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RuleRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists a farm's rules, optionally filtered by type.
    ///
    /// Inactive rules are included; ordered by type, category, code.
    pub async fn list(&self, farm_id: &str, rule_type: Option<RuleType>) -> DbResult<Vec<TaxRule>> {
        let query = format!(
            "SELECT {COLUMNS} FROM tax_rules \
             WHERE farm_id = ?1 AND (?2 IS NULL OR rule_type = ?2) \
             ORDER BY rule_type, category, code"
        );
        let rows: Vec<TaxRuleRow> = sqlx::query_as(&query)
            .bind(farm_id)
            .bind(rule_type)
            .fetch_all(&self.pool)
            .await?;

        rows_to_rules(rows)
    }

    /// Active rules with `effective_from <= as_of`: the input of a rule snapshot.
    pub async fn list_effective(&self, farm_id: &str, as_of: NaiveDate) -> DbResult<Vec<TaxRule>> {
        let query = format!(
            "SELECT {COLUMNS} FROM tax_rules \
             WHERE farm_id = ?1 AND is_active = 1 AND effective_from <= ?2 \
             ORDER BY code"
        );
        let rows: Vec<TaxRuleRow> = sqlx::query_as(&query)
            .bind(farm_id)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;

        debug!(farm_id, %as_of, count = rows.len(), "Loaded effective rules");
        rows_to_rules(rows)
    }

    /// Gets a rule by id within a farm.
    pub async fn get(&self, farm_id: &str, rule_id: &str) -> DbResult<Option<TaxRule>> {
        let mut conn = self.pool.acquire().await?;
        fetch_rule(&mut conn, farm_id, rule_id).await
    }

    /// Gets a rule by its business key `(farm_id, code)`.
    pub async fn get_by_code(&self, farm_id: &str, code: &str) -> DbResult<Option<TaxRule>> {
        let query = format!("SELECT {COLUMNS} FROM tax_rules WHERE farm_id = ?1 AND code = ?2");
        let row: Option<TaxRuleRow> = sqlx::query_as(&query)
            .bind(farm_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaxRule::try_from).transpose()
    }

    /// Full value history of a rule, oldest first.
    pub async fn history(&self, farm_id: &str, rule_id: &str) -> DbResult<Vec<RuleHistory>> {
        if self.get(farm_id, rule_id).await?.is_none() {
            return Err(DbError::not_found("TaxRule", rule_id));
        }

        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, rule_id, old_value, new_value, changed_by, changed_at \
             FROM rule_history WHERE rule_id = ?1 \
             ORDER BY changed_at, rowid",
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RuleHistory::try_from).collect()
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Computes the sync plan without writing anything.
    pub async fn preview_sync(&self, farm_id: &str, catalog: &RuleCatalog) -> DbResult<SyncPlan> {
        let mut conn = self.pool.acquire().await?;
        ensure_farm(&mut conn, farm_id).await?;
        let existing = fetch_farm_rules(&mut conn, farm_id).await?;
        Ok(plan_sync(farm_id, catalog, &existing)?)
    }

    /// Merges the catalog into the farm's rules in one transaction.
    ///
    /// The plan is computed inside the transaction, after the write lock is
    /// taken, so an override committed concurrently is never clobbered.
    pub async fn apply_sync(&self, farm_id: &str, catalog: &RuleCatalog) -> DbResult<SyncPlan> {
        catalog.validate().map_err(CoreError::from)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            "UPDATE farms SET catalog_version = ?1, rules_synced_at = ?2 WHERE id = ?3",
        )
        .bind(&catalog.version)
        .bind(now)
        .bind(farm_id)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found("Farm", farm_id));
        }

        let existing = fetch_farm_rules(&mut tx, farm_id).await?;
        let plan = plan_sync(farm_id, catalog, &existing)?;
        check_plan_farm(&plan, farm_id).map_err(CoreError::from)?;

        for entry in &plan.creates {
            insert_catalog_rule(&mut tx, farm_id, entry, now).await?;
        }

        for update in &plan.updates {
            write_merged(&mut tx, &update.merged, now).await?;
            if let Some(old_value) = update.old_value {
                insert_history(
                    &mut tx,
                    &update.merged.id,
                    Some(old_value),
                    update.merged.current_value(),
                    SYSTEM_SYNC_ACTOR,
                    now,
                )
                .await?;
            }
        }

        for skip in &plan.skips {
            refresh_metadata(&mut tx, &skip.merged, now).await?;
        }

        tx.commit().await?;

        let summary = plan.summary();
        info!(
            farm_id,
            catalog_version = %catalog.version,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            value_changes = plan.value_changes().count(),
            "Rule sync applied"
        );

        Ok(plan)
    }

    // =========================================================================
    // Overrides
    // =========================================================================

    /// Overrides a rule value for one farm.
    ///
    /// `original_value` is captured on the first override only. The rule
    /// update and its history row commit together or not at all.
    ///
    /// ## Errors
    /// - `Domain(Validation)` for a negative value or empty actor
    /// - `NotFound` if the rule does not exist for this farm
    pub async fn update_value(
        &self,
        farm_id: &str,
        rule_id: &str,
        new_value: Decimal,
        changed_by: &str,
    ) -> DbResult<TaxRule> {
        validate_rule_value(new_value).map_err(CoreError::from)?;
        validate_required("changed_by", changed_by).map_err(CoreError::from)?;
        let now = Utc::now();
        let encoded = encode_decimal(new_value);

        let mut tx = self.pool.begin().await?;

        let logged = sqlx::query(
            "INSERT INTO rule_history (id, rule_id, old_value, new_value, changed_by, changed_at) \
             SELECT ?1, id, value, ?2, ?3, ?4 FROM tax_rules WHERE id = ?5 AND farm_id = ?6",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&encoded)
        .bind(changed_by)
        .bind(now)
        .bind(rule_id)
        .bind(farm_id)
        .execute(&mut *tx)
        .await?;
        if logged.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRule", rule_id));
        }

        sqlx::query(
            "UPDATE tax_rules \
             SET original_value = COALESCE(original_value, value), \
                 value = ?1, is_overridden = 1, updated_at = ?2 \
             WHERE id = ?3 AND farm_id = ?4",
        )
        .bind(&encoded)
        .bind(now)
        .bind(rule_id)
        .bind(farm_id)
        .execute(&mut *tx)
        .await?;

        let rule = fetch_rule(&mut tx, farm_id, rule_id)
            .await?
            .ok_or_else(|| DbError::not_found("TaxRule", rule_id))?;

        tx.commit().await?;

        info!(farm_id, rule_code = %rule.code, %new_value, changed_by, "Rule value overridden");
        Ok(rule)
    }

    /// Hands an overridden rule back to sync management.
    ///
    /// Restores `value := original_value` and clears `is_overridden`;
    /// `original_value` itself is kept. A history row is written when the
    /// value actually changes. Resetting a non-overridden rule is a no-op.
    pub async fn reset_override(&self, farm_id: &str, rule_id: &str, changed_by: &str) -> DbResult<TaxRule> {
        validate_required("changed_by", changed_by).map_err(CoreError::from)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO rule_history (id, rule_id, old_value, new_value, changed_by, changed_at) \
             SELECT ?1, id, value, COALESCE(original_value, value), ?2, ?3 FROM tax_rules \
             WHERE id = ?4 AND farm_id = ?5 AND is_overridden = 1 \
               AND value <> COALESCE(original_value, value)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(changed_by)
        .bind(now)
        .bind(rule_id)
        .bind(farm_id)
        .execute(&mut *tx)
        .await?;

        let reset = sqlx::query(
            "UPDATE tax_rules \
             SET value = COALESCE(original_value, value), is_overridden = 0, updated_at = ?1 \
             WHERE id = ?2 AND farm_id = ?3 AND is_overridden = 1",
        )
        .bind(now)
        .bind(rule_id)
        .bind(farm_id)
        .execute(&mut *tx)
        .await?;

        // Zero rows means either a missing rule or one sync already manages
        let rule = fetch_rule(&mut tx, farm_id, rule_id)
            .await?
            .ok_or_else(|| DbError::not_found("TaxRule", rule_id))?;

        tx.commit().await?;

        if reset.rows_affected() > 0 {
            info!(farm_id, rule_code = %rule.code, changed_by, "Rule override reset");
        } else {
            debug!(farm_id, rule_code = %rule.code, "Rule not overridden, reset skipped");
        }
        Ok(rule)
    }

    // =========================================================================
    // User-created rules
    // =========================================================================

    /// Creates a farm-specific rule that no catalog manages.
    ///
    /// The rule starts as `is_system = false` and gets an initial history
    /// row with no old value.
    pub async fn create_custom(&self, farm_id: &str, draft: &RuleDraft, changed_by: &str) -> DbResult<TaxRule> {
        draft.validate().map_err(CoreError::from)?;
        validate_required("changed_by", changed_by).map_err(CoreError::from)?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;
        ensure_farm(&mut tx, farm_id).await?;

        let taken: Option<String> =
            sqlx::query_scalar("SELECT id FROM tax_rules WHERE farm_id = ?1 AND code = ?2")
                .bind(farm_id)
                .bind(&draft.code)
                .fetch_optional(&mut *tx)
                .await?;
        if taken.is_some() {
            return Err(CoreError::from(ValidationError::Duplicate {
                field: "code".to_string(),
                value: draft.code.clone(),
            })
            .into());
        }

        sqlx::query(
            "INSERT INTO tax_rules (id, farm_id, code, rule_type, category, action, name, \
                 description, value, original_value, is_overridden, threshold, is_system, \
                 is_active, reference, effective_from, priority, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 0, ?10, 0, 1, ?11, ?12, ?13, ?14, ?14)",
        )
        .bind(&id)
        .bind(farm_id)
        .bind(&draft.code)
        .bind(draft.rule_type)
        .bind(&draft.category)
        .bind(draft.action)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(encode_decimal(draft.value))
        .bind(encode_opt_decimal(draft.threshold))
        .bind(&draft.reference)
        .bind(draft.effective_from)
        .bind(draft.priority)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_history(&mut tx, &id, None, draft.value, changed_by, now).await?;

        let rule = fetch_rule(&mut tx, farm_id, &id)
            .await?
            .ok_or_else(|| DbError::not_found("TaxRule", &id))?;

        tx.commit().await?;

        info!(farm_id, rule_code = %rule.code, changed_by, "Custom rule created");
        Ok(rule)
    }

    /// Activates or deactivates a rule. Inactive rules are invisible to
    /// resolution; sync never flips this flag.
    pub async fn set_active(&self, farm_id: &str, rule_id: &str, active: bool) -> DbResult<TaxRule> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE tax_rules SET is_active = ?1, updated_at = ?2 WHERE id = ?3 AND farm_id = ?4",
        )
        .bind(active)
        .bind(Utc::now())
        .bind(rule_id)
        .bind(farm_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRule", rule_id));
        }

        let rule = fetch_rule(&mut tx, farm_id, rule_id)
            .await?
            .ok_or_else(|| DbError::not_found("TaxRule", rule_id))?;
        tx.commit().await?;

        debug!(farm_id, rule_code = %rule.code, active, "Rule activation changed");
        Ok(rule)
    }
}

// =============================================================================
// Connection-level helpers (usable inside and outside transactions)
// =============================================================================

async fn ensure_farm(conn: &mut SqliteConnection, farm_id: &str) -> DbResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM farms WHERE id = ?1")
        .bind(farm_id)
        .fetch_optional(&mut *conn)
        .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| DbError::not_found("Farm", farm_id))
}

async fn fetch_rule(conn: &mut SqliteConnection, farm_id: &str, rule_id: &str) -> DbResult<Option<TaxRule>> {
    let query = format!("SELECT {COLUMNS} FROM tax_rules WHERE id = ?1 AND farm_id = ?2");
    let row: Option<TaxRuleRow> = sqlx::query_as(&query)
        .bind(rule_id)
        .bind(farm_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(TaxRule::try_from).transpose()
}

async fn fetch_farm_rules(conn: &mut SqliteConnection, farm_id: &str) -> DbResult<Vec<TaxRule>> {
    let query = format!("SELECT {COLUMNS} FROM tax_rules WHERE farm_id = ?1 ORDER BY code");
    let rows: Vec<TaxRuleRow> = sqlx::query_as(&query)
        .bind(farm_id)
        .fetch_all(&mut *conn)
        .await?;

    rows_to_rules(rows)
}

async fn insert_catalog_rule(
    conn: &mut SqliteConnection,
    farm_id: &str,
    entry: &CatalogEntry,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO tax_rules (id, farm_id, code, rule_type, category, action, name, \
             description, value, original_value, is_overridden, threshold, is_system, \
             is_active, reference, effective_from, priority, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 0, ?10, ?11, 1, ?12, ?13, ?14, ?15, ?15)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(farm_id)
    .bind(&entry.code)
    .bind(entry.rule_type)
    .bind(&entry.category)
    .bind(entry.action)
    .bind(&entry.name)
    .bind(&entry.description)
    .bind(encode_decimal(entry.default_value))
    .bind(encode_opt_decimal(entry.threshold))
    .bind(entry.is_system)
    .bind(&entry.reference)
    .bind(entry.effective_from)
    .bind(entry.priority)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes a sync-managed row. Guarded by `is_overridden = 0` so a plan can
/// never overwrite an override.
async fn write_merged(conn: &mut SqliteConnection, rule: &TaxRule, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        "UPDATE tax_rules \
         SET rule_type = ?1, category = ?2, action = ?3, name = ?4, description = ?5, \
             value = ?6, threshold = ?7, is_system = ?8, reference = ?9, \
             effective_from = ?10, priority = ?11, updated_at = ?12 \
         WHERE id = ?13 AND farm_id = ?14 AND is_overridden = 0",
    )
    .bind(rule.rule_type)
    .bind(&rule.category)
    .bind(rule.action)
    .bind(&rule.name)
    .bind(&rule.description)
    .bind(encode_decimal(rule.current_value()))
    .bind(encode_opt_decimal(rule.threshold))
    .bind(rule.is_system)
    .bind(&rule.reference)
    .bind(rule.effective_from)
    .bind(rule.priority)
    .bind(now)
    .bind(&rule.id)
    .bind(&rule.farm_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn refresh_metadata(conn: &mut SqliteConnection, rule: &TaxRule, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        "UPDATE tax_rules SET name = ?1, description = ?2, reference = ?3, updated_at = ?4 \
         WHERE id = ?5 AND farm_id = ?6",
    )
    .bind(&rule.name)
    .bind(&rule.description)
    .bind(&rule.reference)
    .bind(now)
    .bind(&rule.id)
    .bind(&rule.farm_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_history(
    conn: &mut SqliteConnection,
    rule_id: &str,
    old_value: Option<Decimal>,
    new_value: Decimal,
    changed_by: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO rule_history (id, rule_id, old_value, new_value, changed_by, changed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(rule_id)
    .bind(encode_opt_decimal(old_value))
    .bind(encode_decimal(new_value))
    .bind(changed_by)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db_with_farm, FARM};
    use rust_decimal_macros::dec;

    fn entry(code: &str, category: &str, value: Decimal) -> CatalogEntry {
        CatalogEntry {
            code: code.to_string(),
            rule_type: RuleType::PitDeduction,
            category: category.to_string(),
            action: RuleAction::Deduct,
            default_value: value,
            name: format!("{category} deduction"),
            description: None,
            reference: Some("Resolution 954/2020".to_string()),
            effective_from: NaiveDate::from_ymd_opt(2020, 7, 1).unwrap(),
            priority: 0,
            is_system: true,
            threshold: None,
        }
    }

    fn catalog(version: &str, personal: Decimal, dependent: Decimal) -> RuleCatalog {
        RuleCatalog {
            version: version.to_string(),
            rules: vec![
                entry("PIT_PERSONAL", "PERSONAL", personal),
                entry("PIT_DEPENDENT", "DEPENDENT", dependent),
            ],
        }
    }

    async fn synced() -> (crate::Database, TaxRule) {
        let db = db_with_farm().await;
        db.rules()
            .apply_sync(FARM, &catalog("v1", dec!(11000000), dec!(4400000)))
            .await
            .unwrap();
        let rule = db.rules().get_by_code(FARM, "PIT_PERSONAL").await.unwrap().unwrap();
        (db, rule)
    }

    #[tokio::test]
    async fn test_sync_creates_then_updates() {
        let db = db_with_farm().await;
        let rules = db.rules();

        let plan = rules
            .apply_sync(FARM, &catalog("v1", dec!(11000000), dec!(4400000)))
            .await
            .unwrap();
        assert_eq!(plan.summary().created, 2);

        let plan = rules
            .apply_sync(FARM, &catalog("v2", dec!(15500000), dec!(6200000)))
            .await
            .unwrap();
        let summary = plan.summary();
        assert_eq!((summary.created, summary.updated, summary.skipped), (0, 2, 0));

        let personal = rules.get_by_code(FARM, "PIT_PERSONAL").await.unwrap().unwrap();
        assert_eq!(personal.current_value(), dec!(15500000));
        assert!(personal.is_system);

        let history = rules.history(FARM, &personal.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].changed_by, SYSTEM_SYNC_ACTOR);
        assert_eq!(history[0].old_value, Some(dec!(11000000)));

        assert_eq!(db.farms().catalog_version(FARM).await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_override_survives_repeated_sync() {
        let (db, rule) = synced().await;
        let rules = db.rules();

        let updated = rules
            .update_value(FARM, &rule.id, dec!(12000000), "accountant@farm")
            .await
            .unwrap();
        assert!(updated.value.is_overridden);
        assert_eq!(updated.value.original_value, Some(dec!(11000000)));

        for version in ["v2", "v3", "v4"] {
            let plan = rules
                .apply_sync(FARM, &catalog(version, dec!(15500000), dec!(6200000)))
                .await
                .unwrap();
            let s = plan.summary();
            assert_eq!(s.created + s.updated + s.skipped, 2);
            assert_eq!(s.skipped, 1);
        }

        let after = rules.get(FARM, &rule.id).await.unwrap().unwrap();
        assert_eq!(after.current_value(), dec!(12000000));
        assert_eq!(after.value.original_value, Some(dec!(11000000)));
    }

    #[tokio::test]
    async fn test_second_override_keeps_original() {
        let (db, rule) = synced().await;
        let rules = db.rules();

        rules.update_value(FARM, &rule.id, dec!(12000000), "a").await.unwrap();
        let second = rules.update_value(FARM, &rule.id, dec!(13000000), "b").await.unwrap();
        assert_eq!(second.current_value(), dec!(13000000));
        assert_eq!(second.value.original_value, Some(dec!(11000000)));

        let history = rules.history(FARM, &rule.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].old_value, Some(dec!(11000000)));
        assert_eq!(history[1].old_value, Some(dec!(12000000)));
        assert_eq!(history[1].new_value, dec!(13000000));
        assert_eq!(history[1].changed_by, "b");
    }

    #[tokio::test]
    async fn test_override_rejects_negative_and_foreign_rule() {
        let (db, rule) = synced().await;
        let rules = db.rules();

        let err = rules.update_value(FARM, &rule.id, dec!(-1), "a").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let err = rules.update_value("other-farm", &rule.id, dec!(1), "a").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        // Nothing was written by the rejected calls
        assert!(rules.history(FARM, &rule.id).await.unwrap().is_empty());
        let unchanged = rules.get(FARM, &rule.id).await.unwrap().unwrap();
        assert!(!unchanged.value.is_overridden);
    }

    #[tokio::test]
    async fn test_reset_returns_rule_to_sync() {
        let (db, rule) = synced().await;
        let rules = db.rules();

        rules.update_value(FARM, &rule.id, dec!(12000000), "a").await.unwrap();
        let reset = rules.reset_override(FARM, &rule.id, "a").await.unwrap();
        assert_eq!(reset.current_value(), dec!(11000000));
        assert!(!reset.value.is_overridden);
        assert_eq!(reset.value.original_value, Some(dec!(11000000)));

        rules
            .apply_sync(FARM, &catalog("v2", dec!(15500000), dec!(4400000)))
            .await
            .unwrap();
        let after = rules.get(FARM, &rule.id).await.unwrap().unwrap();
        assert_eq!(after.current_value(), dec!(15500000));

        // override, reset, sync
        assert_eq!(rules.history(FARM, &rule.id).await.unwrap().len(), 3);

        // Resetting again changes nothing and logs nothing
        let again = rules.reset_override(FARM, &rule.id, "a").await.unwrap();
        assert_eq!(again.current_value(), dec!(15500000));
        assert_eq!(rules.history(FARM, &rule.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reset_keeps_synced_value_of_unoverridden_rule() {
        let (db, rule) = synced().await;
        let rules = db.rules();

        // original_value stays at 11M after the first override/reset cycle
        rules.update_value(FARM, &rule.id, dec!(12000000), "a").await.unwrap();
        rules.reset_override(FARM, &rule.id, "a").await.unwrap();
        rules
            .apply_sync(FARM, &catalog("v2", dec!(15500000), dec!(4400000)))
            .await
            .unwrap();
        let before = rules.history(FARM, &rule.id).await.unwrap().len();

        let reset = rules.reset_override(FARM, &rule.id, "b").await.unwrap();
        assert_eq!(reset.current_value(), dec!(15500000));
        assert!(!reset.value.is_overridden);

        let stored = rules.get(FARM, &rule.id).await.unwrap().unwrap();
        assert_eq!(stored.current_value(), dec!(15500000));
        assert_eq!(rules.history(FARM, &rule.id).await.unwrap().len(), before);

        let err = rules.reset_override(FARM, "no-such-rule", "b").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_overrides_each_leave_history() {
        let path = std::env::temp_dir().join(format!("agritax-overrides-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let db = crate::Database::new(crate::DbConfig::new(&path).max_connections(4))
            .await
            .unwrap();
        db.farms()
            .insert(&agritax_core::Farm {
                id: FARM.to_string(),
                name: "Green Valley".to_string(),
                fiscal_year_start_month: 1,
            })
            .await
            .unwrap();
        db.rules()
            .apply_sync(FARM, &catalog("v1", dec!(11000000), dec!(4400000)))
            .await
            .unwrap();
        let rule = db.rules().get_by_code(FARM, "PIT_PERSONAL").await.unwrap().unwrap();

        let values: Vec<Decimal> = (1..=8).map(|i| Decimal::from(12_000_000 + i)).collect();
        let writes = values.iter().map(|value| {
            let rules = db.rules();
            let id = rule.id.clone();
            async move { rules.update_value(FARM, &id, *value, "clerk").await }
        });
        let results = futures_util::future::join_all(writes).await;
        assert!(results.iter().all(|r| r.is_ok()), "{results:?}");

        let history = db.rules().history(FARM, &rule.id).await.unwrap();
        assert_eq!(history.len(), values.len());

        let stored = db.rules().get(FARM, &rule.id).await.unwrap().unwrap();
        assert!(values.contains(&stored.current_value()));
        assert_eq!(stored.value.original_value, Some(dec!(11000000)));

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let db = db_with_farm().await;
        let plan = db
            .rules()
            .preview_sync(FARM, &catalog("v1", dec!(1), dec!(2)))
            .await
            .unwrap();
        assert_eq!(plan.summary().created, 2);
        assert!(db.rules().list(FARM, None).await.unwrap().is_empty());

        let err = db
            .rules()
            .preview_sync("ghost", &catalog("v1", dec!(1), dec!(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_catalog_code_rejected_atomically() {
        let db = db_with_farm().await;
        let mut bad = catalog("v1", dec!(1), dec!(2));
        bad.rules.push(entry("PIT_PERSONAL", "PERSONAL", dec!(3)));

        let err = db.rules().apply_sync(FARM, &bad).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
        assert!(db.rules().list(FARM, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_rule_and_activation() {
        let (db, _) = synced().await;
        let rules = db.rules();

        let draft = RuleDraft {
            code: "PIT_UNION_FEE".to_string(),
            rule_type: RuleType::PitDeduction,
            category: "UNION_FEE".to_string(),
            action: RuleAction::Deduct,
            name: "Union fee".to_string(),
            description: None,
            value: dec!(50000),
            threshold: None,
            reference: None,
            effective_from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            priority: 5,
        };
        let custom = rules.create_custom(FARM, &draft, "owner").await.unwrap();
        assert!(!custom.is_system);
        assert_eq!(custom.priority, 5);

        let history = rules.history(FARM, &custom.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_value, None);

        let err = rules.create_custom(FARM, &draft, "owner").await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));

        let as_of = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(rules.list_effective(FARM, as_of).await.unwrap().len(), 3);

        let off = rules.set_active(FARM, &custom.id, false).await.unwrap();
        assert!(!off.is_active);
        assert_eq!(rules.list_effective(FARM, as_of).await.unwrap().len(), 2);
        assert_eq!(rules.list(FARM, Some(RuleType::PitDeduction)).await.unwrap().len(), 3);

        // Sync leaves user rules and activation alone
        rules
            .apply_sync(FARM, &catalog("v2", dec!(11000000), dec!(4400000)))
            .await
            .unwrap();
        assert!(!rules.get(FARM, &custom.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let (db, rule) = synced().await;
        db.rules().update_value(FARM, &rule.id, dec!(1), "a").await.unwrap();

        let delete = sqlx::query("DELETE FROM rule_history").execute(db.pool()).await;
        assert!(delete.is_err());
        let update = sqlx::query("UPDATE rule_history SET changed_by = 'x'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());
    }
}
