//! # CIT Result Repository
//!
//! Stored CIT results, their adjustment items and the loss carryforward
//! ledger.
//!
//! ## Replace Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  save(result) ── one transaction ──────────────────────────────────────│
//! │                                                                         │
//! │   DELETE cit_results (farm, period)  ──cascade──► cit_adjustment_items │
//! │   INSERT cit_results + items (seq 0..n)                                 │
//! │                                                                         │
//! │   ANNUAL only:                                                          │
//! │   DELETE cit_loss_usage  used_in_period = period                       │
//! │   INSERT cit_loss_usage  one row per consumed prior loss               │
//! │   loss_carried > 0 ? UPSERT cit_losses (farm, year)                    │
//! │                    : DELETE cit_losses (farm, year)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Running the same period twice leaves exactly one result, one item set
//! and one set of loss rows. Deleting a year's loss also drops the usage
//! later years recorded against it; those years must be recalculated.

use agritax_core::cit::{CitResult, LossBalance};
use agritax_core::{Money, Period, PeriodType};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::{decode_money, decode_payload, encode_decimal, encode_money, encode_payload};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct LossRow {
    loss_year: i32,
    amount: String,
}

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    loss_year: i32,
    amount: String,
}

/// Repository for CIT results and loss carryforward.
#[derive(Debug, Clone)]
pub struct CitResultRepository {
    pool: SqlitePool,
}

impl CitResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CitResultRepository { pool }
    }

    /// Replaces the stored result for `(farm_id, period)` and updates the
    /// loss ledger, atomically.
    pub async fn save(&self, result: &CitResult) -> DbResult<()> {
        let payload = encode_payload(result)?;
        let period = result.period.to_string();
        let now = Utc::now();
        let result_id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cit_results WHERE farm_id = ?1 AND period = ?2")
            .bind(&result.farm_id)
            .bind(&period)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO cit_results (id, farm_id, period, period_type, period_start, period_end, \
                 total_revenue, total_expenses, accounting_profit, taxable_income, tax_rate, \
                 cit_amount, loss_carried, payload, calculated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(&result_id)
        .bind(&result.farm_id)
        .bind(&period)
        .bind(result.period_type)
        .bind(result.period_start)
        .bind(result.period_end)
        .bind(encode_money(result.total_revenue))
        .bind(encode_money(result.total_expenses))
        .bind(encode_money(result.accounting_profit))
        .bind(encode_money(result.taxable_income))
        .bind(encode_decimal(result.tax_rate.fraction()))
        .bind(encode_money(result.cit_amount))
        .bind(encode_money(result.loss_carried))
        .bind(&payload)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (seq, item) in result.adjustments.iter().enumerate() {
            sqlx::query(
                "INSERT INTO cit_adjustment_items (id, result_id, seq, adjustment_type, category, \
                     rule_code, amount, source_transaction_id, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&result_id)
            .bind(seq as i64)
            .bind(item.adjustment_type)
            .bind(&item.category)
            .bind(&item.rule_code)
            .bind(encode_money(item.amount))
            .bind(&item.source_transaction_id)
            .bind(&item.description)
            .execute(&mut *tx)
            .await?;
        }

        if result.period_type == PeriodType::Annual {
            let year = result.period.year();

            sqlx::query(
                "DELETE FROM cit_loss_usage WHERE used_in_period = ?1 \
                 AND loss_id IN (SELECT id FROM cit_losses WHERE farm_id = ?2)",
            )
            .bind(&period)
            .bind(&result.farm_id)
            .execute(&mut *tx)
            .await?;

            for usage in &result.loss_usage {
                let recorded = sqlx::query(
                    "INSERT INTO cit_loss_usage (id, loss_id, used_in_period, used_in_year, amount) \
                     SELECT ?1, id, ?2, ?3, ?4 FROM cit_losses WHERE farm_id = ?5 AND loss_year = ?6",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&period)
                .bind(year)
                .bind(encode_money(usage.amount))
                .bind(&result.farm_id)
                .bind(usage.loss_year)
                .execute(&mut *tx)
                .await?;
                if recorded.rows_affected() == 0 {
                    return Err(DbError::not_found("CitLoss", usage.loss_year.to_string()));
                }
            }

            if result.loss_carried.is_positive() {
                sqlx::query(
                    "INSERT INTO cit_losses (id, farm_id, loss_year, amount) VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT (farm_id, loss_year) DO UPDATE SET amount = excluded.amount",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&result.farm_id)
                .bind(year)
                .bind(encode_money(result.loss_carried))
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query("DELETE FROM cit_losses WHERE farm_id = ?1 AND loss_year = ?2")
                    .bind(&result.farm_id)
                    .bind(year)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        info!(
            farm_id = %result.farm_id,
            period = %period,
            items = result.adjustments.len(),
            cit_amount = %result.cit_amount,
            loss_carried = %result.loss_carried,
            "CIT result saved"
        );
        Ok(())
    }

    pub async fn get(&self, farm_id: &str, period: Period) -> DbResult<Option<CitResult>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM cit_results WHERE farm_id = ?1 AND period = ?2")
                .bind(farm_id)
                .bind(period.to_string())
                .fetch_optional(&self.pool)
                .await?;

        payload
            .map(|p| decode_payload("cit_results.payload", &p))
            .transpose()
    }

    /// Number of stored adjustment items for a period.
    pub async fn adjustment_count(&self, farm_id: &str, period: Period) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cit_adjustment_items i \
             JOIN cit_results r ON r.id = i.result_id \
             WHERE r.farm_id = ?1 AND r.period = ?2",
        )
        .bind(farm_id)
        .bind(period.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Prior-year losses still available to fiscal year `year`.
    ///
    /// Only usage recorded by years before `year` is subtracted, so
    /// recalculating `year` itself sees the same balances every time.
    pub async fn loss_balances(&self, farm_id: &str, year: i32) -> DbResult<Vec<LossBalance>> {
        let losses: Vec<LossRow> = sqlx::query_as(
            "SELECT loss_year, amount FROM cit_losses \
             WHERE farm_id = ?1 AND loss_year < ?2 ORDER BY loss_year",
        )
        .bind(farm_id)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        let usage: Vec<UsageRow> = sqlx::query_as(
            "SELECT l.loss_year, u.amount FROM cit_loss_usage u \
             JOIN cit_losses l ON l.id = u.loss_id \
             WHERE l.farm_id = ?1 AND u.used_in_year < ?2",
        )
        .bind(farm_id)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        let mut used: BTreeMap<i32, Money> = BTreeMap::new();
        for row in usage {
            *used.entry(row.loss_year).or_default() += decode_money("cit_loss_usage.amount", &row.amount)?;
        }

        let mut balances = Vec::with_capacity(losses.len());
        for row in losses {
            let amount = decode_money("cit_losses.amount", &row.amount)?;
            let remaining = amount - used.get(&row.loss_year).copied().unwrap_or_default();
            if remaining.is_positive() {
                balances.push(LossBalance {
                    loss_year: row.loss_year,
                    remaining,
                });
            }
        }

        debug!(farm_id, year, open_losses = balances.len(), "Loaded loss balances");
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db_with_farm, FARM};
    use agritax_core::cit::{AdjustmentType, CitAdjustmentItem, LossUsage};
    use agritax_core::Rate;
    use rust_decimal_macros::dec;

    fn annual(year: i32, before_loss: i64, usage: Vec<LossUsage>) -> CitResult {
        let period: Period = year.to_string().parse().unwrap();
        let span = period.span(1).unwrap();
        let before = Money::from_units(before_loss);
        let applied: Money = usage.iter().map(|u| u.amount).sum();
        let taxable = (before - applied).clamp_non_negative();
        let rate = Rate::from_percent(dec!(20));
        CitResult {
            farm_id: FARM.to_string(),
            period,
            period_type: PeriodType::Annual,
            period_start: span.start,
            period_end: span.end,
            total_revenue: Money::from_units(100_000_000),
            total_expenses: Money::from_units(100_000_000) - before,
            accounting_profit: before,
            adjustments: vec![CitAdjustmentItem {
                adjustment_type: AdjustmentType::AddBack,
                category: "PENALTY".to_string(),
                rule_code: "CIT_ADD_BACK_PENALTY".to_string(),
                amount: Money::ZERO,
                source_transaction_id: Some("t1".to_string()),
                description: "administrative penalty".to_string(),
            }],
            total_add_backs: Money::ZERO,
            total_deductions: Money::ZERO,
            taxable_income_before_loss: before,
            loss_applied: applied,
            loss_usage: usage,
            taxable_income: taxable,
            tax_rate: rate,
            cit_amount: taxable.apply_rate(rate).round_currency(),
            loss_carried: if before.is_negative() { -before } else { Money::ZERO },
            warnings: vec![],
        }
    }

    #[tokio::test]
    async fn test_save_twice_keeps_one_item_set() {
        let db = db_with_farm().await;
        let repo = db.cit_results();
        let result = annual(2024, 40_000_000, vec![]);

        repo.save(&result).await.unwrap();
        repo.save(&result).await.unwrap();

        let period: Period = "2024".parse().unwrap();
        assert_eq!(repo.adjustment_count(FARM, period).await.unwrap(), 1);
        assert_eq!(repo.get(FARM, period).await.unwrap().unwrap(), result);
    }

    #[tokio::test]
    async fn test_loss_ledger_is_idempotent() {
        let db = db_with_farm().await;
        let repo = db.cit_results();

        repo.save(&annual(2023, -10_000_000, vec![])).await.unwrap();
        let open = repo.loss_balances(FARM, 2024).await.unwrap();
        assert_eq!(
            open,
            vec![LossBalance {
                loss_year: 2023,
                remaining: Money::from_units(10_000_000)
            }]
        );

        let usage = vec![LossUsage {
            loss_year: 2023,
            amount: Money::from_units(4_000_000),
        }];
        repo.save(&annual(2024, 4_000_000, usage.clone())).await.unwrap();
        repo.save(&annual(2024, 4_000_000, usage)).await.unwrap();

        // 2024 itself still sees the full balance; 2025 sees what is left
        assert_eq!(repo.loss_balances(FARM, 2024).await.unwrap()[0].remaining, Money::from_units(10_000_000));
        assert_eq!(repo.loss_balances(FARM, 2025).await.unwrap()[0].remaining, Money::from_units(6_000_000));

        // A profitable recalculation of 2023 removes its loss
        repo.save(&annual(2023, 1_000_000, vec![])).await.unwrap();
        assert!(repo.loss_balances(FARM, 2025).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usage_of_unknown_loss_rolls_back() {
        let db = db_with_farm().await;
        let repo = db.cit_results();
        let bogus = annual(
            2024,
            5_000_000,
            vec![LossUsage {
                loss_year: 2019,
                amount: Money::from_units(1),
            }],
        );

        assert!(matches!(repo.save(&bogus).await.unwrap_err(), DbError::NotFound { .. }));
        assert!(repo.get(FARM, "2024".parse().unwrap()).await.unwrap().is_none());
    }
}
