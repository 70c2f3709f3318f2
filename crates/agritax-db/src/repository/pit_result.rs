//! # PIT Result Repository
//!
//! One stored result per `(farm_id, employee_id, period)`. Saving again
//! replaces the row in place.

use agritax_core::pit::PitResult;
use agritax_core::Period;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{decode_payload, encode_money, encode_payload};
use crate::error::DbResult;

/// Repository for persisted PIT results.
#[derive(Debug, Clone)]
pub struct PitResultRepository {
    pool: SqlitePool,
}

impl PitResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PitResultRepository { pool }
    }

    /// Stores a result, replacing any previous one for the same key.
    pub async fn save(&self, result: &PitResult) -> DbResult<()> {
        let payload = encode_payload(result)?;

        debug!(
            farm_id = %result.farm_id,
            employee_id = %result.employee_id,
            period = %result.period,
            tax_method = %result.tax_method,
            "Saving PIT result"
        );

        sqlx::query(
            "INSERT INTO pit_results (id, farm_id, employee_id, period, tax_method, gross_income, \
                 taxable_income, pit_amount, payload, calculated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT (farm_id, employee_id, period) DO UPDATE SET \
                 tax_method = excluded.tax_method, \
                 gross_income = excluded.gross_income, \
                 taxable_income = excluded.taxable_income, \
                 pit_amount = excluded.pit_amount, \
                 payload = excluded.payload, \
                 calculated_at = excluded.calculated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&result.farm_id)
        .bind(&result.employee_id)
        .bind(result.period.to_string())
        .bind(result.tax_method)
        .bind(encode_money(result.gross_income))
        .bind(encode_money(result.taxable_income))
        .bind(encode_money(result.pit_amount))
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, farm_id: &str, employee_id: &str, period: Period) -> DbResult<Option<PitResult>> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM pit_results WHERE farm_id = ?1 AND employee_id = ?2 AND period = ?3",
        )
        .bind(farm_id)
        .bind(employee_id)
        .bind(period.to_string())
        .fetch_optional(&self.pool)
        .await?;

        payload
            .map(|p| decode_payload("pit_results.payload", &p))
            .transpose()
    }

    /// All stored results of a month, in employee order.
    pub async fn list_for_period(&self, farm_id: &str, period: Period) -> DbResult<Vec<PitResult>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            "SELECT payload FROM pit_results WHERE farm_id = ?1 AND period = ?2 ORDER BY employee_id",
        )
        .bind(farm_id)
        .bind(period.to_string())
        .fetch_all(&self.pool)
        .await?;

        payloads
            .iter()
            .map(|p| decode_payload("pit_results.payload", p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db_with_farm, FARM};
    use agritax_core::pit::TaxMethod;
    use agritax_core::{ContractType, Employee, Money, Rate, Residency};
    use rust_decimal_macros::dec;

    fn flat(gross: i64) -> PitResult {
        let gross = Money::from_units(gross);
        let rate = Rate::from_percent(dec!(20));
        PitResult {
            farm_id: FARM.to_string(),
            employee_id: "e1".to_string(),
            period: "2025-03".parse().unwrap(),
            gross_income: gross,
            tax_method: TaxMethod::Flat20,
            flat_rate: Some(rate),
            personal_deduction: Money::ZERO,
            dependents_count: 0,
            dependent_deduction: Money::ZERO,
            insurance_deduction: Money::ZERO,
            other_deduction: Money::ZERO,
            taxable_income: gross,
            brackets: vec![],
            pit_amount: gross.apply_rate(rate).round_currency(),
            warnings: vec![],
        }
    }

    #[tokio::test]
    async fn test_save_replaces_previous_result() {
        let db = db_with_farm().await;
        db.employees()
            .insert(&Employee {
                id: "e1".into(),
                farm_id: FARM.into(),
                full_name: "Expat agronomist".into(),
                tax_code: None,
                residency: Residency::NonResident,
                contract_type: ContractType::Standard,
                dependents_count: 0,
                insurance_base: None,
                is_active: true,
            })
            .await
            .unwrap();

        let repo = db.pit_results();
        repo.save(&flat(10_000_000)).await.unwrap();
        repo.save(&flat(12_000_000)).await.unwrap();

        let period: Period = "2025-03".parse().unwrap();
        let all = repo.list_for_period(FARM, period).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].pit_amount, Money::from_units(2_400_000));

        let one = repo.get(FARM, "e1", period).await.unwrap().unwrap();
        assert_eq!(one, all[0]);
        assert!(repo.get(FARM, "e1", "2025-04".parse().unwrap()).await.unwrap().is_none());
    }
}
