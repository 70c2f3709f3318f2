//! # Supplier Repository
//!
//! Suppliers and their dated registration status.
//!
//! ```text
//!   effective_from:  2024-01-01   2025-03-15        2025-06-01
//!   status:          ACTIVE ───── SUSPENDED ─────── ACTIVE ─────►
//!
//!   status_on(2025-04-30) = SUSPENDED
//!   status_on(2023-12-31) = ACTIVE (no change recorded yet)
//! ```

use agritax_core::validation::validate_required;
use agritax_core::{CoreError, Supplier, SupplierStatus};
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

/// Repository for suppliers and supplier status history.
#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn insert(&self, supplier: &Supplier) -> DbResult<()> {
        validate_required("supplier.id", &supplier.id).map_err(CoreError::from)?;
        validate_required("supplier.name", &supplier.name).map_err(CoreError::from)?;

        sqlx::query("INSERT INTO suppliers (id, farm_id, name, tax_code) VALUES (?1, ?2, ?3, ?4)")
            .bind(&supplier.id)
            .bind(&supplier.farm_id)
            .bind(&supplier.name)
            .bind(supplier.tax_code.as_deref().map(str::trim))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a status change effective from a date.
    pub async fn record_status(
        &self,
        supplier_id: &str,
        status: SupplierStatus,
        effective_from: NaiveDate,
    ) -> DbResult<()> {
        debug!(supplier_id, %status, %effective_from, "Recording supplier status");

        sqlx::query(
            "INSERT INTO supplier_status_history (id, supplier_id, status, effective_from, changed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(supplier_id)
        .bind(status)
        .bind(effective_from)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Status of the farm's supplier with this tax code on `date`.
    ///
    /// The latest change effective on or before the date wins; a supplier
    /// with no recorded change (or no supplier record) is ACTIVE.
    pub async fn status_on(&self, farm_id: &str, tax_code: &str, date: NaiveDate) -> DbResult<SupplierStatus> {
        let status: Option<SupplierStatus> = sqlx::query_scalar(
            "SELECT h.status FROM supplier_status_history h \
             JOIN suppliers s ON s.id = h.supplier_id \
             WHERE s.farm_id = ?1 AND s.tax_code = ?2 AND h.effective_from <= ?3 \
             ORDER BY h.effective_from DESC, h.changed_at DESC, h.rowid DESC \
             LIMIT 1",
        )
        .bind(farm_id)
        .bind(tax_code.trim())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db_with_farm, FARM};

    #[tokio::test]
    async fn test_status_as_of_date() {
        let db = db_with_farm().await;
        let suppliers = db.suppliers();
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();

        suppliers
            .insert(&Supplier {
                id: "s1".into(),
                farm_id: FARM.into(),
                name: "Agro Inputs Co".into(),
                tax_code: Some("0101234567".into()),
            })
            .await
            .unwrap();
        suppliers.record_status("s1", SupplierStatus::Active, d(2024, 1, 1)).await.unwrap();
        suppliers.record_status("s1", SupplierStatus::Closed, d(2025, 3, 15)).await.unwrap();

        let at = |date: NaiveDate| suppliers.status_on(FARM, "0101234567", date);
        assert_eq!(at(d(2023, 12, 31)).await.unwrap(), SupplierStatus::Active);
        assert_eq!(at(d(2025, 3, 14)).await.unwrap(), SupplierStatus::Active);
        assert_eq!(at(d(2025, 3, 15)).await.unwrap(), SupplierStatus::Closed);

        // Unknown supplier, or another farm's lookup
        assert_eq!(
            suppliers.status_on(FARM, "0109999999", d(2025, 5, 1)).await.unwrap(),
            SupplierStatus::Active
        );
        assert_eq!(
            suppliers.status_on("farm-2", "0101234567", d(2025, 5, 1)).await.unwrap(),
            SupplierStatus::Active
        );
    }
}
