//! # Farm Repository
//!
//! Farms are the tenant boundary. Everything else references a farm.

use agritax_core::validation::{validate_month, validate_required};
use agritax_core::{CoreError, Farm};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::codec::decode_count;
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct FarmRow {
    id: String,
    name: String,
    fiscal_year_start_month: i64,
}

impl TryFrom<FarmRow> for Farm {
    type Error = DbError;

    fn try_from(row: FarmRow) -> DbResult<Self> {
        Ok(Farm {
            id: row.id,
            name: row.name,
            fiscal_year_start_month: decode_count(
                "farms.fiscal_year_start_month",
                row.fiscal_year_start_month,
            )?,
        })
    }
}

/// Repository for farm records.
#[derive(Debug, Clone)]
pub struct FarmRepository {
    pool: SqlitePool,
}

impl FarmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FarmRepository { pool }
    }

    /// Inserts a farm.
    ///
    /// ## Errors
    /// - `Domain` for an empty id/name or a month outside 1..=12
    /// - `UniqueViolation` if the id is taken
    pub async fn insert(&self, farm: &Farm) -> DbResult<()> {
        validate_required("farm.id", &farm.id).map_err(CoreError::from)?;
        validate_required("farm.name", &farm.name).map_err(CoreError::from)?;
        validate_month(farm.fiscal_year_start_month).map_err(CoreError::from)?;

        debug!(farm_id = %farm.id, "Inserting farm");

        sqlx::query(
            "INSERT INTO farms (id, name, fiscal_year_start_month, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&farm.id)
        .bind(&farm.name)
        .bind(i64::from(farm.fiscal_year_start_month))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, farm_id: &str) -> DbResult<Option<Farm>> {
        let row: Option<FarmRow> =
            sqlx::query_as("SELECT id, name, fiscal_year_start_month FROM farms WHERE id = ?1")
                .bind(farm_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Farm::try_from).transpose()
    }

    /// Like [`get`](Self::get), but a missing farm is an error.
    pub async fn require(&self, farm_id: &str) -> DbResult<Farm> {
        self.get(farm_id)
            .await?
            .ok_or_else(|| DbError::not_found("Farm", farm_id))
    }

    /// Catalog version last applied to the farm, if it was ever synced.
    pub async fn catalog_version(&self, farm_id: &str) -> DbResult<Option<String>> {
        let version: Option<Option<String>> =
            sqlx::query_scalar("SELECT catalog_version FROM farms WHERE id = ?1")
                .bind(farm_id)
                .fetch_optional(&self.pool)
                .await?;

        version.ok_or_else(|| DbError::not_found("Farm", farm_id))
    }
}
