//! # Declaration Repository
//!
//! Status of each `(farm, kind, period)` declaration.
//!
//! ```text
//!   (no row) ≡ DRAFT ──mark_calculated──► CALCULATED ──mark_filed──► FILED
//!                                            ▲                         │
//!                                            └──────── unlock ─────────┘
//! ```
//!
//! Transitions are decided by [`Declaration`] in core; this repository only
//! loads, applies and upserts inside one transaction.

use agritax_core::{Declaration, DeclarationKind, DeclarationStatus, Period};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::codec::decode_period;
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct DeclarationRow {
    farm_id: String,
    kind: DeclarationKind,
    period: String,
    status: DeclarationStatus,
    calculated_at: Option<DateTime<Utc>>,
    filed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeclarationRow> for Declaration {
    type Error = DbError;

    fn try_from(row: DeclarationRow) -> DbResult<Self> {
        Ok(Declaration {
            period: decode_period("declarations.period", &row.period)?,
            farm_id: row.farm_id,
            kind: row.kind,
            status: row.status,
            calculated_at: row.calculated_at,
            filed_at: row.filed_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for declaration status.
#[derive(Debug, Clone)]
pub struct DeclarationRepository {
    pool: SqlitePool,
}

impl DeclarationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DeclarationRepository { pool }
    }

    /// Current declaration; a period never touched reads as DRAFT.
    pub async fn get(&self, farm_id: &str, kind: DeclarationKind, period: Period) -> DbResult<Declaration> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, farm_id, kind, period).await
    }

    /// Fails with `PeriodLocked` when the declaration is FILED.
    pub async fn ensure_unlocked(&self, farm_id: &str, kind: DeclarationKind, period: Period) -> DbResult<()> {
        self.get(farm_id, kind, period).await?.ensure_unlocked()?;
        Ok(())
    }

    pub async fn mark_calculated(
        &self,
        farm_id: &str,
        kind: DeclarationKind,
        period: Period,
    ) -> DbResult<Declaration> {
        self.transition(farm_id, kind, period, Declaration::mark_calculated).await
    }

    pub async fn mark_filed(&self, farm_id: &str, kind: DeclarationKind, period: Period) -> DbResult<Declaration> {
        self.transition(farm_id, kind, period, Declaration::mark_filed).await
    }

    pub async fn unlock(&self, farm_id: &str, kind: DeclarationKind, period: Period) -> DbResult<Declaration> {
        self.transition(farm_id, kind, period, Declaration::unlock).await
    }

    async fn transition(
        &self,
        farm_id: &str,
        kind: DeclarationKind,
        period: Period,
        apply: fn(&mut Declaration, DateTime<Utc>) -> agritax_core::CoreResult<()>,
    ) -> DbResult<Declaration> {
        let mut tx = self.pool.begin().await?;

        let mut declaration = load(&mut tx, farm_id, kind, period).await?;
        let from = declaration.status;
        apply(&mut declaration, Utc::now())?;

        sqlx::query(
            "INSERT INTO declarations (farm_id, kind, period, status, calculated_at, filed_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (farm_id, kind, period) DO UPDATE SET \
                 status = excluded.status, \
                 calculated_at = excluded.calculated_at, \
                 filed_at = excluded.filed_at, \
                 updated_at = excluded.updated_at",
        )
        .bind(&declaration.farm_id)
        .bind(declaration.kind)
        .bind(declaration.period.to_string())
        .bind(declaration.status)
        .bind(declaration.calculated_at)
        .bind(declaration.filed_at)
        .bind(declaration.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            farm_id,
            kind = %kind,
            period = %period,
            from = %from,
            to = %declaration.status,
            "Declaration status changed"
        );
        Ok(declaration)
    }
}

async fn load(
    conn: &mut SqliteConnection,
    farm_id: &str,
    kind: DeclarationKind,
    period: Period,
) -> DbResult<Declaration> {
    let row: Option<DeclarationRow> = sqlx::query_as(
        "SELECT farm_id, kind, period, status, calculated_at, filed_at, updated_at \
         FROM declarations WHERE farm_id = ?1 AND kind = ?2 AND period = ?3",
    )
    .bind(farm_id)
    .bind(kind)
    .bind(period.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Declaration::try_from(row),
        None => Ok(Declaration::draft(farm_id, kind, period, Utc::now())),
    }
}
