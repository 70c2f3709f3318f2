//! # Database Migrations
//!
//! SQL files under `migrations/sqlite/`, embedded at compile time.
//!
//! ```text
//! 001_initial_schema.sql   farms, tax_rules, rule_history (append-only)
//! 002_books.sql            employees, payroll, ledger, suppliers, invoices
//! 003_tax_results.sql      pit/cit results, losses, loss usage, declarations
//! ```
//!
//! Applied files are tracked in `_sqlx_migrations`; never edit one that has
//! shipped, add the next `NNN_description.sql` instead.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations in filename order, one transaction each.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((MIGRATOR.migrations.len(), usize::try_from(applied).unwrap_or_default()))
}
