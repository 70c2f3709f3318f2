//! # Ledger Repository
//!
//! Posted accounting transactions with their line items, as read by the
//! CIT calculator.
//!
//! ```text
//! ledger_transactions (header: kind, payment attributes)
//!        │ 1
//!        │
//!        ▼ n
//! ledger_lines (line_no ordered, ON DELETE CASCADE)
//! ```

use agritax_core::validation::{validate_non_negative, validate_required};
use agritax_core::{
    CoreError, DateSpan, LedgerCategory, LedgerTransaction, PaymentMethod, TransactionKind,
    TransactionLine,
};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::codec::{decode_money, decode_opt_money, encode_money, encode_opt_money};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    farm_id: String,
    txn_date: NaiveDate,
    kind: TransactionKind,
    category: LedgerCategory,
    amount: String,
    payment_method: PaymentMethod,
    has_bank_transfer_evidence: bool,
    pit_withheld: bool,
    asset_category: Option<String>,
    asset_cost: Option<String>,
    description: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: String,
    transaction_id: String,
    category: LedgerCategory,
    amount: String,
    asset_category: Option<String>,
    asset_cost: Option<String>,
    description: Option<String>,
}

impl TryFrom<LineRow> for TransactionLine {
    type Error = DbError;

    fn try_from(row: LineRow) -> DbResult<Self> {
        Ok(TransactionLine {
            amount: decode_money("ledger_lines.amount", &row.amount)?,
            asset_cost: decode_opt_money("ledger_lines.asset_cost", row.asset_cost.as_deref())?,
            id: row.id,
            transaction_id: row.transaction_id,
            category: row.category,
            asset_category: row.asset_category,
            description: row.description,
        })
    }
}

impl TransactionRow {
    fn into_transaction(self, lines: Vec<TransactionLine>) -> DbResult<LedgerTransaction> {
        Ok(LedgerTransaction {
            amount: decode_money("ledger_transactions.amount", &self.amount)?,
            asset_cost: decode_opt_money("ledger_transactions.asset_cost", self.asset_cost.as_deref())?,
            id: self.id,
            farm_id: self.farm_id,
            txn_date: self.txn_date,
            kind: self.kind,
            category: self.category,
            payment_method: self.payment_method,
            has_bank_transfer_evidence: self.has_bank_transfer_evidence,
            pit_withheld: self.pit_withheld,
            asset_category: self.asset_category,
            description: self.description,
            lines,
        })
    }
}

/// Repository for ledger transactions.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Inserts a transaction and its lines atomically.
    pub async fn insert(&self, txn: &LedgerTransaction) -> DbResult<()> {
        validate_required("transaction.id", &txn.id).map_err(CoreError::from)?;
        validate_non_negative("amount", txn.amount).map_err(CoreError::from)?;
        for line in &txn.lines {
            validate_non_negative("line.amount", line.amount).map_err(CoreError::from)?;
        }

        debug!(farm_id = %txn.farm_id, txn_id = %txn.id, lines = txn.lines.len(), "Inserting ledger transaction");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO ledger_transactions (id, farm_id, txn_date, kind, category, amount, \
                 payment_method, has_bank_transfer_evidence, pit_withheld, asset_category, \
                 asset_cost, description) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&txn.id)
        .bind(&txn.farm_id)
        .bind(txn.txn_date)
        .bind(txn.kind)
        .bind(txn.category)
        .bind(encode_money(txn.amount))
        .bind(txn.payment_method)
        .bind(txn.has_bank_transfer_evidence)
        .bind(txn.pit_withheld)
        .bind(&txn.asset_category)
        .bind(encode_opt_money(txn.asset_cost))
        .bind(&txn.description)
        .execute(&mut *tx)
        .await?;

        for (line_no, line) in txn.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO ledger_lines (id, transaction_id, line_no, category, amount, \
                     asset_category, asset_cost, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&line.id)
            .bind(&txn.id)
            .bind(line_no as i64)
            .bind(line.category)
            .bind(encode_money(line.amount))
            .bind(&line.asset_category)
            .bind(encode_opt_money(line.asset_cost))
            .bind(&line.description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// All transactions of a farm dated within the span, with lines,
    /// ordered by date then id.
    pub async fn list_in_span(&self, farm_id: &str, span: DateSpan) -> DbResult<Vec<LedgerTransaction>> {
        let headers: Vec<TransactionRow> = sqlx::query_as(
            "SELECT id, farm_id, txn_date, kind, category, amount, payment_method, \
                    has_bank_transfer_evidence, pit_withheld, asset_category, asset_cost, description \
             FROM ledger_transactions \
             WHERE farm_id = ?1 AND txn_date BETWEEN ?2 AND ?3 \
             ORDER BY txn_date, id",
        )
        .bind(farm_id)
        .bind(span.start)
        .bind(span.end)
        .fetch_all(&self.pool)
        .await?;

        let line_rows: Vec<LineRow> = sqlx::query_as(
            "SELECT l.id, l.transaction_id, l.category, l.amount, l.asset_category, \
                    l.asset_cost, l.description \
             FROM ledger_lines l \
             JOIN ledger_transactions t ON t.id = l.transaction_id \
             WHERE t.farm_id = ?1 AND t.txn_date BETWEEN ?2 AND ?3 \
             ORDER BY l.transaction_id, l.line_no",
        )
        .bind(farm_id)
        .bind(span.start)
        .bind(span.end)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<String, Vec<TransactionLine>> = HashMap::new();
        for row in line_rows {
            let line = TransactionLine::try_from(row)?;
            lines.entry(line.transaction_id.clone()).or_default().push(line);
        }

        debug!(farm_id, start = %span.start, end = %span.end, count = headers.len(), "Loaded ledger");

        headers
            .into_iter()
            .map(|h| {
                let own = lines.remove(&h.id).unwrap_or_default();
                h.into_transaction(own)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db_with_farm, FARM};
    use agritax_core::{Money, Period};

    fn txn(id: &str, date: NaiveDate, lines: Vec<TransactionLine>) -> LedgerTransaction {
        LedgerTransaction {
            id: id.to_string(),
            farm_id: FARM.to_string(),
            txn_date: date,
            kind: TransactionKind::Expense,
            category: LedgerCategory::Materials,
            amount: Money::from_units(3_000_000),
            payment_method: PaymentMethod::Cash,
            has_bank_transfer_evidence: false,
            pit_withheld: false,
            asset_category: None,
            asset_cost: None,
            description: Some("fertilizer".to_string()),
            lines,
        }
    }

    fn line(id: &str, txn_id: &str, category: LedgerCategory, units: i64) -> TransactionLine {
        TransactionLine {
            id: id.to_string(),
            transaction_id: txn_id.to_string(),
            category,
            amount: Money::from_units(units),
            asset_category: None,
            asset_cost: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_span_filter_and_lines() {
        let db = db_with_farm().await;
        let ledger = db.ledger();
        let d = |m, day| NaiveDate::from_ymd_opt(2025, m, day).unwrap();

        ledger
            .insert(&txn(
                "t1",
                d(2, 10),
                vec![
                    line("l1", "t1", LedgerCategory::Materials, 2_000_000),
                    line("l2", "t1", LedgerCategory::Entertainment, 1_000_000),
                ],
            ))
            .await
            .unwrap();
        ledger.insert(&txn("t2", d(1, 5), vec![])).await.unwrap();
        ledger.insert(&txn("t3", d(4, 1), vec![])).await.unwrap();

        let q1 = "2025-Q1".parse::<Period>().unwrap().span(1).unwrap();
        let loaded = ledger.list_in_span(FARM, q1).await.unwrap();

        assert_eq!(loaded.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["t2", "t1"]);
        assert!(loaded[0].lines.is_empty());
        assert_eq!(loaded[1].lines.len(), 2);
        assert_eq!(loaded[1].lines[1].category, LedgerCategory::Entertainment);
    }

    #[tokio::test]
    async fn test_rejects_negative_amount() {
        let db = db_with_farm().await;
        let mut bad = txn("t1", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), vec![]);
        bad.amount = Money::from_units(-1);
        assert!(db.ledger().insert(&bad).await.is_err());
    }
}
