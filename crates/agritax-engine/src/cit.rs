//! # CIT Service
//!
//! Quarterly provisional and annual corporate income tax from the farm's
//! ledger.
//!
//! ## Flow
//! ```text
//! calculate(farm, 2025)
//!   │
//!   ├── declaration FILED? ──► PeriodLocked
//!   ├── fiscal span from the farm's start month
//!   ├── ledger in span ─┐
//!   ├── loss balances ──┼──► calculate_cit(snapshot at span end)
//!   │   (years < 2025)  │
//!   ├── save: replaces result, items and this period's loss rows
//!   └── declaration ──► CALCULATED
//! ```
//!
//! Quarterly periods apply prior losses provisionally; only annual periods
//! write to the loss ledger.

use agritax_core::cit::{calculate_cit, CitInput, CitResult};
use agritax_core::{DeclarationKind, Period, PeriodType, ValidationError};
use agritax_db::Database;
use tracing::{info, warn};

use crate::engine::RuleEngine;
use crate::error::EngineResult;

#[derive(Debug, Clone)]
pub struct CitService {
    db: Database,
    rules: RuleEngine,
}

impl CitService {
    pub fn new(db: Database) -> Self {
        CitService {
            rules: RuleEngine::new(db.clone()),
            db,
        }
    }

    /// Calculates and stores CIT for a quarter or fiscal year.
    ///
    /// Recalculating a period replaces the earlier result entirely.
    pub async fn calculate(&self, farm_id: &str, period: Period) -> EngineResult<CitResult> {
        if period.period_type() == PeriodType::Monthly {
            return Err(ValidationError::InvalidFormat {
                field: "period".to_string(),
                reason: "CIT is declared quarterly (YYYY-Qn) or annually (YYYY)".to_string(),
            }
            .into());
        }

        let farm = self.db.farms().require(farm_id).await?;
        self.db
            .declarations()
            .ensure_unlocked(farm_id, DeclarationKind::Cit, period)
            .await?;

        let span = period.span(farm.fiscal_year_start_month)?;
        let fiscal_year = period.fiscal_year(farm.fiscal_year_start_month);
        let transactions = self.db.ledger().list_in_span(farm_id, span).await?;
        let losses = self.db.cit_results().loss_balances(farm_id, fiscal_year).await?;
        let snapshot = self.rules.snapshot(farm_id, span.end).await?;

        let result = calculate_cit(
            &CitInput {
                period,
                fiscal_year,
                span,
                transactions: &transactions,
                losses: &losses,
            },
            &snapshot,
        )?;

        for warning in &result.warnings {
            warn!(farm_id, %period, "{}", warning);
        }

        self.db.cit_results().save(&result).await?;
        self.db
            .declarations()
            .mark_calculated(farm_id, DeclarationKind::Cit, period)
            .await?;

        info!(
            farm_id,
            %period,
            transactions = transactions.len(),
            adjustments = result.adjustments.len(),
            taxable = %result.taxable_income,
            cit = %result.cit_amount,
            loss_applied = %result.loss_applied,
            loss_carried = %result.loss_carried,
            "CIT calculated"
        );
        Ok(result)
    }
}
