//! # PIT Service
//!
//! Monthly personal income tax, one employee at a time or for the whole
//! payroll of a month.
//!
//! ## Batch Fan-Out
//! ```text
//! batch(farm, 2025-03)
//!   │
//!   ├── declaration FILED? ──► PeriodLocked
//!   ├── snapshot at 2025-03-31 (shared by every employee)
//!   ├── payroll entries ──► buffer_unordered(batch_concurrency)
//!   │        │
//!   │        ├── Ok(result)  ──► saved, counted
//!   │        └── Err(e)      ──► PitBatchError { employee, code, message }
//!   ├── PitBatchSummary::collect (results ordered by employee)
//!   └── declaration ──► CALCULATED
//! ```
//!
//! One employee's failure never aborts the batch.

use agritax_core::pit::{calculate_pit, PitBatchError, PitBatchSummary, PitInput, PitResult};
use agritax_core::rules::RuleSnapshot;
use agritax_core::{CoreError, DeclarationKind, PayrollEntry, Period, PeriodType};
use agritax_db::Database;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::engine::RuleEngine;
use crate::error::EngineResult;

#[derive(Debug, Clone)]
pub struct PitService {
    db: Database,
    rules: RuleEngine,
    batch_concurrency: usize,
}

impl PitService {
    pub fn new(db: Database, batch_concurrency: usize) -> Self {
        PitService {
            rules: RuleEngine::new(db.clone()),
            db,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Calculates and stores PIT for one employee, replacing any earlier
    /// result for the same month, and marks the month's declaration
    /// CALCULATED.
    pub async fn calculate(&self, farm_id: &str, input: &PitInput) -> EngineResult<PitResult> {
        input.period.expect_type(PeriodType::Monthly)?;
        let snapshot = self.month_snapshot(farm_id, input.period).await?;
        self.db
            .declarations()
            .ensure_unlocked(farm_id, DeclarationKind::Pit, input.period)
            .await?;

        let result = self.compute(&snapshot, input).await?;
        self.db.pit_results().save(&result).await?;
        self.db
            .declarations()
            .mark_calculated(farm_id, DeclarationKind::Pit, input.period)
            .await?;

        info!(
            farm_id,
            employee_id = %result.employee_id,
            period = %result.period,
            method = %result.tax_method,
            pit = %result.pit_amount,
            "PIT calculated"
        );
        Ok(result)
    }

    /// Calculates PIT for every payroll entry of the month and marks the
    /// PIT declaration CALCULATED.
    pub async fn batch(&self, farm_id: &str, period: Period) -> EngineResult<PitBatchSummary> {
        period.expect_type(PeriodType::Monthly)?;
        let snapshot = self.month_snapshot(farm_id, period).await?;
        self.db
            .declarations()
            .ensure_unlocked(farm_id, DeclarationKind::Pit, period)
            .await?;

        let payroll = self.db.employees().payroll_for(farm_id, period).await?;
        debug!(farm_id, %period, entries = payroll.len(), "Starting PIT batch");

        let snapshot = &snapshot;
        let outcomes: Vec<_> = stream::iter(payroll.iter().map(input_from_payroll))
            .map(|input| async move {
                let outcome = self.compute(snapshot, &input).await;
                (input.employee_id, outcome)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for (employee_id, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(farm_id, employee_id = %employee_id, error = %e, "PIT calculation failed");
                    errors.push(PitBatchError {
                        employee_id,
                        error_code: e.error_code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        results.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
        errors.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));

        for result in &results {
            self.db.pit_results().save(result).await?;
        }

        let summary = PitBatchSummary::collect(farm_id, period, results, errors);
        self.db
            .declarations()
            .mark_calculated(farm_id, DeclarationKind::Pit, period)
            .await?;

        info!(
            farm_id,
            %period,
            employees = summary.total_employees,
            failed = summary.errors.len(),
            total_pit = %summary.total_pit,
            "PIT batch calculated"
        );
        Ok(summary)
    }

    async fn month_snapshot(&self, farm_id: &str, period: Period) -> EngineResult<RuleSnapshot> {
        let farm = self.db.farms().require(farm_id).await?;
        let span = period.span(farm.fiscal_year_start_month)?;
        self.rules.snapshot(farm_id, span.end).await
    }

    async fn compute(&self, snapshot: &RuleSnapshot, input: &PitInput) -> EngineResult<PitResult> {
        let employee = self
            .db
            .employees()
            .get(snapshot.farm_id(), &input.employee_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Employee", &input.employee_id))?;
        Ok(calculate_pit(&employee, input, snapshot)?)
    }
}

fn input_from_payroll(entry: &PayrollEntry) -> PitInput {
    PitInput {
        employee_id: entry.employee_id.clone(),
        period: entry.period,
        gross_income: entry.gross_income,
        dependents_count: entry.dependents_count,
        other_deduction: entry.other_deduction,
        insurance_deduction: entry.insurance_deduction,
    }
}
