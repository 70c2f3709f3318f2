//! # PIT Calculator
//!
//! Personal income tax on a monthly gross figure from payroll.
//!
//! ## Method Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   residency = NON_RESIDENT ───────────────► FLAT_20  gross × flat rate │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   contract_type = FLAT_RATE ──────────────► FLAT_10  gross × flat rate │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   taxable = max(0, gross − personal − dependents × dependent           │
//! │                      − insurance − other)                               │
//! │          │                                                              │
//! │          ├── taxable = 0 ─────────────────► EXEMPT   pit = 0           │
//! │          │                                                              │
//! │          └── taxable > 0 ─────────────────► PROGRESSIVE                │
//! │                                             Σ rate × width(bracket)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every constant comes from the rule snapshot, so overrides and
//! date-effective successors apply without code changes.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::period::{Period, PeriodType};
use crate::rules::keys::{
    PIT_DEPENDENT, PIT_FLAT_NON_RESIDENT, PIT_FLAT_RESIDENT, PIT_INSURANCE_RATE, PIT_PERSONAL,
};
use crate::rules::RuleSnapshot;
use crate::types::{ContractType, Employee, Residency};
use crate::validation::validate_non_negative;

/// Statutory flat rate for non-residents when no rule is configured.
pub const FALLBACK_NON_RESIDENT_PERCENT: Decimal = dec!(20);

/// Statutory flat rate for contract earners when no rule is configured.
pub const FALLBACK_FLAT_RESIDENT_PERCENT: Decimal = dec!(10);

// =============================================================================
// Tax Method
// =============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum TaxMethod {
    #[serde(rename = "PROGRESSIVE")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "PROGRESSIVE"))]
    Progressive,
    #[serde(rename = "FLAT_10")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "FLAT_10"))]
    Flat10,
    #[serde(rename = "FLAT_20")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "FLAT_20"))]
    Flat20,
    #[serde(rename = "EXEMPT")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "EXEMPT"))]
    Exempt,
}

impl TaxMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaxMethod::Progressive => "PROGRESSIVE",
            TaxMethod::Flat10 => "FLAT_10",
            TaxMethod::Flat20 => "FLAT_20",
            TaxMethod::Exempt => "EXEMPT",
        }
    }
}

impl std::fmt::Display for TaxMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Brackets
// =============================================================================

/// One progressive bracket: income above `lower_bound` is taxed at `rate`
/// up to the next bracket's lower bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub lower_bound: Money,
    pub rate: Rate,
    pub rule_code: String,
}

/// An ordered bracket table, ascending by lower bound, starting at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketTable {
    brackets: Vec<Bracket>,
}

/// What one bracket contributed to the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BracketContribution {
    pub rule_code: String,
    pub lower_bound: Money,
    /// `None` for the open-ended top bracket.
    pub upper_bound: Option<Money>,
    pub rate: Rate,
    /// Portion of taxable income falling in this bracket.
    pub taxable_amount: Money,
    pub tax: Money,
}

impl BracketTable {
    /// Validates and wraps an ordered bracket list.
    pub fn new(mut brackets: Vec<Bracket>) -> Result<Self, String> {
        brackets.sort_by(|a, b| a.lower_bound.cmp(&b.lower_bound));

        let first = brackets.first().ok_or("no progressive brackets configured")?;
        if !first.lower_bound.is_zero() {
            return Err(format!(
                "lowest bracket starts at {} instead of 0",
                first.lower_bound
            ));
        }
        if brackets
            .windows(2)
            .any(|w| w[0].lower_bound == w[1].lower_bound)
        {
            return Err("two brackets share a lower bound".to_string());
        }

        Ok(BracketTable { brackets })
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    /// Sum of marginal contributions, at full precision.
    ///
    /// ## Example
    /// ```text
    /// brackets: 0 @5%, 5M @10%, 10M @15%      taxable: 12M
    ///
    ///   5% × (5M  − 0)   =   250,000
    ///  10% × (10M − 5M)  =   500,000
    ///  15% × (12M − 10M) =   300,000
    ///                      ─────────
    ///                      1,050,000
    /// ```
    pub fn apply(&self, taxable: Money) -> (Money, Vec<BracketContribution>) {
        let mut total = Money::ZERO;
        let mut contributions = Vec::new();

        for (i, bracket) in self.brackets.iter().enumerate() {
            if taxable <= bracket.lower_bound {
                break;
            }
            let upper = self.brackets.get(i + 1).map(|next| next.lower_bound);
            let top = match upper {
                Some(u) => taxable.min(u),
                None => taxable,
            };
            let width = top - bracket.lower_bound;
            let tax = width.apply_rate(bracket.rate);
            total += tax;

            contributions.push(BracketContribution {
                rule_code: bracket.rule_code.clone(),
                lower_bound: bracket.lower_bound,
                upper_bound: upper,
                rate: bracket.rate,
                taxable_amount: width,
                tax,
            });
        }

        (total, contributions)
    }
}

// =============================================================================
// Input / Output
// =============================================================================

/// One employee's figures for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitInput {
    pub employee_id: String,
    pub period: Period,
    pub gross_income: Money,
    /// Overrides the employee's stored dependents count.
    #[serde(default)]
    pub dependents_count: Option<u32>,
    #[serde(default)]
    pub other_deduction: Option<Money>,
    /// Overrides the insurance contribution derived from the insurance base.
    #[serde(default)]
    pub insurance_deduction: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PitResult {
    pub farm_id: String,
    pub employee_id: String,
    #[ts(as = "String")]
    pub period: Period,
    pub gross_income: Money,
    pub tax_method: TaxMethod,
    /// Flat rate applied for FLAT_10 / FLAT_20.
    pub flat_rate: Option<Rate>,
    pub personal_deduction: Money,
    pub dependents_count: u32,
    pub dependent_deduction: Money,
    pub insurance_deduction: Money,
    pub other_deduction: Money,
    pub taxable_income: Money,
    pub brackets: Vec<BracketContribution>,
    pub pit_amount: Money,
    /// Fallbacks used because a non-critical rule was missing.
    pub warnings: Vec<String>,
}

// =============================================================================
// Calculator
// =============================================================================

/// Computes PIT for one employee.
///
/// ## Errors
/// - `Validation` for a non-monthly period or negative amounts
/// - `NotFound` if the employee belongs to another farm
/// - `Configuration` if a required deduction or bracket rule is missing
pub fn calculate_pit(
    employee: &Employee,
    input: &PitInput,
    rules: &RuleSnapshot,
) -> CoreResult<PitResult> {
    input.period.expect_type(PeriodType::Monthly)?;
    validate_non_negative("gross_income", input.gross_income)?;
    if let Some(other) = input.other_deduction {
        validate_non_negative("other_deduction", other)?;
    }
    if let Some(insurance) = input.insurance_deduction {
        validate_non_negative("insurance_deduction", insurance)?;
    }
    if employee.id != input.employee_id || employee.farm_id != rules.farm_id() {
        return Err(CoreError::not_found("Employee", &input.employee_id));
    }

    let mut result = PitResult {
        farm_id: rules.farm_id().to_string(),
        employee_id: employee.id.clone(),
        period: input.period,
        gross_income: input.gross_income,
        tax_method: TaxMethod::Progressive,
        flat_rate: None,
        personal_deduction: Money::ZERO,
        dependents_count: 0,
        dependent_deduction: Money::ZERO,
        insurance_deduction: Money::ZERO,
        other_deduction: Money::ZERO,
        taxable_income: Money::ZERO,
        brackets: Vec::new(),
        pit_amount: Money::ZERO,
        warnings: Vec::new(),
    };

    let flat = match (employee.residency, employee.contract_type) {
        (Residency::NonResident, _) => Some((
            TaxMethod::Flat20,
            rules.value_or(PIT_FLAT_NON_RESIDENT, FALLBACK_NON_RESIDENT_PERCENT),
            PIT_FLAT_NON_RESIDENT,
        )),
        (Residency::Resident, ContractType::FlatRate) => Some((
            TaxMethod::Flat10,
            rules.value_or(PIT_FLAT_RESIDENT, FALLBACK_FLAT_RESIDENT_PERCENT),
            PIT_FLAT_RESIDENT,
        )),
        (Residency::Resident, ContractType::Standard) => None,
    };

    if let Some((method, resolved, key)) = flat {
        if resolved.is_fallback() {
            result.warnings.push(format!(
                "rule {} missing; statutory {}% used",
                key,
                resolved.value().normalize()
            ));
        }
        let rate = Rate::from_percent(resolved.value());
        result.tax_method = method;
        result.flat_rate = Some(rate);
        result.taxable_income = input.gross_income;
        result.pit_amount = input.gross_income.apply_rate(rate).round_currency();
        return Ok(result);
    }

    let personal = rules.amount(PIT_PERSONAL)?;
    let per_dependent = rules.amount(PIT_DEPENDENT)?;
    let dependents = input.dependents_count.unwrap_or(employee.dependents_count);
    let dependent_total = per_dependent * dependents;

    let insurance = match (input.insurance_deduction, employee.insurance_base) {
        (Some(given), _) => given,
        (None, Some(base)) if base.is_positive() => base.apply_rate(rules.rate(PIT_INSURANCE_RATE)?),
        _ => Money::ZERO,
    };
    let other = input.other_deduction.unwrap_or(Money::ZERO);

    let taxable = (input.gross_income - personal - dependent_total - insurance - other)
        .clamp_non_negative();

    result.personal_deduction = personal.round_currency();
    result.dependents_count = dependents;
    result.dependent_deduction = dependent_total.round_currency();
    result.insurance_deduction = insurance.round_currency();
    result.other_deduction = other.round_currency();
    result.taxable_income = taxable.round_currency();

    // Decided on the reported figure so a sub-unit remainder is EXEMPT too
    if result.taxable_income.is_zero() {
        result.tax_method = TaxMethod::Exempt;
        return Ok(result);
    }

    let table = rules.brackets()?;
    let (total, contributions) = table.apply(taxable);

    result.brackets = contributions
        .into_iter()
        .map(|c| BracketContribution {
            taxable_amount: c.taxable_amount.round_currency(),
            tax: c.tax.round_currency(),
            ..c
        })
        .collect();
    result.pit_amount = total.round_currency();

    Ok(result)
}

// =============================================================================
// Batch Summary
// =============================================================================

/// A per-employee failure inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PitBatchError {
    pub employee_id: String,
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PitBatchSummary {
    pub farm_id: String,
    #[ts(as = "String")]
    pub period: Period,
    /// Employees attempted (successes + errors).
    pub total_employees: usize,
    pub total_gross: Money,
    pub total_pit: Money,
    pub counts_by_method: BTreeMap<TaxMethod, usize>,
    pub results: Vec<PitResult>,
    pub errors: Vec<PitBatchError>,
}

impl PitBatchSummary {
    /// Folds individual outcomes into a summary. Totals cover successes only.
    pub fn collect(
        farm_id: impl Into<String>,
        period: Period,
        results: Vec<PitResult>,
        errors: Vec<PitBatchError>,
    ) -> Self {
        let mut counts_by_method = BTreeMap::new();
        for r in &results {
            *counts_by_method.entry(r.tax_method).or_insert(0) += 1;
        }

        PitBatchSummary {
            farm_id: farm_id.into(),
            period,
            total_employees: results.len() + errors.len(),
            total_gross: results.iter().map(|r| r.gross_income).sum(),
            total_pit: results.iter().map(|r| r.pit_amount).sum(),
            counts_by_method,
            results,
            errors,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
