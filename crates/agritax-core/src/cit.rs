//! # CIT Calculator
//!
//! Corporate income tax for a quarter or a fiscal year.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  transactions in span (date order)                                     │
//! │        │                                                                │
//! │        ├──► total_revenue / total_expenses ──► accounting_profit       │
//! │        │                                                                │
//! │        └──► adjustment scan (per item) ──► add-backs / deductions      │
//! │                                                                         │
//! │  before_loss = profit + Σ add-backs − Σ deductions                     │
//! │        │                                                                │
//! │        ├── > 0 ──► offset by prior losses (FIFO, within window)        │
//! │        │           cit = taxable × tax_rate                             │
//! │        │                                                                │
//! │        └── < 0 ──► cit = 0, loss_carried = −before_loss                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adjustment Rules
//! An adjustment is produced only when its rule exists for the farm. Each
//! item can be disallowed at most up to its own amount, however many rules
//! hit it.
//!
//! | Category             | Trigger                                        |
//! |----------------------|------------------------------------------------|
//! | PENALTY              | ADMIN_PENALTY expense × rule %                 |
//! | CASH_PAYMENT         | unevidenced cash transaction ≥ threshold       |
//! | ENTERTAINMENT        | running period total above cap (excess only)   |
//! | WELFARE              | running period total above cap (excess only)   |
//! | DEPRECIATION:<ASSET> | above asset_cost × rule % × months / 12        |
//! | CASUAL_LABOR_NO_PIT  | CASUAL_WAGES without PIT withheld × rule %     |
//! | EXEMPT_INCOME        | EXEMPT_INCOME revenue × rule % (deduction)     |

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::{Money, Rate};
use crate::period::{DateSpan, Period, PeriodType};
use crate::rules::keys::{
    depreciation_category, RuleQuery, CIT_CASH_PAYMENT, CIT_CASUAL_LABOR_NO_PIT,
    CIT_ENTERTAINMENT, CIT_EXEMPT_INCOME, CIT_LOSS_CARRY_YEARS, CIT_PENALTY, CIT_TAX_RATE,
    CIT_WELFARE,
};
use crate::rules::RuleSnapshot;
use crate::types::{LedgerCategory, LedgerItem, LedgerTransaction, RuleType, TransactionKind};

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum AdjustmentType {
    AddBack,
    Deduction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CitAdjustmentItem {
    pub adjustment_type: AdjustmentType,
    /// Rule category that produced the item (e.g. `PENALTY`).
    pub category: String,
    pub rule_code: String,
    pub amount: Money,
    pub source_transaction_id: Option<String>,
    pub description: String,
}

/// Unused loss from a prior fiscal year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LossBalance {
    pub loss_year: i32,
    pub remaining: Money,
}

/// How much of one prior loss this period consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LossUsage {
    pub loss_year: i32,
    pub amount: Money,
}

/// Everything a CIT calculation reads besides the rule snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CitInput<'a> {
    pub period: Period,
    /// Fiscal year the period belongs to; losses from earlier years apply.
    pub fiscal_year: i32,
    pub span: DateSpan,
    pub transactions: &'a [LedgerTransaction],
    pub losses: &'a [LossBalance],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CitResult {
    pub farm_id: String,
    #[ts(as = "String")]
    pub period: Period,
    pub period_type: PeriodType,
    #[ts(as = "String")]
    pub period_start: NaiveDate,
    #[ts(as = "String")]
    pub period_end: NaiveDate,
    pub total_revenue: Money,
    pub total_expenses: Money,
    pub accounting_profit: Money,
    pub adjustments: Vec<CitAdjustmentItem>,
    pub total_add_backs: Money,
    pub total_deductions: Money,
    pub taxable_income_before_loss: Money,
    pub loss_applied: Money,
    pub loss_usage: Vec<LossUsage>,
    pub taxable_income: Money,
    pub tax_rate: Rate,
    pub cit_amount: Money,
    pub loss_carried: Money,
    pub warnings: Vec<String>,
}

// =============================================================================
// Calculator
// =============================================================================

/// A rule that enables an adjustment: its code and value.
struct Param {
    code: String,
    value: Decimal,
}

fn param(rules: &RuleSnapshot, query: RuleQuery<'_>) -> Option<Param> {
    rules.resolve(query).map(|r| Param {
        code: r.code.clone(),
        value: r.current_value(),
    })
}

/// Running total for an aggregate cap (entertainment, welfare).
struct AggregateCap {
    param: Param,
    spent: Money,
}

impl AggregateCap {
    /// Excess of this item over the cap, given everything before it.
    fn excess(&mut self, amount: Money) -> Money {
        let cap = Money::new(self.param.value);
        let before = self.spent;
        self.spent += amount;
        if self.spent <= cap {
            Money::ZERO
        } else {
            self.spent - before.max(cap)
        }
    }
}

struct Scan<'r> {
    rules: &'r RuleSnapshot,
    months: u32,
    penalty: Option<Param>,
    cash: Option<Param>,
    casual: Option<Param>,
    exempt: Option<Param>,
    entertainment: Option<AggregateCap>,
    welfare: Option<AggregateCap>,
    items: Vec<CitAdjustmentItem>,
    warnings: Vec<String>,
}

impl Scan<'_> {
    fn expense_item(&mut self, item: &LedgerItem<'_>) {
        let txn = item.transaction;
        let mut room = item.amount.clamp_non_negative();
        let mut found: Vec<(String, String, Money, String)> = Vec::new();

        if item.category == LedgerCategory::AdminPenalty {
            if let Some(p) = &self.penalty {
                found.push((
                    "PENALTY".to_string(),
                    p.code.clone(),
                    item.amount.apply_rate(Rate::from_percent(p.value)),
                    "administrative penalty is not deductible".to_string(),
                ));
            }
        }

        if let Some(p) = &self.cash {
            let threshold = Money::new(p.value);
            if txn.is_unevidenced_cash() && txn.amount >= threshold {
                found.push((
                    "CASH_PAYMENT".to_string(),
                    p.code.clone(),
                    item.amount,
                    format!("cash payment of {} without bank transfer evidence", txn.amount),
                ));
            }
        }

        let aggregate = match item.category {
            LedgerCategory::Entertainment => self.entertainment.as_mut().map(|c| ("ENTERTAINMENT", c)),
            LedgerCategory::Welfare => self.welfare.as_mut().map(|c| ("WELFARE", c)),
            _ => None,
        };
        if let Some((category, cap)) = aggregate {
            let excess = cap.excess(item.amount);
            if excess.is_positive() {
                found.push((
                    category.to_string(),
                    cap.param.code.clone(),
                    excess,
                    format!(
                        "{} spend above period cap {}",
                        category.to_lowercase(),
                        Money::new(cap.param.value)
                    ),
                ));
            }
        }

        if item.category == LedgerCategory::Depreciation {
            if let Some(asset) = item.asset_category {
                let category = depreciation_category(asset);
                if let Some(p) = param(self.rules, RuleQuery::key(RuleType::CitAddBack, &category)) {
                    match item.asset_cost {
                        Some(cost) => {
                            let annual = cost.apply_rate(Rate::from_percent(p.value));
                            let allowed = Money::new(
                                annual.amount() * Decimal::from(self.months) / Decimal::from(12),
                            );
                            let excess = item.amount - allowed;
                            if excess.is_positive() {
                                found.push((
                                    category.clone(),
                                    p.code,
                                    excess,
                                    format!("depreciation above statutory cap {}", allowed.round_currency()),
                                ));
                            }
                        }
                        None => self.warnings.push(format!(
                            "transaction {}: depreciation for {} has no asset cost; cap not checked",
                            txn.id, asset
                        )),
                    }
                }
            }
        }

        if item.category == LedgerCategory::CasualWages && !txn.pit_withheld {
            if let Some(p) = &self.casual {
                found.push((
                    "CASUAL_LABOR_NO_PIT".to_string(),
                    p.code.clone(),
                    item.amount.apply_rate(Rate::from_percent(p.value)),
                    "casual labor paid without PIT withholding".to_string(),
                ));
            }
        }

        for (category, rule_code, amount, description) in found {
            let amount = amount.min(room);
            if !amount.is_positive() {
                continue;
            }
            room -= amount;
            self.items.push(CitAdjustmentItem {
                adjustment_type: AdjustmentType::AddBack,
                category,
                rule_code,
                amount,
                source_transaction_id: Some(txn.id.clone()),
                description,
            });
        }
    }

    fn revenue_item(&mut self, item: &LedgerItem<'_>) {
        if item.category != LedgerCategory::ExemptIncome {
            return;
        }
        if let Some(p) = &self.exempt {
            let amount = item
                .amount
                .apply_rate(Rate::from_percent(p.value))
                .min(item.amount);
            if amount.is_positive() {
                self.items.push(CitAdjustmentItem {
                    adjustment_type: AdjustmentType::Deduction,
                    category: "EXEMPT_INCOME".to_string(),
                    rule_code: p.code.clone(),
                    amount,
                    source_transaction_id: Some(item.transaction.id.clone()),
                    description: "exempt income".to_string(),
                });
            }
        }
    }
}

/// Computes CIT for one farm and period.
///
/// `rules` must be the snapshot as of the period end. Transactions outside
/// the span, of another farm, or of kind OTHER are ignored.
///
/// ## Errors
/// - `Validation` for a monthly period
/// - `Configuration` when no CIT tax rate rule is active
pub fn calculate_cit(input: &CitInput<'_>, rules: &RuleSnapshot) -> CoreResult<CitResult> {
    let period_type = input.period.period_type();
    if period_type == PeriodType::Monthly {
        return Err(ValidationError::InvalidFormat {
            field: "period".to_string(),
            reason: "CIT is declared quarterly (YYYY-Qn) or annually (YYYY)".to_string(),
        }
        .into());
    }

    let tax_rate = rules.rate(CIT_TAX_RATE)?;

    let mut transactions: Vec<&LedgerTransaction> = input
        .transactions
        .iter()
        .filter(|t| t.farm_id == rules.farm_id() && input.span.contains(t.txn_date))
        .collect();
    transactions.sort_by(|a, b| a.txn_date.cmp(&b.txn_date).then_with(|| a.id.cmp(&b.id)));

    let mut scan = Scan {
        rules,
        months: input.period.months(),
        penalty: param(rules, CIT_PENALTY),
        cash: param(rules, CIT_CASH_PAYMENT),
        casual: param(rules, CIT_CASUAL_LABOR_NO_PIT),
        exempt: param(rules, CIT_EXEMPT_INCOME),
        entertainment: param(rules, CIT_ENTERTAINMENT).map(|param| AggregateCap {
            param,
            spent: Money::ZERO,
        }),
        welfare: param(rules, CIT_WELFARE).map(|param| AggregateCap {
            param,
            spent: Money::ZERO,
        }),
        items: Vec::new(),
        warnings: Vec::new(),
    };

    let mut revenue = Money::ZERO;
    let mut expenses = Money::ZERO;

    for txn in transactions {
        for item in txn.items() {
            match txn.kind {
                TransactionKind::Revenue => {
                    revenue += item.amount;
                    scan.revenue_item(&item);
                }
                TransactionKind::Expense => {
                    expenses += item.amount;
                    scan.expense_item(&item);
                }
                TransactionKind::Other => {}
            }
        }
    }

    // Totals are summed from the rounded rows so the exported items add up
    for item in &mut scan.items {
        item.amount = item.amount.round_currency();
    }

    let add_backs: Money = scan
        .items
        .iter()
        .filter(|i| i.adjustment_type == AdjustmentType::AddBack)
        .map(|i| i.amount)
        .sum();
    let deductions: Money = scan
        .items
        .iter()
        .filter(|i| i.adjustment_type == AdjustmentType::Deduction)
        .map(|i| i.amount)
        .sum();

    let profit = revenue - expenses;
    let before_loss = (profit + add_backs - deductions).round_currency();

    let mut warnings = scan.warnings;
    let (loss_usage, loss_applied) = if before_loss.is_positive() {
        let window = rules.optional(CIT_LOSS_CARRY_YEARS);
        if window.is_none() && !input.losses.is_empty() {
            warnings.push(format!(
                "rule {} missing; prior losses applied without expiry",
                CIT_LOSS_CARRY_YEARS
            ));
        }
        apply_losses(input.fiscal_year, before_loss, input.losses, window)
    } else {
        (Vec::new(), Money::ZERO)
    };

    let taxable = (before_loss - loss_applied).clamp_non_negative();
    let cit_amount = taxable.apply_rate(tax_rate).round_currency();
    let loss_carried = if before_loss.is_negative() {
        -before_loss
    } else {
        Money::ZERO
    };

    Ok(CitResult {
        farm_id: rules.farm_id().to_string(),
        period: input.period,
        period_type,
        period_start: input.span.start,
        period_end: input.span.end,
        total_revenue: revenue.round_currency(),
        total_expenses: expenses.round_currency(),
        accounting_profit: profit.round_currency(),
        adjustments: scan.items,
        total_add_backs: add_backs,
        total_deductions: deductions,
        taxable_income_before_loss: before_loss,
        loss_applied,
        loss_usage,
        taxable_income: taxable,
        tax_rate,
        cit_amount,
        loss_carried,
        warnings,
    })
}

/// Consumes prior losses oldest first, never beyond `base`.
///
/// A loss from fiscal year `Y` is usable in years `Y+1 ..= Y+window`.
fn apply_losses(
    year: i32,
    base: Money,
    losses: &[LossBalance],
    window: Option<Decimal>,
) -> (Vec<LossUsage>, Money) {
    let mut eligible: Vec<&LossBalance> = losses
        .iter()
        .filter(|l| l.loss_year < year && l.remaining.is_positive())
        .filter(|l| match window {
            Some(years) => Decimal::from(year - l.loss_year) <= years,
            None => true,
        })
        .collect();
    eligible.sort_by_key(|l| l.loss_year);

    let mut left = base;
    let mut usage = Vec::new();
    for loss in eligible {
        if !left.is_positive() {
            break;
        }
        let used = loss.remaining.min(left);
        left -= used;
        usage.push(LossUsage {
            loss_year: loss.loss_year,
            amount: used,
        });
    }

    let applied = base - left;
    (usage, applied)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, RuleAction, RuleValue, TaxRule, TransactionLine};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rule(code: &str, rule_type: RuleType, category: &str, value: Decimal) -> TaxRule {
        TaxRule {
            id: format!("id-{code}"),
            farm_id: "farm-1".to_string(),
            code: code.to_string(),
            rule_type,
            category: category.to_string(),
            action: RuleAction::Add,
            name: code.to_string(),
            description: None,
            value: RuleValue::system(value),
            threshold: None,
            is_system: true,
            is_active: true,
            reference: None,
            effective_from: d(2020, 1, 1),
            priority: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rate_only() -> Vec<TaxRule> {
        vec![rule("CIT_TAX_RATE", RuleType::CitDeduction, "TAX_RATE", dec!(20))]
    }

    fn full_rules() -> Vec<TaxRule> {
        let mut rules = rate_only();
        rules.extend([
            rule("CIT_PENALTY", RuleType::CitAddBack, "PENALTY", dec!(100)),
            rule("CIT_CASH", RuleType::CitAddBack, "CASH_PAYMENT", dec!(20000000)),
            rule("CIT_ENT", RuleType::CitAddBack, "ENTERTAINMENT", dec!(5000000)),
            rule("CIT_WELFARE", RuleType::CitAddBack, "WELFARE", dec!(3000000)),
            rule("CIT_DEP_MACH", RuleType::CitAddBack, "DEPRECIATION:MACHINERY", dec!(20)),
            rule("CIT_CASUAL", RuleType::CitAddBack, "CASUAL_LABOR_NO_PIT", dec!(100)),
            rule("CIT_EXEMPT", RuleType::CitDeduction, "EXEMPT_INCOME", dec!(100)),
            rule("CIT_LOSS_YEARS", RuleType::CitDeduction, "LOSS_CARRY_YEARS", dec!(5)),
        ]);
        rules
    }

    fn snap(rules: Vec<TaxRule>) -> RuleSnapshot {
        RuleSnapshot::new("farm-1", d(2025, 12, 31), rules)
    }

    fn txn(id: &str, date: NaiveDate, kind: TransactionKind, category: LedgerCategory, amount: i64) -> LedgerTransaction {
        LedgerTransaction {
            id: id.to_string(),
            farm_id: "farm-1".to_string(),
            txn_date: date,
            kind,
            category,
            amount: Money::from_units(amount),
            payment_method: PaymentMethod::BankTransfer,
            has_bank_transfer_evidence: true,
            pit_withheld: true,
            asset_category: None,
            asset_cost: None,
            description: None,
            lines: vec![],
        }
    }

    fn year_input<'a>(txns: &'a [LedgerTransaction], losses: &'a [LossBalance]) -> CitInput<'a> {
        let period: Period = "2025".parse().unwrap();
        CitInput {
            period,
            fiscal_year: period.fiscal_year(1),
            span: period.span(1).unwrap(),
            transactions: txns,
            losses,
        }
    }

    fn profit_txns(revenue: i64, expenses: i64) -> Vec<LedgerTransaction> {
        vec![
            txn("r1", d(2025, 3, 1), TransactionKind::Revenue, LedgerCategory::Sales, revenue),
            txn("e1", d(2025, 4, 1), TransactionKind::Expense, LedgerCategory::Materials, expenses),
        ]
    }

    #[test]
    fn test_profit_case() {
        let txns = profit_txns(100_000_000, 60_000_000);
        let r = calculate_cit(&year_input(&txns, &[]), &snap(rate_only())).unwrap();
        assert_eq!(r.accounting_profit, Money::from_units(40_000_000));
        assert_eq!(r.cit_amount, Money::from_units(8_000_000));
        assert_eq!(r.loss_carried, Money::ZERO);
    }

    #[test]
    fn test_loss_case() {
        let txns = profit_txns(100_000_000, 110_000_000);
        let r = calculate_cit(&year_input(&txns, &[]), &snap(rate_only())).unwrap();
        assert_eq!(r.accounting_profit, Money::from_units(-10_000_000));
        assert_eq!(r.cit_amount, Money::ZERO);
        assert_eq!(r.loss_carried, Money::from_units(10_000_000));
        assert_eq!(r.taxable_income, Money::ZERO);
    }

    #[test]
    fn test_missing_tax_rate_is_configuration_error() {
        let txns = profit_txns(1, 0);
        let err = calculate_cit(&year_input(&txns, &[]), &snap(vec![])).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Configuration { .. }));
    }

    #[test]
    fn test_monthly_period_rejected() {
        let period: Period = "2025-01".parse().unwrap();
        let input = CitInput {
            period,
            fiscal_year: period.fiscal_year(1),
            span: period.span(1).unwrap(),
            transactions: &[],
            losses: &[],
        };
        assert!(calculate_cit(&input, &snap(rate_only())).is_err());
    }

    #[test]
    fn test_out_of_span_and_other_kind_ignored() {
        let mut txns = profit_txns(100_000_000, 60_000_000);
        txns.push(txn("old", d(2024, 12, 31), TransactionKind::Revenue, LedgerCategory::Sales, 999));
        txns.push(txn("draw", d(2025, 5, 1), TransactionKind::Other, LedgerCategory::Other, 5_000));
        let r = calculate_cit(&year_input(&txns, &[]), &snap(rate_only())).unwrap();
        assert_eq!(r.total_revenue, Money::from_units(100_000_000));
        assert_eq!(r.total_expenses, Money::from_units(60_000_000));
    }

    #[test]
    fn test_penalty_and_cash_do_not_double_count() {
        let mut penalty = txn("p1", d(2025, 2, 1), TransactionKind::Expense, LedgerCategory::AdminPenalty, 25_000_000);
        penalty.payment_method = PaymentMethod::Cash;
        penalty.has_bank_transfer_evidence = false;
        let mut txns = profit_txns(100_000_000, 0);
        txns.push(penalty);

        let r = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        assert_eq!(r.adjustments.len(), 1);
        assert_eq!(r.adjustments[0].category, "PENALTY");
        assert_eq!(r.total_add_backs, Money::from_units(25_000_000));
    }

    #[test]
    fn test_adjustment_rows_add_up_to_totals() {
        let mut txns = profit_txns(100_000_000, 0);
        for id in ["p1", "p2"] {
            let mut fine = txn(id, d(2025, 2, 1), TransactionKind::Expense, LedgerCategory::AdminPenalty, 0);
            fine.amount = Money::new(dec!(0.5));
            txns.push(fine);
        }

        let r = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        assert_eq!(r.adjustments.len(), 2);
        let listed: Money = r.adjustments.iter().map(|i| i.amount).sum();
        assert_eq!(listed, r.total_add_backs);
        assert_eq!(r.total_add_backs, Money::from_units(2));
        assert_eq!(r.taxable_income_before_loss, Money::from_units(100_000_001));
    }

    #[test]
    fn test_cash_payment_add_back() {
        let mut cash = txn("c1", d(2025, 2, 1), TransactionKind::Expense, LedgerCategory::Materials, 30_000_000);
        cash.payment_method = PaymentMethod::Cash;
        cash.has_bank_transfer_evidence = false;
        let mut small = cash.clone();
        small.id = "c2".to_string();
        small.amount = Money::from_units(19_999_999);

        let txns = vec![cash, small];
        let r = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        assert_eq!(r.adjustments.len(), 1);
        assert_eq!(r.adjustments[0].source_transaction_id.as_deref(), Some("c1"));
        assert_eq!(r.adjustments[0].amount, Money::from_units(30_000_000));
    }

    #[test]
    fn test_entertainment_excess_attributed_in_date_order() {
        let txns = vec![
            txn("e3", d(2025, 9, 1), TransactionKind::Expense, LedgerCategory::Entertainment, 1_000_000),
            txn("e1", d(2025, 1, 1), TransactionKind::Expense, LedgerCategory::Entertainment, 3_000_000),
            txn("e2", d(2025, 5, 1), TransactionKind::Expense, LedgerCategory::Entertainment, 4_000_000),
        ];
        let r = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();

        let items: Vec<_> = r
            .adjustments
            .iter()
            .map(|i| (i.source_transaction_id.clone().unwrap(), i.amount))
            .collect();
        assert_eq!(
            items,
            vec![
                ("e2".to_string(), Money::from_units(2_000_000)),
                ("e3".to_string(), Money::from_units(1_000_000)),
            ]
        );
    }

    #[test]
    fn test_depreciation_cap_prorated_for_quarter() {
        let mut dep = txn("d1", d(2025, 2, 1), TransactionKind::Expense, LedgerCategory::Depreciation, 6_000_000);
        dep.asset_category = Some("machinery".to_string());
        dep.asset_cost = Some(Money::from_units(100_000_000));
        let txns = vec![dep];

        // annual cap 20M: nothing added back
        let r = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        assert!(r.adjustments.is_empty());

        // quarterly cap 5M: 1M added back
        let period: Period = "2025-Q1".parse().unwrap();
        let input = CitInput {
            period,
            fiscal_year: period.fiscal_year(1),
            span: period.span(1).unwrap(),
            transactions: &txns,
            losses: &[],
        };
        let r = calculate_cit(&input, &snap(full_rules())).unwrap();
        assert_eq!(r.adjustments.len(), 1);
        assert_eq!(r.adjustments[0].category, "DEPRECIATION:MACHINERY");
        assert_eq!(r.adjustments[0].amount, Money::from_units(1_000_000));
    }

    #[test]
    fn test_lines_inherit_header_payment_attributes() {
        let mut t = txn("w1", d(2025, 6, 1), TransactionKind::Expense, LedgerCategory::Wages, 8_000_000);
        t.pit_withheld = false;
        t.lines = vec![
            TransactionLine {
                id: "l1".into(),
                transaction_id: "w1".into(),
                category: LedgerCategory::CasualWages,
                amount: Money::from_units(3_000_000),
                asset_category: None,
                asset_cost: None,
                description: None,
            },
            TransactionLine {
                id: "l2".into(),
                transaction_id: "w1".into(),
                category: LedgerCategory::Wages,
                amount: Money::from_units(5_000_000),
                asset_category: None,
                asset_cost: None,
                description: None,
            },
        ];
        let txns = vec![t];
        let r = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        assert_eq!(r.total_expenses, Money::from_units(8_000_000));
        assert_eq!(r.adjustments.len(), 1);
        assert_eq!(r.adjustments[0].category, "CASUAL_LABOR_NO_PIT");
        assert_eq!(r.adjustments[0].amount, Money::from_units(3_000_000));
    }

    #[test]
    fn test_exempt_income_deduction() {
        let mut txns = profit_txns(100_000_000, 60_000_000);
        txns.push(txn("x1", d(2025, 7, 1), TransactionKind::Revenue, LedgerCategory::ExemptIncome, 10_000_000));
        let r = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        assert_eq!(r.total_deductions, Money::from_units(10_000_000));
        assert_eq!(r.taxable_income, Money::from_units(40_000_000));
    }

    #[test]
    fn test_loss_offset_fifo_within_window() {
        let txns = profit_txns(100_000_000, 60_000_000);
        let losses = vec![
            LossBalance { loss_year: 2023, remaining: Money::from_units(30_000_000) },
            LossBalance { loss_year: 2018, remaining: Money::from_units(50_000_000) },
            LossBalance { loss_year: 2021, remaining: Money::from_units(15_000_000) },
        ];
        let r = calculate_cit(&year_input(&txns, &losses), &snap(full_rules())).unwrap();

        // 2018 is outside the 5-year window
        assert_eq!(
            r.loss_usage,
            vec![
                LossUsage { loss_year: 2021, amount: Money::from_units(15_000_000) },
                LossUsage { loss_year: 2023, amount: Money::from_units(25_000_000) },
            ]
        );
        assert_eq!(r.taxable_income, Money::ZERO);
        assert_eq!(r.cit_amount, Money::ZERO);
        assert_eq!(r.loss_carried, Money::ZERO);
    }

    #[test]
    fn test_loss_without_window_rule_warns() {
        let txns = profit_txns(100_000_000, 60_000_000);
        let losses = vec![LossBalance { loss_year: 2010, remaining: Money::from_units(10_000_000) }];
        let r = calculate_cit(&year_input(&txns, &losses), &snap(rate_only())).unwrap();
        assert_eq!(r.loss_applied, Money::from_units(10_000_000));
        assert_eq!(r.cit_amount, Money::from_units(6_000_000));
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn test_recalculation_is_deterministic() {
        let mut txns = profit_txns(100_000_000, 60_000_000);
        txns.push(txn("p1", d(2025, 2, 1), TransactionKind::Expense, LedgerCategory::AdminPenalty, 1_000_000));
        let a = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        let b = calculate_cit(&year_input(&txns, &[]), &snap(full_rules())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.adjustments.len(), 1);
    }
}
