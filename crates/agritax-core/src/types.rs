//! # Domain Types
//!
//! Core domain types used throughout AgriTax.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRule      │   │   RuleHistory   │   │    Employee     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  (farm, code)   │   │  rule_id (FK)   │   │  residency      │       │
//! │  │  rule_type      │   │  old → new      │   │  contract_type  │       │
//! │  │  RuleValue ─────┼─┐ │  changed_by     │   │  dependents     │       │
//! │  └─────────────────┘ │ └─────────────────┘   └─────────────────┘       │
//! │                      │                                                  │
//! │  ┌───────────────────▼─┐   ┌─────────────────────┐                     │
//! │  │     RuleValue       │   │  LedgerTransaction  │                     │
//! │  │  value              │   │  kind / category    │                     │
//! │  │  original_value?    │   │  payment attributes │                     │
//! │  │  is_overridden      │   │  lines[]            │                     │
//! │  └─────────────────────┘   └─────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every persisted entity has a UUID `id`. Tax rules are additionally unique
//! by their business key `(farm_id, code)`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::period::Period;

/// Generates `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// text form matches its serde/SQL representation.
macro_rules! text_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the canonical SCREAMING_SNAKE_CASE text form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().replace('-', "_").as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ValidationError::NotAllowed {
                        field: $field.to_string(),
                        allowed: vec![$($text.to_string(),)+],
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;

// =============================================================================
// Rule Classification
// =============================================================================

/// Which statutory area a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum RuleType {
    VatRate,
    VatDeductible,
    CitAddBack,
    CitDeduction,
    PitDeduction,
    PitBracket,
}

text_enum!(RuleType, "rule_type", {
    VatRate => "VAT_RATE",
    VatDeductible => "VAT_DEDUCTIBLE",
    CitAddBack => "CIT_ADD_BACK",
    CitDeduction => "CIT_DEDUCTION",
    PitDeduction => "PIT_DEDUCTION",
    PitBracket => "PIT_BRACKET",
});

/// What a rule does with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum RuleAction {
    /// Adds to a taxable base (CIT add-backs).
    Add,
    /// Subtracts from a taxable base (deductions).
    Deduct,
    /// Caps an amount (limits, thresholds).
    Cap,
    /// Supplies a rate.
    Rate,
}

text_enum!(RuleAction, "action", {
    Add => "ADD",
    Deduct => "DEDUCT",
    Cap => "CAP",
    Rate => "RATE",
});

// =============================================================================
// Overridable Rule Value
// =============================================================================

/// The value part of a tax rule, tagged with its override state.
///
/// ## State Diagram
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │   SYSTEM-MANAGED                         OVERRIDDEN                     │
/// │   is_overridden = false                  is_overridden = true           │
/// │   original_value = None ── override ──►  original_value = Some(v0)     │
/// │        ▲    │                                 │     ▲                   │
/// │        │    │ sync: value := canonical        │     │ override:         │
/// │        │    ▼                                 │     │ value := new      │
/// │        └────┘                                 │     │ (original kept)   │
/// │        ▲                                      │     └─────              │
/// │        └──────────────── reset ───────────────┘                         │
/// │              value := original_value (original kept)                    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// Sync never touches `value` while `is_overridden` is true, and nothing
/// ever rewrites `original_value` once it is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleValue {
    #[ts(as = "String")]
    pub value: Decimal,
    #[ts(as = "Option<String>")]
    pub original_value: Option<Decimal>,
    pub is_overridden: bool,
}

impl RuleValue {
    /// A fresh system-managed value.
    pub fn system(value: Decimal) -> Self {
        RuleValue {
            value,
            original_value: None,
            is_overridden: false,
        }
    }

    /// Applies a user override. Returns the previous value.
    ///
    /// `original_value` is captured only on the first override.
    pub fn apply_override(&mut self, new_value: Decimal) -> Decimal {
        let old = self.value;
        if self.original_value.is_none() {
            self.original_value = Some(old);
        }
        self.value = new_value;
        self.is_overridden = true;
        old
    }

    /// Applies a canonical value from the catalog.
    ///
    /// Returns `Some(old)` when the value changed, `None` when it was either
    /// unchanged or protected by an override.
    pub fn apply_canonical(&mut self, canonical: Decimal) -> Option<Decimal> {
        if self.is_overridden || self.value == canonical {
            return None;
        }
        let old = self.value;
        self.value = canonical;
        Some(old)
    }

    /// Hands the rule back to sync management, restoring the pre-override value.
    ///
    /// Returns `Some(old)` when the value changed.
    pub fn reset(&mut self) -> Option<Decimal> {
        if !self.is_overridden {
            return None;
        }
        self.is_overridden = false;
        let restored = self.original_value.unwrap_or(self.value);
        if restored == self.value {
            return None;
        }
        let old = self.value;
        self.value = restored;
        Some(old)
    }
}

// =============================================================================
// Tax Rule
// =============================================================================

/// A farm-scoped tax rule row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRule {
    pub id: String,
    pub farm_id: String,
    /// Business key, unique per farm.
    pub code: String,
    pub rule_type: RuleType,
    pub category: String,
    pub action: RuleAction,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    #[ts(flatten)]
    pub value: RuleValue,
    /// Secondary numeric parameter; PIT_BRACKET rules store the bracket lower bound here.
    #[ts(as = "Option<String>")]
    pub threshold: Option<Decimal>,
    /// Seeded from the catalog (true) or created by a user (false).
    pub is_system: bool,
    pub is_active: bool,
    /// Legal citation.
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub effective_from: NaiveDate,
    /// Higher wins on ties.
    pub priority: i32,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl TaxRule {
    /// The value resolution should use.
    #[inline]
    pub fn current_value(&self) -> Decimal {
        self.value.value
    }

    /// The current value read as an amount of money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::new(self.value.value)
    }

    /// Checks whether the rule applies on `as_of`.
    #[inline]
    pub fn is_effective_on(&self, as_of: NaiveDate) -> bool {
        self.is_active && self.effective_from <= as_of
    }
}

/// A user-created rule before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub code: String,
    pub rule_type: RuleType,
    pub category: String,
    pub action: RuleAction,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub value: Decimal,
    #[serde(default)]
    pub threshold: Option<Decimal>,
    #[serde(default)]
    pub reference: Option<String>,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub priority: i32,
}

impl RuleDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::validation::validate_rule_code(&self.code)?;
        crate::validation::validate_required("name", &self.name)?;
        crate::validation::validate_required("category", &self.category)?;
        crate::validation::validate_rule_value(self.value)?;
        if let Some(threshold) = self.threshold {
            crate::validation::validate_rule_value(threshold)?;
        }
        if self.rule_type == RuleType::PitBracket && self.threshold.is_none() {
            return Err(ValidationError::Required {
                field: "threshold".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Rule History
// =============================================================================

/// Who changes rule values when sync applies a catalog update.
pub const SYSTEM_SYNC_ACTOR: &str = "system:sync";

/// Append-only audit row, one per value change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleHistory {
    pub id: String,
    pub rule_id: String,
    /// `None` for the initial value of a user-created rule.
    #[ts(as = "Option<String>")]
    pub old_value: Option<Decimal>,
    #[ts(as = "String")]
    pub new_value: Decimal,
    pub changed_by: String,
    #[ts(as = "String")]
    pub changed_at: DateTime<Utc>,
}

// =============================================================================
// Farm
// =============================================================================

/// The tenant every rule, employee and transaction is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farm {
    pub id: String,
    pub name: String,
    /// Month (1-12) in which the fiscal year starts.
    pub fiscal_year_start_month: u32,
}

// =============================================================================
// Suppliers
// =============================================================================

/// Registration status of a supplier with the tax authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum SupplierStatus {
    #[default]
    Active,
    Suspended,
    Closed,
    Bankrupt,
}

text_enum!(SupplierStatus, "supplier_status", {
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
    Closed => "CLOSED",
    Bankrupt => "BANKRUPT",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub farm_id: String,
    pub name: String,
    pub tax_code: Option<String>,
}

impl SupplierStatus {
    /// Invoices from suppliers in these states carry no deductible input VAT.
    pub fn blocks_deduction(&self) -> bool {
        matches!(
            self,
            SupplierStatus::Suspended | SupplierStatus::Closed | SupplierStatus::Bankrupt
        )
    }
}

// =============================================================================
// Payments & Categories
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    Other,
}

text_enum!(PaymentMethod, "payment_method", {
    Cash => "CASH",
    BankTransfer => "BANK_TRANSFER",
    Card => "CARD",
    Other => "OTHER",
});

/// What a purchase is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum UsagePurpose {
    #[default]
    Business,
    Personal,
    WelfareFund,
}

text_enum!(UsagePurpose, "usage_purpose", {
    Business => "BUSINESS",
    Personal => "PERSONAL",
    WelfareFund => "WELFARE_FUND",
});

/// Chart-of-accounts style classification shared by invoices and ledger lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum LedgerCategory {
    Sales,
    /// Revenue exempt from CIT (e.g., unprocessed agricultural produce).
    ExemptIncome,
    OtherIncome,
    Materials,
    Wages,
    /// Wages paid to casual (seasonal) labor.
    CasualWages,
    Depreciation,
    Entertainment,
    Welfare,
    /// Administrative fines and penalties.
    AdminPenalty,
    /// Passenger cars under the seat threshold.
    PassengerVehicle,
    Utilities,
    #[default]
    Other,
}

text_enum!(LedgerCategory, "category", {
    Sales => "SALES",
    ExemptIncome => "EXEMPT_INCOME",
    OtherIncome => "OTHER_INCOME",
    Materials => "MATERIALS",
    Wages => "WAGES",
    CasualWages => "CASUAL_WAGES",
    Depreciation => "DEPRECIATION",
    Entertainment => "ENTERTAINMENT",
    Welfare => "WELFARE",
    AdminPenalty => "ADMIN_PENALTY",
    PassengerVehicle => "PASSENGER_VEHICLE",
    Utilities => "UTILITIES",
    Other => "OTHER",
});

// =============================================================================
// Employees
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Residency {
    #[default]
    Resident,
    NonResident,
}

text_enum!(Residency, "residency", {
    Resident => "RESIDENT",
    NonResident => "NON_RESIDENT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ContractType {
    /// Labor contract of 3 months or more: progressive tax.
    #[default]
    Standard,
    /// Short-term / service contract earner taxed at a flat rate.
    FlatRate,
}

text_enum!(ContractType, "contract_type", {
    Standard => "STANDARD",
    FlatRate => "FLAT_RATE",
});

/// A worker record as seen by the PIT calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub farm_id: String,
    pub full_name: String,
    pub tax_code: Option<String>,
    pub residency: Residency,
    pub contract_type: ContractType,
    /// Default number of registered dependents.
    pub dependents_count: u32,
    /// Salary base for compulsory insurance contributions.
    pub insurance_base: Option<Money>,
    pub is_active: bool,
}

/// Monthly gross figure handed over by payroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollEntry {
    pub farm_id: String,
    pub employee_id: String,
    /// Always a monthly period.
    pub period: Period,
    pub gross_income: Money,
    pub dependents_count: Option<u32>,
    pub other_deduction: Option<Money>,
    pub insurance_deduction: Option<Money>,
}

// =============================================================================
// Ledger Transactions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Revenue,
    Expense,
    /// Transfers, owner draws: excluded from profit.
    Other,
}

text_enum!(TransactionKind, "kind", {
    Revenue => "REVENUE",
    Expense => "EXPENSE",
    Other => "OTHER",
});

/// A posted accounting transaction within a farm's books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub farm_id: String,
    pub txn_date: NaiveDate,
    pub kind: TransactionKind,
    pub category: LedgerCategory,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub has_bank_transfer_evidence: bool,
    /// For wage payments: whether PIT was withheld at source.
    pub pit_withheld: bool,
    pub asset_category: Option<String>,
    pub asset_cost: Option<Money>,
    pub description: Option<String>,
    pub lines: Vec<TransactionLine>,
}

/// A line item; inherits payment attributes from its transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub id: String,
    pub transaction_id: String,
    pub category: LedgerCategory,
    pub amount: Money,
    pub asset_category: Option<String>,
    pub asset_cost: Option<Money>,
    pub description: Option<String>,
}

/// A flattened view of one scannable item: a line, or the header when
/// the transaction has no lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerItem<'a> {
    pub transaction: &'a LedgerTransaction,
    pub category: LedgerCategory,
    pub amount: Money,
    pub asset_category: Option<&'a str>,
    pub asset_cost: Option<Money>,
}

impl LedgerTransaction {
    /// Items to scan for adjustments.
    pub fn items(&self) -> Vec<LedgerItem<'_>> {
        if self.lines.is_empty() {
            return vec![LedgerItem {
                transaction: self,
                category: self.category,
                amount: self.amount,
                asset_category: self.asset_category.as_deref(),
                asset_cost: self.asset_cost,
            }];
        }

        self.lines
            .iter()
            .map(|line| LedgerItem {
                transaction: self,
                category: line.category,
                amount: line.amount,
                asset_category: line.asset_category.as_deref(),
                asset_cost: line.asset_cost,
            })
            .collect()
    }

    /// Paid in cash without bank-transfer evidence.
    pub fn is_unevidenced_cash(&self) -> bool {
        self.payment_method == PaymentMethod::Cash && !self.has_bank_transfer_evidence
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
