//! Rule lookup keys.
//!
//! Calculators look rules up by `(rule_type, category)` so that a successor
//! row with a new code and a later `effective_from` is picked up without any
//! code change. Exact-code lookups exist for operators.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::RuleType;

/// How to find a rule in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleQuery<'a> {
    /// Exact business code.
    Code(&'a str),
    /// Any rule of this type and category.
    Key {
        rule_type: RuleType,
        category: &'a str,
    },
}

impl<'a> RuleQuery<'a> {
    #[inline]
    pub const fn key(rule_type: RuleType, category: &'a str) -> Self {
        RuleQuery::Key {
            rule_type,
            category,
        }
    }
}

impl fmt::Display for RuleQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleQuery::Code(code) => write!(f, "{}", code),
            RuleQuery::Key {
                rule_type,
                category,
            } => write!(f, "{}/{}", rule_type, category),
        }
    }
}

/// Owned form of [`RuleQuery`], for callers that parse a query from input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum RuleSelector {
    Code { code: String },
    Category { rule_type: RuleType, category: String },
}

impl RuleSelector {
    pub fn as_query(&self) -> RuleQuery<'_> {
        match self {
            RuleSelector::Code { code } => RuleQuery::Code(code),
            RuleSelector::Category {
                rule_type,
                category,
            } => RuleQuery::key(*rule_type, category),
        }
    }
}

// =============================================================================
// Well-Known Keys
// =============================================================================

// VAT deduction checks
pub const VAT_CASH_LIMIT: RuleQuery<'static> = RuleQuery::key(RuleType::VatDeductible, "CASH_LIMIT");
pub const VAT_VEHICLE_PRICE_CAP: RuleQuery<'static> =
    RuleQuery::key(RuleType::VatDeductible, "VEHICLE_PRICE_CAP");
pub const VAT_WELFARE_CAP: RuleQuery<'static> = RuleQuery::key(RuleType::VatDeductible, "WELFARE_CAP");
pub const VAT_ENTERTAINMENT_PER_PERSON: RuleQuery<'static> =
    RuleQuery::key(RuleType::VatDeductible, "ENTERTAINMENT_PER_PERSON");
pub const VAT_ENTERTAINMENT_CAP: RuleQuery<'static> =
    RuleQuery::key(RuleType::VatDeductible, "ENTERTAINMENT_CAP");

// PIT
pub const PIT_PERSONAL: RuleQuery<'static> = RuleQuery::key(RuleType::PitDeduction, "PERSONAL");
pub const PIT_DEPENDENT: RuleQuery<'static> = RuleQuery::key(RuleType::PitDeduction, "DEPENDENT");
pub const PIT_INSURANCE_RATE: RuleQuery<'static> =
    RuleQuery::key(RuleType::PitDeduction, "INSURANCE_RATE");
pub const PIT_FLAT_RESIDENT: RuleQuery<'static> =
    RuleQuery::key(RuleType::PitDeduction, "FLAT_RESIDENT");
pub const PIT_FLAT_NON_RESIDENT: RuleQuery<'static> =
    RuleQuery::key(RuleType::PitDeduction, "FLAT_NON_RESIDENT");

/// Category shared by every progressive bracket row.
pub const PIT_BRACKET_CATEGORY: &str = "BRACKET";

// CIT
pub const CIT_TAX_RATE: RuleQuery<'static> = RuleQuery::key(RuleType::CitDeduction, "TAX_RATE");
pub const CIT_EXEMPT_INCOME: RuleQuery<'static> =
    RuleQuery::key(RuleType::CitDeduction, "EXEMPT_INCOME");
pub const CIT_LOSS_CARRY_YEARS: RuleQuery<'static> =
    RuleQuery::key(RuleType::CitDeduction, "LOSS_CARRY_YEARS");
pub const CIT_PENALTY: RuleQuery<'static> = RuleQuery::key(RuleType::CitAddBack, "PENALTY");
pub const CIT_CASH_PAYMENT: RuleQuery<'static> = RuleQuery::key(RuleType::CitAddBack, "CASH_PAYMENT");
pub const CIT_ENTERTAINMENT: RuleQuery<'static> =
    RuleQuery::key(RuleType::CitAddBack, "ENTERTAINMENT");
pub const CIT_WELFARE: RuleQuery<'static> = RuleQuery::key(RuleType::CitAddBack, "WELFARE");
pub const CIT_CASUAL_LABOR_NO_PIT: RuleQuery<'static> =
    RuleQuery::key(RuleType::CitAddBack, "CASUAL_LABOR_NO_PIT");

/// Category of the depreciation cap for an asset class, e.g. `DEPRECIATION:MACHINERY`.
pub fn depreciation_category(asset_category: &str) -> String {
    format!("DEPRECIATION:{}", asset_category.trim().to_uppercase())
}
