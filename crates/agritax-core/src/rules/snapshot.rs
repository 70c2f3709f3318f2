//! # Rule Snapshot
//!
//! An immutable view of one farm's active rules as of one date.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  candidates = rules WHERE farm_id = F                                  │
//! │                       AND is_active                                    │
//! │                       AND effective_from <= as_of                      │
//! │                       AND matches(query)                               │
//! │                                                                         │
//! │  winner = max by (priority, effective_from)                            │
//! │           final tie: lowest code, so the choice is deterministic       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each calculator builds one snapshot at the start of a call and uses it
//! for the whole calculation. Snapshots are never shared across farms or
//! cached between calls.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::keys::{RuleQuery, PIT_BRACKET_CATEGORY};
use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::pit::{Bracket, BracketTable};
use crate::types::{RuleType, TaxRule};

/// Outcome of a lookup that tolerates a missing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Rule(Decimal),
    Fallback(Decimal),
}

impl Resolved {
    #[inline]
    pub fn value(&self) -> Decimal {
        match self {
            Resolved::Rule(v) | Resolved::Fallback(v) => *v,
        }
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback(_))
    }
}

#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    farm_id: String,
    as_of: NaiveDate,
    rules: Vec<TaxRule>,
}

impl RuleSnapshot {
    /// Builds a snapshot, dropping rows that are inactive, belong to another
    /// farm, or are not yet effective on `as_of`.
    pub fn new(farm_id: impl Into<String>, as_of: NaiveDate, rules: Vec<TaxRule>) -> Self {
        let farm_id = farm_id.into();
        let rules = rules
            .into_iter()
            .filter(|r| r.farm_id == farm_id && r.is_effective_on(as_of))
            .collect();

        RuleSnapshot {
            farm_id,
            as_of,
            rules,
        }
    }

    pub fn farm_id(&self) -> &str {
        &self.farm_id
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Rules visible in this snapshot.
    pub fn rules(&self) -> &[TaxRule] {
        &self.rules
    }

    /// Selects the single winning rule for `query`.
    pub fn resolve(&self, query: RuleQuery<'_>) -> Option<&TaxRule> {
        self.rules
            .iter()
            .filter(|r| matches(r, query))
            .max_by(|a, b| precedence(a, b))
    }

    /// Value of a required rule.
    ///
    /// ## Errors
    /// `CoreError::Configuration` when no active rule matches.
    pub fn value(&self, query: RuleQuery<'_>) -> CoreResult<Decimal> {
        self.resolve(query)
            .map(TaxRule::current_value)
            .ok_or_else(|| self.missing(query))
    }

    /// Value of a required rule read as a percentage rate.
    pub fn rate(&self, query: RuleQuery<'_>) -> CoreResult<Rate> {
        self.value(query).map(Rate::from_percent)
    }

    /// Value of a required rule read as money.
    pub fn amount(&self, query: RuleQuery<'_>) -> CoreResult<Money> {
        self.value(query).map(Money::new)
    }

    /// Value of an optional rule.
    pub fn optional(&self, query: RuleQuery<'_>) -> Option<Decimal> {
        self.resolve(query).map(TaxRule::current_value)
    }

    /// Value of a non-critical rule, with a documented fallback.
    pub fn value_or(&self, query: RuleQuery<'_>, fallback: Decimal) -> Resolved {
        match self.optional(query) {
            Some(v) => Resolved::Rule(v),
            None => Resolved::Fallback(fallback),
        }
    }

    /// Builds the progressive PIT bracket table.
    ///
    /// Rows are grouped by `threshold` (the lower bound); each group is
    /// resolved with the usual precedence, so a later-effective row for the
    /// same bound supersedes the older one.
    ///
    /// ## Errors
    /// - No bracket rows at all
    /// - A bracket row without a threshold
    /// - The lowest bracket does not start at zero
    pub fn brackets(&self) -> CoreResult<BracketTable> {
        let query = RuleQuery::key(RuleType::PitBracket, PIT_BRACKET_CATEGORY);
        let mut groups: BTreeMap<Decimal, &TaxRule> = BTreeMap::new();

        for rule in self.rules.iter().filter(|r| matches(r, query)) {
            let bound = rule.threshold.ok_or_else(|| {
                CoreError::configuration(&rule.code, &self.farm_id, "bracket rule has no threshold")
            })?;

            let replace = match groups.get(&bound) {
                Some(current) => precedence(rule, current) == Ordering::Greater,
                None => true,
            };
            if replace {
                groups.insert(bound, rule);
            }
        }

        let brackets = groups
            .into_iter()
            .map(|(bound, rule)| Bracket {
                lower_bound: Money::new(bound),
                rate: Rate::from_percent(rule.current_value()),
                rule_code: rule.code.clone(),
            })
            .collect::<Vec<_>>();

        BracketTable::new(brackets)
            .map_err(|reason| CoreError::configuration(query.to_string(), &self.farm_id, reason))
    }

    fn missing(&self, query: RuleQuery<'_>) -> CoreError {
        CoreError::configuration(
            query.to_string(),
            &self.farm_id,
            format!("no active rule effective on {}", self.as_of),
        )
    }
}

fn matches(rule: &TaxRule, query: RuleQuery<'_>) -> bool {
    match query {
        RuleQuery::Code(code) => rule.code == code,
        RuleQuery::Key {
            rule_type,
            category,
        } => rule.rule_type == rule_type && rule.category.eq_ignore_ascii_case(category),
    }
}

/// `Greater` means `a` wins over `b`.
fn precedence(a: &TaxRule, b: &TaxRule) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.effective_from.cmp(&b.effective_from))
        .then_with(|| b.code.cmp(&a.code))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::keys::{CIT_TAX_RATE, PIT_PERSONAL, VAT_CASH_LIMIT};
    use crate::types::{RuleAction, RuleValue};
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
            action: RuleAction::Deduct,
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

    fn bracket(code: &str, lower: Decimal, rate: Decimal) -> TaxRule {
        let mut r = rule(code, RuleType::PitBracket, "BRACKET", rate);
        r.threshold = Some(lower);
        r
    }

    #[test]
    fn test_priority_then_effective_from() {
        let old = rule("PIT_PERSONAL_2020", RuleType::PitDeduction, "PERSONAL", dec!(11000000));
        let mut newer = rule("PIT_PERSONAL_2026", RuleType::PitDeduction, "PERSONAL", dec!(15500000));
        newer.effective_from = d(2026, 1, 1);
        let mut boosted = rule("PIT_PERSONAL_LOCAL", RuleType::PitDeduction, "PERSONAL", dec!(9000000));
        boosted.priority = 5;

        let snap = RuleSnapshot::new("farm-1", d(2026, 6, 1), vec![old.clone(), newer.clone()]);
        assert_eq!(snap.value(PIT_PERSONAL).unwrap(), dec!(15500000));

        let snap = RuleSnapshot::new("farm-1", d(2025, 6, 1), vec![old.clone(), newer.clone()]);
        assert_eq!(snap.value(PIT_PERSONAL).unwrap(), dec!(11000000));

        let snap = RuleSnapshot::new("farm-1", d(2026, 6, 1), vec![old, newer, boosted]);
        assert_eq!(snap.value(PIT_PERSONAL).unwrap(), dec!(9000000));
    }

    #[test]
    fn test_inactive_and_foreign_rules_are_invisible() {
        let mut inactive = rule("CIT_TAX_RATE", RuleType::CitDeduction, "TAX_RATE", dec!(20));
        inactive.is_active = false;
        let mut foreign = rule("CIT_TAX_RATE", RuleType::CitDeduction, "TAX_RATE", dec!(15));
        foreign.farm_id = "farm-2".to_string();

        let snap = RuleSnapshot::new("farm-1", d(2025, 1, 1), vec![inactive, foreign]);
        let err = snap.value(CIT_TAX_RATE).unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
    }

    #[test]
    fn test_lookup_by_code() {
        let r = rule("CIT_TAX_RATE", RuleType::CitDeduction, "TAX_RATE", dec!(20));
        let snap = RuleSnapshot::new("farm-1", d(2025, 1, 1), vec![r]);
        assert_eq!(snap.value(RuleQuery::Code("CIT_TAX_RATE")).unwrap(), dec!(20));
        assert_eq!(snap.rate(CIT_TAX_RATE).unwrap(), Rate::from_percent(dec!(20)));
    }

    #[test]
    fn test_value_or_marks_fallback() {
        let snap = RuleSnapshot::new("farm-1", d(2025, 1, 1), vec![]);
        let resolved = snap.value_or(VAT_CASH_LIMIT, dec!(20000000));
        assert!(resolved.is_fallback());
        assert_eq!(resolved.value(), dec!(20000000));
    }

    #[test]
    fn test_overridden_value_is_used() {
        let mut r = rule("PIT_PERSONAL", RuleType::PitDeduction, "PERSONAL", dec!(11000000));
        r.value.apply_override(dec!(12000000));
        let snap = RuleSnapshot::new("farm-1", d(2025, 1, 1), vec![r]);
        assert_eq!(snap.value(PIT_PERSONAL).unwrap(), dec!(12000000));
    }

    #[test]
    fn test_brackets_grouped_by_threshold() {
        let mut superseded = bracket("PIT_B2_OLD", dec!(5000000), dec!(8));
        superseded.effective_from = d(2019, 1, 1);
        let rules = vec![
            bracket("PIT_B1", dec!(0), dec!(5)),
            superseded,
            bracket("PIT_B2", dec!(5000000), dec!(10)),
            bracket("PIT_B3", dec!(10000000), dec!(15)),
        ];
        let snap = RuleSnapshot::new("farm-1", d(2025, 1, 1), rules);
        let table = snap.brackets().unwrap();

        let codes: Vec<_> = table.brackets().iter().map(|b| b.rule_code.as_str()).collect();
        assert_eq!(codes, vec!["PIT_B1", "PIT_B2", "PIT_B3"]);
        assert_eq!(table.brackets()[1].rate, Rate::from_percent(dec!(10)));
    }

    #[test]
    fn test_empty_bracket_table_is_configuration_error() {
        let snap = RuleSnapshot::new("farm-1", d(2025, 1, 1), vec![]);
        assert!(matches!(
            snap.brackets().unwrap_err(),
            CoreError::Configuration { .. }
        ));
    }

    #[test]
    fn test_bracket_table_must_start_at_zero() {
        let snap = RuleSnapshot::new(
            "farm-1",
            d(2025, 1, 1),
            vec![bracket("PIT_B2", dec!(5000000), dec!(10))],
        );
        assert!(snap.brackets().is_err());
    }
}
