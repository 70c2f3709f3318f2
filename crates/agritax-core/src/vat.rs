//! # VAT Deduction Validator
//!
//! Decides how much input VAT on a purchase invoice may be deducted.
//!
//! ## Checks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deductible := vat_amount                                              │
//! │                                                                         │
//! │  DENY checks (any hit ⇒ deductible = 0)                                │
//! │   1. supplier tax code missing / malformed                             │
//! │   2. supplier SUSPENDED / CLOSED / BANKRUPT on invoice_date            │
//! │   3. CASH, total ≥ cash limit, no bank evidence                        │
//! │   4. usage_purpose = PERSONAL                                          │
//! │                                                                         │
//! │  CAP checks (deductible := min(deductible, vat_rate × allowed goods))  │
//! │   4. WELFARE_FUND goods beyond the welfare cap                         │
//! │   5. passenger vehicle, not a transport business, goods > price cap    │
//! │   6. entertainment beyond per-person or aggregate cap                  │
//! │                                                                         │
//! │  Every check runs; all findings land in `reasons`, in check order.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The validator is a pure function of the invoice, the supplier status on
//! the invoice date and the rule snapshot at the invoice date.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreResult;
use crate::money::{Money, Rate};
use crate::period::Period;
use crate::rules::keys::{
    VAT_CASH_LIMIT, VAT_ENTERTAINMENT_CAP, VAT_ENTERTAINMENT_PER_PERSON, VAT_VEHICLE_PRICE_CAP,
    VAT_WELFARE_CAP,
};
use crate::rules::RuleSnapshot;
use crate::types::{LedgerCategory, PaymentMethod, SupplierStatus, UsagePurpose};
use crate::validation::{check_tax_code, validate_non_negative, TaxCodeCheck};

/// Cash payment threshold used when no CASH_LIMIT rule is configured.
pub const FALLBACK_CASH_LIMIT: Decimal = dec!(20000000);

// =============================================================================
// Invoice
// =============================================================================

/// The attributes of a purchase invoice the validator looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VatInvoice {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[ts(as = "String")]
    pub invoice_date: NaiveDate,
    #[serde(default)]
    pub supplier_tax_code: Option<String>,
    pub goods_value: Money,
    /// VAT rate as a percentage (`10` = 10%).
    #[ts(as = "String")]
    pub vat_rate: Decimal,
    pub vat_amount: Money,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub has_bank_transfer_evidence: bool,
    #[serde(default)]
    pub usage_purpose: UsagePurpose,
    #[serde(default)]
    pub category: LedgerCategory,
    /// Vehicles bought by a passenger/freight transport business are exempt from the price cap.
    #[serde(default)]
    pub used_for_transport_business: bool,
    /// Number of attendees, for per-person entertainment caps.
    #[serde(default)]
    pub attendees: Option<u32>,
}

impl VatInvoice {
    pub fn rate(&self) -> Rate {
        Rate::from_percent(self.vat_rate)
    }
}

// =============================================================================
// Verdict
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum VatReasonCode {
    MissingTaxCode,
    InvalidTaxCode,
    SupplierInactive,
    CashLimitExceeded,
    PersonalUse,
    WelfareCap,
    VehiclePriceCap,
    EntertainmentCap,
    /// A statutory fallback replaced a missing rule.
    RuleFallback,
    /// A cap check was skipped because its rule is missing.
    RuleMissing,
}

impl VatReasonCode {
    /// Warnings describe configuration gaps, not the invoice.
    pub fn is_warning(&self) -> bool {
        matches!(self, VatReasonCode::RuleFallback | VatReasonCode::RuleMissing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VatReason {
    pub code: VatReasonCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VatVerdict {
    pub is_deductible: bool,
    pub deductible_amount: Money,
    pub reasons: Vec<VatReason>,
}

impl VatVerdict {
    pub fn has_reason(&self, code: VatReasonCode) -> bool {
        self.reasons.iter().any(|r| r.code == code)
    }
}

/// Facts about the invoice that come from outside the invoice itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VatContext {
    /// Supplier registration status on the invoice date.
    pub supplier_status: SupplierStatus,
    /// Entertainment goods value already claimed in the same month.
    pub entertainment_to_date: Money,
}

// =============================================================================
// Validator
// =============================================================================

struct Findings {
    reasons: Vec<VatReason>,
    denied: bool,
    deductible: Money,
}

impl Findings {
    fn deny(&mut self, code: VatReasonCode, message: String) {
        self.denied = true;
        self.reasons.push(VatReason { code, message });
    }

    fn cap(&mut self, code: VatReasonCode, capped: Money, message: String) {
        self.deductible = self.deductible.min(capped);
        self.reasons.push(VatReason { code, message });
    }

    fn warn(&mut self, code: VatReasonCode, message: String) {
        self.reasons.push(VatReason { code, message });
    }
}

/// Evaluates every deduction check for one invoice.
///
/// ## Errors
/// Only input validation (negative amounts). A non-deductible invoice is a
/// normal verdict.
pub fn validate_invoice(
    invoice: &VatInvoice,
    context: &VatContext,
    rules: &RuleSnapshot,
) -> CoreResult<VatVerdict> {
    validate_non_negative("goods_value", invoice.goods_value)?;
    validate_non_negative("vat_amount", invoice.vat_amount)?;
    validate_non_negative("total_amount", invoice.total_amount)?;
    crate::validation::validate_rule_value(invoice.vat_rate)?;

    let rate = invoice.rate();
    let mut f = Findings {
        reasons: Vec::new(),
        denied: false,
        deductible: invoice.vat_amount,
    };

    // 1. Supplier tax code
    match check_tax_code(invoice.supplier_tax_code.as_deref()) {
        TaxCodeCheck::Valid => {}
        TaxCodeCheck::Missing => f.deny(
            VatReasonCode::MissingTaxCode,
            "supplier tax code is missing".to_string(),
        ),
        TaxCodeCheck::Malformed => f.deny(
            VatReasonCode::InvalidTaxCode,
            format!(
                "supplier tax code '{}' is not 10 or 10+3 digits",
                invoice.supplier_tax_code.as_deref().unwrap_or_default().trim()
            ),
        ),
    }

    // 2. Supplier status
    if context.supplier_status.blocks_deduction() {
        f.deny(
            VatReasonCode::SupplierInactive,
            format!(
                "supplier status is {} on {}",
                context.supplier_status, invoice.invoice_date
            ),
        );
    }

    // 3. Cash payment
    let cash_limit = rules.value_or(VAT_CASH_LIMIT, FALLBACK_CASH_LIMIT);
    if cash_limit.is_fallback() {
        f.warn(
            VatReasonCode::RuleFallback,
            format!(
                "rule {} missing; statutory cash limit {} used",
                VAT_CASH_LIMIT,
                Money::new(cash_limit.value())
            ),
        );
    }
    let cash_limit = Money::new(cash_limit.value());
    if invoice.payment_method == PaymentMethod::Cash
        && invoice.total_amount >= cash_limit
        && !invoice.has_bank_transfer_evidence
    {
        f.deny(
            VatReasonCode::CashLimitExceeded,
            format!(
                "paid {} in cash without bank transfer evidence (limit {})",
                invoice.total_amount, cash_limit
            ),
        );
    }

    // 4. Usage purpose
    match invoice.usage_purpose {
        UsagePurpose::Business => {}
        UsagePurpose::Personal => f.deny(
            VatReasonCode::PersonalUse,
            "goods are for personal use".to_string(),
        ),
        UsagePurpose::WelfareFund => match rules.optional(VAT_WELFARE_CAP) {
            None => f.warn(
                VatReasonCode::RuleMissing,
                format!("rule {} missing; welfare cap not checked", VAT_WELFARE_CAP),
            ),
            Some(cap) => {
                let cap = Money::new(cap);
                if invoice.goods_value > cap {
                    f.cap(
                        VatReasonCode::WelfareCap,
                        cap.apply_rate(rate),
                        format!("welfare goods capped at {}", cap),
                    );
                }
            }
        },
    }

    // 5. Passenger vehicle price cap
    if invoice.category == LedgerCategory::PassengerVehicle && !invoice.used_for_transport_business
    {
        match rules.optional(VAT_VEHICLE_PRICE_CAP) {
            None => f.warn(
                VatReasonCode::RuleMissing,
                format!(
                    "rule {} missing; vehicle price cap not checked",
                    VAT_VEHICLE_PRICE_CAP
                ),
            ),
            Some(cap) => {
                let cap = Money::new(cap);
                if invoice.goods_value > cap {
                    f.cap(
                        VatReasonCode::VehiclePriceCap,
                        cap.apply_rate(rate),
                        format!("vehicle value above {}; VAT deductible on {} only", cap, cap),
                    );
                }
            }
        }
    }

    // 6. Entertainment caps
    if invoice.category == LedgerCategory::Entertainment {
        let per_person = match (rules.optional(VAT_ENTERTAINMENT_PER_PERSON), invoice.attendees) {
            (Some(cap), Some(n)) if n > 0 => Some(Money::new(cap) * n),
            _ => None,
        };
        let aggregate = rules
            .optional(VAT_ENTERTAINMENT_CAP)
            .map(|cap| (Money::new(cap) - context.entertainment_to_date).clamp_non_negative());

        let allowed = match (per_person, aggregate) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        if let Some(allowed) = allowed {
            if invoice.goods_value > allowed {
                f.cap(
                    VatReasonCode::EntertainmentCap,
                    allowed.apply_rate(rate),
                    format!("entertainment deductible on {} of goods value", allowed),
                );
            }
        }
    }

    let deductible = if f.denied {
        Money::ZERO
    } else {
        f.deductible.clamp_non_negative().round_currency()
    };

    Ok(VatVerdict {
        is_deductible: deductible.is_positive(),
        deductible_amount: deductible,
        reasons: f.reasons,
    })
}

// =============================================================================
// Monthly Declaration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceVerdict {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    #[ts(as = "String")]
    pub invoice_date: NaiveDate,
    pub vat_amount: Money,
    pub verdict: VatVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VatDeclarationSummary {
    pub farm_id: String,
    #[ts(as = "String")]
    pub period: Period,
    pub invoice_count: usize,
    pub total_input_vat: Money,
    pub deductible_input_vat: Money,
    pub non_deductible_input_vat: Money,
    pub invoices: Vec<InvoiceVerdict>,
}

impl VatDeclarationSummary {
    pub fn collect(farm_id: impl Into<String>, period: Period, invoices: Vec<InvoiceVerdict>) -> Self {
        let total: Money = invoices.iter().map(|i| i.vat_amount).sum();
        let deductible: Money = invoices.iter().map(|i| i.verdict.deductible_amount).sum();

        VatDeclarationSummary {
            farm_id: farm_id.into(),
            period,
            invoice_count: invoices.len(),
            total_input_vat: total,
            deductible_input_vat: deductible,
            non_deductible_input_vat: total - deductible,
            invoices,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RuleAction, RuleType, RuleValue, TaxRule};
    use chrono::Utc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cap_rule(category: &str, value: Decimal) -> TaxRule {
        TaxRule {
            id: format!("id-{category}"),
            farm_id: "farm-1".to_string(),
            code: format!("VAT_{category}"),
            rule_type: RuleType::VatDeductible,
            category: category.to_string(),
            action: RuleAction::Cap,
            name: category.to_string(),
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

    fn snapshot() -> RuleSnapshot {
        RuleSnapshot::new(
            "farm-1",
            d(2025, 5, 10),
            vec![
                cap_rule("CASH_LIMIT", dec!(20000000)),
                cap_rule("VEHICLE_PRICE_CAP", dec!(1600000000)),
                cap_rule("WELFARE_CAP", dec!(10000000)),
                cap_rule("ENTERTAINMENT_PER_PERSON", dec!(500000)),
            ],
        )
    }

    fn invoice(goods: i64) -> VatInvoice {
        let goods = Money::from_units(goods);
        let vat = goods.apply_rate(Rate::from_percent(dec!(10)));
        VatInvoice {
            id: Some("inv-1".to_string()),
            invoice_number: Some("0000123".to_string()),
            invoice_date: d(2025, 5, 10),
            supplier_tax_code: Some("0101234567".to_string()),
            goods_value: goods,
            vat_rate: dec!(10),
            vat_amount: vat,
            total_amount: goods + vat,
            payment_method: PaymentMethod::BankTransfer,
            has_bank_transfer_evidence: true,
            usage_purpose: UsagePurpose::Business,
            category: LedgerCategory::Materials,
            used_for_transport_business: false,
            attendees: None,
        }
    }

    fn ctx() -> VatContext {
        VatContext::default()
    }

    #[test]
    fn test_clean_invoice_fully_deductible() {
        let v = validate_invoice(&invoice(10_000_000), &ctx(), &snapshot()).unwrap();
        assert!(v.is_deductible);
        assert_eq!(v.deductible_amount, Money::from_units(1_000_000));
        assert!(v.reasons.is_empty());
    }

    #[test]
    fn test_cash_over_limit_without_evidence() {
        let mut inv = invoice(22_727_273);
        inv.total_amount = Money::from_units(25_000_000);
        inv.payment_method = PaymentMethod::Cash;
        inv.has_bank_transfer_evidence = false;

        let v = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert!(!v.is_deductible);
        assert_eq!(v.deductible_amount, Money::ZERO);
        assert!(v.has_reason(VatReasonCode::CashLimitExceeded));
    }

    #[test]
    fn test_cash_with_evidence_is_fine() {
        let mut inv = invoice(25_000_000);
        inv.payment_method = PaymentMethod::Cash;
        inv.has_bank_transfer_evidence = true;
        let v = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert!(v.is_deductible);
    }

    #[test]
    fn test_cash_limit_fallback_warns() {
        let empty = RuleSnapshot::new("farm-1", d(2025, 5, 10), vec![]);
        let mut inv = invoice(23_000_000);
        inv.payment_method = PaymentMethod::Cash;
        inv.has_bank_transfer_evidence = false;
        let v = validate_invoice(&inv, &ctx(), &empty).unwrap();
        assert!(!v.is_deductible);
        assert!(v.has_reason(VatReasonCode::RuleFallback));
        assert!(v.has_reason(VatReasonCode::CashLimitExceeded));
    }

    #[test]
    fn test_closed_supplier_not_deductible() {
        let context = VatContext {
            supplier_status: SupplierStatus::Closed,
            ..ctx()
        };
        let v = validate_invoice(&invoice(1_000_000), &context, &snapshot()).unwrap();
        assert!(!v.is_deductible);
        assert!(v.has_reason(VatReasonCode::SupplierInactive));
    }

    #[test]
    fn test_checks_do_not_short_circuit() {
        let mut inv = invoice(30_000_000);
        inv.supplier_tax_code = Some("12345".to_string());
        inv.payment_method = PaymentMethod::Cash;
        inv.has_bank_transfer_evidence = false;
        inv.usage_purpose = UsagePurpose::Personal;
        let context = VatContext {
            supplier_status: SupplierStatus::Suspended,
            ..ctx()
        };

        let v = validate_invoice(&inv, &context, &snapshot()).unwrap();
        let codes: Vec<_> = v.reasons.iter().map(|r| r.code).collect();
        assert_eq!(
            codes,
            vec![
                VatReasonCode::InvalidTaxCode,
                VatReasonCode::SupplierInactive,
                VatReasonCode::CashLimitExceeded,
                VatReasonCode::PersonalUse,
            ]
        );
    }

    #[test]
    fn test_missing_tax_code() {
        let mut inv = invoice(1_000_000);
        inv.supplier_tax_code = None;
        let v = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert!(v.has_reason(VatReasonCode::MissingTaxCode));
        assert!(!v.is_deductible);
    }

    #[test]
    fn test_vehicle_price_cap() {
        let mut inv = invoice(2_000_000_000);
        inv.category = LedgerCategory::PassengerVehicle;
        let v = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert!(v.is_deductible);
        assert_eq!(v.deductible_amount, Money::from_units(160_000_000));
        assert!(v.has_reason(VatReasonCode::VehiclePriceCap));

        inv.used_for_transport_business = true;
        let v = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert_eq!(v.deductible_amount, Money::from_units(200_000_000));
    }

    #[test]
    fn test_welfare_cap_and_missing_rule() {
        let mut inv = invoice(15_000_000);
        inv.usage_purpose = UsagePurpose::WelfareFund;
        let v = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert_eq!(v.deductible_amount, Money::from_units(1_000_000));
        assert!(v.has_reason(VatReasonCode::WelfareCap));

        let empty = RuleSnapshot::new("farm-1", d(2025, 5, 10), vec![cap_rule("CASH_LIMIT", dec!(20000000))]);
        let v = validate_invoice(&inv, &ctx(), &empty).unwrap();
        assert_eq!(v.deductible_amount, Money::from_units(1_500_000));
        assert!(v.has_reason(VatReasonCode::RuleMissing));
    }

    #[test]
    fn test_entertainment_caps() {
        let mut inv = invoice(3_000_000);
        inv.category = LedgerCategory::Entertainment;
        inv.attendees = Some(4);

        // per person: 4 × 500,000 = 2,000,000 allowed
        let v = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert_eq!(v.deductible_amount, Money::from_units(200_000));
        assert!(v.has_reason(VatReasonCode::EntertainmentCap));

        // aggregate cap with 9,500,000 already used leaves 500,000
        let mut rules = snapshot().rules().to_vec();
        rules.push(cap_rule("ENTERTAINMENT_CAP", dec!(10000000)));
        let snap = RuleSnapshot::new("farm-1", d(2025, 5, 10), rules);
        let context = VatContext {
            entertainment_to_date: Money::from_units(9_500_000),
            ..ctx()
        };
        let v = validate_invoice(&inv, &context, &snap).unwrap();
        assert_eq!(v.deductible_amount, Money::from_units(50_000));
    }

    #[test]
    fn test_deterministic() {
        let inv = invoice(7_777_777);
        let a = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        let b = validate_invoice(&inv, &ctx(), &snapshot()).unwrap();
        assert_eq!(a, b);
        assert!(a.deductible_amount.is_integral());
    }

    #[test]
    fn test_declaration_totals() {
        let ok = validate_invoice(&invoice(10_000_000), &ctx(), &snapshot()).unwrap();
        let mut bad_inv = invoice(5_000_000);
        bad_inv.supplier_tax_code = None;
        let bad = validate_invoice(&bad_inv, &ctx(), &snapshot()).unwrap();

        let summary = VatDeclarationSummary::collect(
            "farm-1",
            "2025-05".parse().unwrap(),
            vec![
                InvoiceVerdict {
                    invoice_id: "a".into(),
                    invoice_number: None,
                    invoice_date: d(2025, 5, 1),
                    vat_amount: Money::from_units(1_000_000),
                    verdict: ok,
                },
                InvoiceVerdict {
                    invoice_id: "b".into(),
                    invoice_number: None,
                    invoice_date: d(2025, 5, 2),
                    vat_amount: Money::from_units(500_000),
                    verdict: bad,
                },
            ],
        );
        assert_eq!(summary.total_input_vat, Money::from_units(1_500_000));
        assert_eq!(summary.deductible_input_vat, Money::from_units(1_000_000));
        assert_eq!(summary.non_deductible_input_vat, Money::from_units(500_000));
    }
}
