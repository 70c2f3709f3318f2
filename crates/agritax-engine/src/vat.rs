//! # VAT Service
//!
//! Runs the pure deduction validator with the facts it needs from storage:
//! the supplier status and rule snapshot on the invoice date, and the
//! month's entertainment spend before the invoice.
//!
//! ## Monthly Declaration
//! ```text
//! declare(farm, 2025-03)
//!   │
//!   ├── declaration FILED? ──► PeriodLocked
//!   ├── invoices of March, by (date, id)
//!   │     for each: status_on(date) + snapshot(date) + entertainment so far
//!   │               └──► validate_invoice ──► InvoiceVerdict
//!   ├── VatDeclarationSummary::collect
//!   └── declaration ──► CALCULATED
//! ```

use agritax_core::period::month_of;
use agritax_core::vat::{
    validate_invoice, InvoiceVerdict, VatContext, VatDeclarationSummary, VatInvoice, VatVerdict,
};
use agritax_core::{DeclarationKind, LedgerCategory, Money, Period, PeriodType, SupplierStatus};
use agritax_db::Database;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::engine::RuleEngine;
use crate::error::EngineResult;

#[derive(Debug, Clone)]
pub struct VatService {
    db: Database,
    rules: RuleEngine,
}

impl VatService {
    pub fn new(db: Database) -> Self {
        VatService {
            rules: RuleEngine::new(db.clone()),
            db,
        }
    }

    /// Validates one invoice against the farm's rules on its date.
    ///
    /// Entertainment already claimed in the invoice's month counts against
    /// the aggregate cap. A stored invoice only sees invoices ordered before
    /// it; an unsaved one sees every invoice up to its date.
    pub async fn validate(&self, farm_id: &str, invoice: &VatInvoice) -> EngineResult<VatVerdict> {
        let snapshot = self.rules.snapshot(farm_id, invoice.invoice_date).await?;
        let supplier_status = self.supplier_status(farm_id, invoice).await?;

        let entertainment_to_date = if invoice.category == LedgerCategory::Entertainment {
            let farm = self.db.farms().require(farm_id).await?;
            let span = month_of(invoice.invoice_date).span(farm.fiscal_year_start_month)?;
            let month = self.db.invoices().list_in_span(farm_id, span).await?;
            entertainment_before(&month, invoice)
        } else {
            Money::ZERO
        };

        let verdict = validate_invoice(
            invoice,
            &VatContext {
                supplier_status,
                entertainment_to_date,
            },
            &snapshot,
        )?;
        log_warnings(farm_id, invoice, &verdict);
        Ok(verdict)
    }

    /// Validates every purchase invoice of a month and marks the VAT
    /// declaration CALCULATED.
    pub async fn declare(&self, farm_id: &str, period: Period) -> EngineResult<VatDeclarationSummary> {
        period.expect_type(PeriodType::Monthly)?;
        let farm = self.db.farms().require(farm_id).await?;
        self.db
            .declarations()
            .ensure_unlocked(farm_id, DeclarationKind::Vat, period)
            .await?;

        let span = period.span(farm.fiscal_year_start_month)?;
        let invoices = self.db.invoices().list_in_span(farm_id, span).await?;

        let mut snapshots = HashMap::new();
        let mut entertainment = Money::ZERO;
        let mut verdicts = Vec::with_capacity(invoices.len());

        for invoice in &invoices {
            if !snapshots.contains_key(&invoice.invoice_date) {
                let snapshot = self.rules.snapshot(farm_id, invoice.invoice_date).await?;
                snapshots.insert(invoice.invoice_date, snapshot);
            }
            let Some(snapshot) = snapshots.get(&invoice.invoice_date) else {
                continue;
            };

            let context = VatContext {
                supplier_status: self.supplier_status(farm_id, invoice).await?,
                entertainment_to_date: entertainment,
            };
            let verdict = validate_invoice(invoice, &context, snapshot)?;
            log_warnings(farm_id, invoice, &verdict);

            if invoice.category == LedgerCategory::Entertainment {
                entertainment += invoice.goods_value;
            }

            verdicts.push(InvoiceVerdict {
                invoice_id: invoice.id.clone().unwrap_or_default(),
                invoice_number: invoice.invoice_number.clone(),
                invoice_date: invoice.invoice_date,
                vat_amount: invoice.vat_amount,
                verdict,
            });
        }

        let summary = VatDeclarationSummary::collect(farm_id, period, verdicts);
        self.db
            .declarations()
            .mark_calculated(farm_id, DeclarationKind::Vat, period)
            .await?;

        info!(
            farm_id,
            period = %period,
            invoices = summary.invoice_count,
            deductible = %summary.deductible_input_vat,
            non_deductible = %summary.non_deductible_input_vat,
            "VAT declaration calculated"
        );
        Ok(summary)
    }

    async fn supplier_status(&self, farm_id: &str, invoice: &VatInvoice) -> EngineResult<SupplierStatus> {
        match invoice.supplier_tax_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Ok(self
                .db
                .suppliers()
                .status_on(farm_id, code, invoice.invoice_date)
                .await?),
            _ => Ok(SupplierStatus::Active),
        }
    }
}

/// Entertainment goods value of the month's invoices ordered before `invoice`.
fn entertainment_before(month: &[VatInvoice], invoice: &VatInvoice) -> Money {
    month
        .iter()
        .filter(|other| other.category == LedgerCategory::Entertainment)
        .filter(|other| match (&invoice.id, &other.id) {
            (Some(own), Some(id)) => {
                id != own && (other.invoice_date, id.as_str()) < (invoice.invoice_date, own.as_str())
            }
            _ => other.invoice_date <= invoice.invoice_date,
        })
        .map(|other| other.goods_value)
        .sum()
}

fn log_warnings(farm_id: &str, invoice: &VatInvoice, verdict: &VatVerdict) {
    for reason in verdict.reasons.iter().filter(|r| r.code.is_warning()) {
        warn!(
            farm_id,
            invoice_date = %invoice.invoice_date,
            code = ?reason.code,
            "{}",
            reason.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog, engine_with_farm, FARM};
    use agritax_core::vat::VatReasonCode;
    use agritax_core::{CoreError, DeclarationStatus, PaymentMethod, Supplier, UsagePurpose};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const GOOD_SUPPLIER: &str = "0101234567";

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn invoice(date: NaiveDate, goods: i64) -> VatInvoice {
        let goods_value = Money::from_units(goods);
        let vat_amount = Money::from_units(goods / 10);
        VatInvoice {
            id: None,
            invoice_number: None,
            invoice_date: date,
            supplier_tax_code: Some(GOOD_SUPPLIER.into()),
            goods_value,
            vat_rate: dec!(10),
            vat_amount,
            total_amount: goods_value + vat_amount,
            payment_method: PaymentMethod::BankTransfer,
            has_bank_transfer_evidence: true,
            usage_purpose: UsagePurpose::Business,
            category: LedgerCategory::Materials,
            used_for_transport_business: false,
            attendees: None,
        }
    }

    #[tokio::test]
    async fn test_cash_over_limit_is_not_deductible() {
        let engine = engine_with_farm().await;
        engine.sync().apply(FARM, &catalog()).await.unwrap();

        let mut inv = invoice(day(3, 5), 22_727_273);
        inv.total_amount = Money::from_units(25_000_000);
        inv.payment_method = PaymentMethod::Cash;
        inv.has_bank_transfer_evidence = false;

        let verdict = engine.vat().validate(FARM, &inv).await.unwrap();
        assert!(!verdict.is_deductible);
        assert!(verdict.has_reason(VatReasonCode::CashLimitExceeded));
    }

    #[tokio::test]
    async fn test_supplier_closed_on_invoice_date() {
        let engine = engine_with_farm().await;
        engine.sync().apply(FARM, &catalog()).await.unwrap();
        let db = engine.db();
        db.suppliers()
            .insert(&Supplier {
                id: "s1".into(),
                farm_id: FARM.into(),
                name: "Closed Co".into(),
                tax_code: Some(GOOD_SUPPLIER.into()),
            })
            .await
            .unwrap();
        db.suppliers().record_status("s1", SupplierStatus::Closed, day(3, 10)).await.unwrap();

        let before = engine.vat().validate(FARM, &invoice(day(3, 9), 1_000_000)).await.unwrap();
        assert!(before.is_deductible);
        assert_eq!(before.deductible_amount, Money::from_units(100_000));

        let after = engine.vat().validate(FARM, &invoice(day(3, 10), 1_000_000)).await.unwrap();
        assert!(!after.is_deductible);
        assert!(after.has_reason(VatReasonCode::SupplierInactive));
    }

    #[tokio::test]
    async fn test_missing_cash_limit_rule_falls_back_with_warning() {
        let engine = engine_with_farm().await;
        engine.sync().apply(FARM, &catalog()).await.unwrap();
        let rule = engine.db().rules().get_by_code(FARM, "VAT_CASH_LIMIT").await.unwrap().unwrap();
        engine.sync().set_active(FARM, &rule.id, false).await.unwrap();

        let verdict = engine.vat().validate(FARM, &invoice(day(3, 5), 1_000_000)).await.unwrap();
        assert!(verdict.is_deductible);
        assert!(verdict.has_reason(VatReasonCode::RuleFallback));
    }

    #[tokio::test]
    async fn test_declare_caps_month_entertainment_and_locks() {
        let engine = engine_with_farm().await;
        engine.sync().apply(FARM, &catalog()).await.unwrap();
        let db = engine.db();

        // Monthly aggregate cap is 50M of goods value
        for (n, d) in [(1u32, 3u32), (2, 20)] {
            let mut e = invoice(day(3, d), 40_000_000);
            e.id = Some(format!("inv-{n}"));
            e.category = LedgerCategory::Entertainment;
            db.invoices().insert(FARM, &e).await.unwrap();
        }
        db.invoices().insert(FARM, &invoice(day(4, 1), 5_000_000)).await.unwrap();

        let period: Period = "2025-03".parse().unwrap();
        let summary = engine.vat().declare(FARM, period).await.unwrap();

        assert_eq!(summary.invoice_count, 2);
        assert_eq!(summary.total_input_vat, Money::from_units(8_000_000));
        let second = &summary.invoices[1].verdict;
        assert!(second.has_reason(VatReasonCode::EntertainmentCap));
        assert_eq!(second.deductible_amount, Money::from_units(1_000_000));
        assert_eq!(summary.deductible_input_vat, Money::from_units(5_000_000));

        // Standalone validation of the stored second invoice agrees
        let stored = db.invoices().list_in_span(FARM, period.span(1).unwrap()).await.unwrap();
        let again = engine.vat().validate(FARM, &stored[1]).await.unwrap();
        assert_eq!(&again, second);

        let declaration = db.declarations().get(FARM, DeclarationKind::Vat, period).await.unwrap();
        assert_eq!(declaration.status, DeclarationStatus::Calculated);

        db.declarations().mark_filed(FARM, DeclarationKind::Vat, period).await.unwrap();
        let err = engine.vat().declare(FARM, period).await.unwrap_err();
        assert!(matches!(err, crate::EngineError::Core(CoreError::PeriodLocked { .. })));
    }

    #[tokio::test]
    async fn test_declare_rejects_quarter() {
        let engine = engine_with_farm().await;
        let err = engine.vat().declare(FARM, "2025-Q1".parse().unwrap()).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
