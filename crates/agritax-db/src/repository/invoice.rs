//! # Purchase Invoice Repository
//!
//! Input-VAT invoices, stored with exactly the attributes the VAT
//! validator looks at.

use agritax_core::vat::VatInvoice;
use agritax_core::{DateSpan, LedgerCategory, PaymentMethod, UsagePurpose};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{decode_count, decode_decimal, decode_money, encode_decimal, encode_money};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: Option<String>,
    invoice_date: NaiveDate,
    supplier_tax_code: Option<String>,
    goods_value: String,
    vat_rate: String,
    vat_amount: String,
    total_amount: String,
    payment_method: PaymentMethod,
    has_bank_transfer_evidence: bool,
    usage_purpose: UsagePurpose,
    category: LedgerCategory,
    used_for_transport_business: bool,
    attendees: Option<i64>,
}

impl TryFrom<InvoiceRow> for VatInvoice {
    type Error = DbError;

    fn try_from(row: InvoiceRow) -> DbResult<Self> {
        Ok(VatInvoice {
            goods_value: decode_money("purchase_invoices.goods_value", &row.goods_value)?,
            vat_rate: decode_decimal("purchase_invoices.vat_rate", &row.vat_rate)?,
            vat_amount: decode_money("purchase_invoices.vat_amount", &row.vat_amount)?,
            total_amount: decode_money("purchase_invoices.total_amount", &row.total_amount)?,
            attendees: row
                .attendees
                .map(|n| decode_count("purchase_invoices.attendees", n))
                .transpose()?,
            id: Some(row.id),
            invoice_number: row.invoice_number,
            invoice_date: row.invoice_date,
            supplier_tax_code: row.supplier_tax_code,
            payment_method: row.payment_method,
            has_bank_transfer_evidence: row.has_bank_transfer_evidence,
            usage_purpose: row.usage_purpose,
            category: row.category,
            used_for_transport_business: row.used_for_transport_business,
        })
    }
}

/// Repository for purchase invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Stores an invoice and returns its id (generated when absent).
    pub async fn insert(&self, farm_id: &str, invoice: &VatInvoice) -> DbResult<String> {
        let id = invoice
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        debug!(farm_id, invoice_id = %id, date = %invoice.invoice_date, "Inserting purchase invoice");

        sqlx::query(
            "INSERT INTO purchase_invoices (id, farm_id, invoice_number, invoice_date, \
                 supplier_tax_code, goods_value, vat_rate, vat_amount, total_amount, \
                 payment_method, has_bank_transfer_evidence, usage_purpose, category, \
                 used_for_transport_business, attendees) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(&id)
        .bind(farm_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .bind(&invoice.supplier_tax_code)
        .bind(encode_money(invoice.goods_value))
        .bind(encode_decimal(invoice.vat_rate))
        .bind(encode_money(invoice.vat_amount))
        .bind(encode_money(invoice.total_amount))
        .bind(invoice.payment_method)
        .bind(invoice.has_bank_transfer_evidence)
        .bind(invoice.usage_purpose)
        .bind(invoice.category)
        .bind(invoice.used_for_transport_business)
        .bind(invoice.attendees.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Invoices dated within the span, ordered by date then id.
    pub async fn list_in_span(&self, farm_id: &str, span: DateSpan) -> DbResult<Vec<VatInvoice>> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(
            "SELECT id, invoice_number, invoice_date, supplier_tax_code, goods_value, vat_rate, \
                    vat_amount, total_amount, payment_method, has_bank_transfer_evidence, \
                    usage_purpose, category, used_for_transport_business, attendees \
             FROM purchase_invoices \
             WHERE farm_id = ?1 AND invoice_date BETWEEN ?2 AND ?3 \
             ORDER BY invoice_date, id",
        )
        .bind(farm_id)
        .bind(span.start)
        .bind(span.end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VatInvoice::try_from).collect()
    }
}
