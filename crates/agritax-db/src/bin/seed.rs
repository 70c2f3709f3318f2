//! # Demo Farm Seeder
//!
//! Populates a database with one demo farm for development: synced rules,
//! a small workforce with payroll, a year of ledger entries, suppliers and
//! purchase invoices.
//!
//! ## Usage
//! ```bash
//! # Seed ./agritax_dev.db with the default catalog
//! cargo run -p agritax-db --bin seed
//!
//! # Specify database, catalog and farm id
//! cargo run -p agritax-db --bin seed -- --db ./data/agritax.db --catalog catalog/default.toml --farm demo
//! ```
//!
//! ## Generated Data
//! - Farm "Green Valley Cooperative", calendar fiscal year
//! - Every catalog rule, merged via sync
//! - Three employees (progressive, flat-rate contract, non-resident)
//! - Monthly payroll for 2025
//! - Quarterly revenue and expenses, including entertainment, penalties
//!   and machinery depreciation
//! - Two suppliers, one suspended mid-year, and a handful of invoices

use agritax_core::rules::RuleCatalog;
use agritax_core::vat::VatInvoice;
use agritax_core::{
    ContractType, Employee, Farm, LedgerCategory, LedgerTransaction, Money, PaymentMethod,
    PayrollEntry, Period, Residency, Supplier, SupplierStatus, TransactionKind, UsagePurpose,
};
use agritax_db::{Database, DbConfig};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::env;

const YEAR: i32 = 2025;
const ACTIVE_SUPPLIER: &str = "0101234567";
const SUSPENDED_SUPPLIER: &str = "0309876543";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./agritax_dev.db");
    let mut catalog_path = String::from("catalog/default.toml");
    let mut farm_id = String::from("demo-farm");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--catalog" | "-c" => {
                if i + 1 < args.len() {
                    catalog_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--farm" | "-f" => {
                if i + 1 < args.len() {
                    farm_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("AgriTax Demo Farm Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>         Database file path (default: ./agritax_dev.db)");
                println!("  -c, --catalog <PATH>    Rule catalog TOML (default: catalog/default.toml)");
                println!("  -f, --farm <ID>         Farm id to create (default: demo-farm)");
                println!("  -h, --help              Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 AgriTax Demo Farm Seeder");
    println!("===========================");
    println!("Database: {}", db_path);
    println!("Catalog:  {}", catalog_path);
    println!("Farm:     {}", farm_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.farms().get(&farm_id).await?.is_some() {
        println!("⚠ Farm {} already exists", farm_id);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    db.farms()
        .insert(&Farm {
            id: farm_id.clone(),
            name: "Green Valley Cooperative".to_string(),
            fiscal_year_start_month: 1,
        })
        .await?;
    println!("✓ Created farm");

    let catalog = RuleCatalog::from_toml_str(&std::fs::read_to_string(&catalog_path)?)?;
    let plan = db.rules().apply_sync(&farm_id, &catalog).await?;
    println!(
        "✓ Synced catalog {}: {} created, {} updated",
        catalog.version,
        plan.creates.len(),
        plan.updates.len()
    );

    seed_employees(&db, &farm_id).await?;
    seed_ledger(&db, &farm_id).await?;
    seed_invoices(&db, &farm_id).await?;

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

async fn seed_employees(db: &Database, farm_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let staff = [
        ("emp-001", "Nguyen Van An", Residency::Resident, ContractType::Standard, 2, 25_000_000),
        ("emp-002", "Tran Thi Binh", Residency::Resident, ContractType::FlatRate, 0, 6_000_000),
        ("emp-003", "Lars Eriksen", Residency::NonResident, ContractType::Standard, 0, 60_000_000),
    ];

    for (id, name, residency, contract_type, dependents, gross) in staff {
        db.employees()
            .insert(&Employee {
                id: id.to_string(),
                farm_id: farm_id.to_string(),
                full_name: name.to_string(),
                tax_code: None,
                residency,
                contract_type,
                dependents_count: dependents,
                insurance_base: (contract_type == ContractType::Standard).then(|| Money::from_units(gross)),
                is_active: true,
            })
            .await?;

        for month in 1..=12 {
            db.employees()
                .upsert_payroll(&PayrollEntry {
                    farm_id: farm_id.to_string(),
                    employee_id: id.to_string(),
                    period: Period::Month { year: YEAR, month },
                    gross_income: Money::from_units(gross),
                    dependents_count: None,
                    other_deduction: None,
                    insurance_deduction: None,
                })
                .await?;
        }
    }

    println!("✓ Created {} employees with 12 months of payroll", staff.len());
    Ok(())
}

async fn seed_ledger(db: &Database, farm_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut count = 0;
    for quarter in 0..4u32 {
        let month = quarter * 3 + 2;
        let entries = [
            (TransactionKind::Revenue, LedgerCategory::Sales, 900_000_000, PaymentMethod::BankTransfer, None),
            (TransactionKind::Revenue, LedgerCategory::ExemptIncome, 120_000_000, PaymentMethod::BankTransfer, None),
            (TransactionKind::Expense, LedgerCategory::Materials, 310_000_000, PaymentMethod::BankTransfer, None),
            (TransactionKind::Expense, LedgerCategory::Wages, 273_000_000, PaymentMethod::BankTransfer, None),
            (TransactionKind::Expense, LedgerCategory::Entertainment, 65_000_000, PaymentMethod::Card, None),
            (TransactionKind::Expense, LedgerCategory::Materials, 25_000_000, PaymentMethod::Cash, None),
            (TransactionKind::Expense, LedgerCategory::CasualWages, 18_000_000, PaymentMethod::Cash, None),
            (
                TransactionKind::Expense,
                LedgerCategory::Depreciation,
                80_000_000,
                PaymentMethod::Other,
                Some(("MACHINERY", 1_200_000_000)),
            ),
        ];

        for (seq, (kind, category, amount, payment_method, asset)) in entries.into_iter().enumerate() {
            count += 1;
            db.ledger()
                .insert(&LedgerTransaction {
                    id: format!("txn-{}-q{}-{:02}", YEAR, quarter + 1, seq),
                    farm_id: farm_id.to_string(),
                    txn_date: date(month, 10 + seq as u32),
                    kind,
                    category,
                    amount: Money::from_units(amount),
                    payment_method,
                    has_bank_transfer_evidence: payment_method == PaymentMethod::BankTransfer,
                    pit_withheld: false,
                    asset_category: asset.map(|(c, _)| c.to_string()),
                    asset_cost: asset.map(|(_, cost)| Money::from_units(cost)),
                    description: None,
                    lines: Vec::new(),
                })
                .await?;
        }

        if quarter == 2 {
            count += 1;
            db.ledger()
                .insert(&LedgerTransaction {
                    id: format!("txn-{}-penalty", YEAR),
                    farm_id: farm_id.to_string(),
                    txn_date: date(month, 25),
                    kind: TransactionKind::Expense,
                    category: LedgerCategory::AdminPenalty,
                    amount: Money::from_units(15_000_000),
                    payment_method: PaymentMethod::BankTransfer,
                    has_bank_transfer_evidence: true,
                    pit_withheld: false,
                    asset_category: None,
                    asset_cost: None,
                    description: Some("late environmental filing".to_string()),
                    lines: Vec::new(),
                })
                .await?;
        }
    }

    println!("✓ Created {} ledger transactions", count);
    Ok(())
}

async fn seed_invoices(db: &Database, farm_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    for (id, name, tax_code) in [
        ("sup-001", "Mekong Fertilizer JSC", ACTIVE_SUPPLIER),
        ("sup-002", "Delta Machinery Co", SUSPENDED_SUPPLIER),
    ] {
        db.suppliers()
            .insert(&Supplier {
                id: id.to_string(),
                farm_id: farm_id.to_string(),
                name: name.to_string(),
                tax_code: Some(tax_code.to_string()),
            })
            .await?;
    }
    db.suppliers()
        .record_status("sup-002", SupplierStatus::Suspended, date(3, 15))
        .await?;
    println!("✓ Created 2 suppliers (one suspended from {}-03-15)", YEAR);

    let invoices = [
        ("INV-0001", date(3, 2), ACTIVE_SUPPLIER, 150_000_000, PaymentMethod::BankTransfer, LedgerCategory::Materials, UsagePurpose::Business, None),
        ("INV-0002", date(3, 9), ACTIVE_SUPPLIER, 30_000_000, PaymentMethod::Cash, LedgerCategory::Materials, UsagePurpose::Business, None),
        ("INV-0003", date(3, 12), ACTIVE_SUPPLIER, 12_000_000, PaymentMethod::Card, LedgerCategory::Entertainment, UsagePurpose::Business, Some(8)),
        ("INV-0004", date(3, 20), SUSPENDED_SUPPLIER, 80_000_000, PaymentMethod::BankTransfer, LedgerCategory::Materials, UsagePurpose::Business, None),
        ("INV-0005", date(3, 28), ACTIVE_SUPPLIER, 4_000_000, PaymentMethod::BankTransfer, LedgerCategory::Other, UsagePurpose::Personal, None),
    ];

    for (number, invoice_date, supplier, goods, payment_method, category, usage_purpose, attendees) in invoices {
        let goods_value = Money::from_units(goods);
        let vat_amount = Money::from_units(goods / 10);
        db.invoices()
            .insert(
                farm_id,
                &VatInvoice {
                    id: None,
                    invoice_number: Some(number.to_string()),
                    invoice_date,
                    supplier_tax_code: Some(supplier.to_string()),
                    goods_value,
                    vat_rate: Decimal::TEN,
                    vat_amount,
                    total_amount: goods_value + vat_amount,
                    payment_method,
                    has_bank_transfer_evidence: payment_method == PaymentMethod::BankTransfer,
                    usage_purpose,
                    category,
                    used_for_transport_business: false,
                    attendees,
                },
            )
            .await?;
    }
    println!("✓ Created {} purchase invoices for {}-03", invoices.len(), YEAR);
    Ok(())
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(YEAR, month, day).unwrap_or_default()
}
