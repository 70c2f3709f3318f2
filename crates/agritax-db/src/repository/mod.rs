//! # Repository Module
//!
//! Database repository implementations for AgriTax.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  agritax-engine service                                                │
//! │       │                                                                 │
//! │       │  db.rules().update_value(farm, rule, value, user)              │
//! │       ▼                                                                 │
//! │  RuleRepository                                                        │
//! │  ├── list / list_effective / get / get_by_code                         │
//! │  ├── preview_sync / apply_sync                                         │
//! │  ├── update_value / reset_override   (rule row + history, atomic)      │
//! │  └── create_custom / set_active / history                              │
//! │       │                                                                 │
//! │       │  SQL, one transaction per write                                │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Every query is scoped by farm_id: a row of another farm is            │
//! │  indistinguishable from a missing row.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`FarmRepository`] - Tenants
//! - [`RuleRepository`] - Tax rules, overrides, sync, audit history
//! - [`EmployeeRepository`] - Workers and payroll gross figures
//! - [`LedgerRepository`] - Transactions and line items
//! - [`SupplierRepository`] - Suppliers and dated status changes
//! - [`InvoiceRepository`] - Purchase invoices
//! - [`PitResultRepository`] - Stored PIT results
//! - [`CitResultRepository`] - Stored CIT results and the loss ledger
//! - [`DeclarationRepository`] - Declaration status per period

pub mod cit_result;
pub mod declaration;
pub mod employee;
pub mod farm;
pub mod invoice;
pub mod ledger;
pub mod pit_result;
pub mod rule;
pub mod supplier;

pub use cit_result::CitResultRepository;
pub use declaration::DeclarationRepository;
pub use employee::EmployeeRepository;
pub use farm::FarmRepository;
pub use invoice::InvoiceRepository;
pub use ledger::LedgerRepository;
pub use pit_result::PitResultRepository;
pub use rule::RuleRepository;
pub use supplier::SupplierRepository;
