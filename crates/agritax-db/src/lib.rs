//! # agritax-db: Database Layer for AgriTax
//!
//! SQLite persistence for tax rules, the books the calculators read, and
//! the results they write. Built on sqlx with async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AgriTax Data Flow                                │
//! │                                                                         │
//! │  agritax-engine service (RuleSyncService, PitService, ...)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    agritax-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │   (rule.rs)   │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ RuleRepo      │    │ 001 rules    │  │   │
//! │  │   │ Connection    │◄───│ LedgerRepo    │    │ 002 books    │  │   │
//! │  │   │ Management    │    │ CitResultRepo │    │ 003 results  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/agritax/agritax.db                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (rules, books, results)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agritax_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/agritax.db")).await?;
//!
//! let plan = db.rules().apply_sync("farm-1", &catalog).await?;
//! let rules = db.rules().list_effective("farm-1", as_of).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

mod codec;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    CitResultRepository, DeclarationRepository, EmployeeRepository, FarmRepository,
    InvoiceRepository, LedgerRepository, PitResultRepository, RuleRepository, SupplierRepository,
};
