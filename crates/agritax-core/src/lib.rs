//! # agritax-core: Pure Tax Logic for AgriTax
//!
//! This crate is the **heart** of the tax compliance engine. It contains the
//! rule resolution, the sync merge and all three calculators as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AgriTax Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    agritax-cli / ERP callers                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 agritax-engine (services)                       │   │
//! │  │   RuleEngine, RuleSyncService, VatService, PitService, ...     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ agritax-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  money  │ │  rules  │ │   vat   │ │   pit   │ │   cit   │  │   │
//! │  │   │ Money   │ │Snapshot │ │ Verdict │ │ Brackets│ │ Adjust. │  │   │
//! │  │   │ Rate    │ │ plan_   │ │ Reasons │ │ Batch   │ │ Losses  │  │   │
//! │  │   │         │ │  sync   │ │         │ │         │ │         │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    agritax-db (Database Layer)                  │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (TaxRule, RuleValue, Employee, LedgerTransaction)
//! - [`money`] - Decimal `Money` and `Rate` (no floating point!)
//! - [`period`] - Period parsing (`2025-03`, `2025-Q2`, `2025`) and date spans
//! - [`rules`] - Catalog, sync merge, rule snapshot resolution
//! - [`vat`] - VAT deduction validator
//! - [`pit`] - Personal income tax calculator
//! - [`cit`] - Corporate income tax calculator
//! - [`declaration`] - DRAFT → CALCULATED → FILED state machine
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same inputs + same rule snapshot = same output
//! 2. **No I/O**: the database layer hands in rows, we hand back records
//! 3. **Decimal Money**: `rust_decimal` end to end, rounded once at output
//! 4. **Explicit Errors**: configuration gaps are errors, never silent zeros
//!
//! ## Example Usage
//!
//! ```rust
//! use agritax_core::money::{Money, Rate};
//! use rust_decimal::Decimal;
//!
//! let gross = Money::from_units(10_000_000);
//! let pit = gross.apply_rate(Rate::from_percent(Decimal::from(20))).round_currency();
//!
//! assert_eq!(pit, Money::from_units(2_000_000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cit;
pub mod declaration;
pub mod error;
pub mod money;
pub mod period;
pub mod pit;
pub mod rules;
pub mod types;
pub mod validation;
pub mod vat;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use agritax_core::Money` instead of
// `use agritax_core::money::Money`

pub use declaration::{Declaration, DeclarationKind, DeclarationStatus};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use period::{DateSpan, Period, PeriodType};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Fiscal year start month for farms that never configured one.
pub const DEFAULT_FISCAL_YEAR_START_MONTH: u32 = 1;
