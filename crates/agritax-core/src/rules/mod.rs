//! # Rules
//!
//! Everything about tax rules that can be decided without a database.
//!
//! ## Module Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  catalog.rs   RuleCatalog ◄── TOML / JSON (versioned canonical list)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sync.rs      plan_sync(catalog × farm rows) ──► SyncPlan              │
//! │                                     creates / updates / skips           │
//! │                                                                         │
//! │  keys.rs      RuleQuery + well-known (rule_type, category) keys        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  snapshot.rs  RuleSnapshot (farm, as_of) ──► value / optional /        │
//! │                                              value_or / brackets        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod keys;
pub mod snapshot;
pub mod sync;

pub use catalog::{CatalogEntry, RuleCatalog};
pub use keys::{RuleQuery, RuleSelector};
pub use snapshot::{Resolved, RuleSnapshot};
pub use sync::{plan_sync, RuleSkip, RuleUpdate, SyncPlan, SyncSummary};
