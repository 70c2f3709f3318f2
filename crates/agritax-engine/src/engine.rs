//! # Rule Engine
//!
//! Answers "what is the value of rule X for farm F on date D".
//!
//! ## Snapshot Per Call
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  snapshot(farm, as_of)                                                 │
//! │       │                                                                 │
//! │       │  SELECT active rules, effective_from <= as_of, farm only       │
//! │       ▼                                                                 │
//! │  RuleSnapshot (immutable, owned by the caller)                         │
//! │       │                                                                 │
//! │       ├── resolve(query): highest priority, then latest effective_from │
//! │       └── handed to exactly one calculation, then dropped              │
//! │                                                                         │
//! │  No process-wide cache: an override committed for farm A is visible  │
//! │  to the next call and never leaks into an in-flight call for farm B.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use agritax_core::rules::{RuleQuery, RuleSelector, RuleSnapshot};
use agritax_db::Database;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineResult;

/// A resolved rule value and the row it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleValueAnswer {
    pub farm_id: String,
    pub query: String,
    pub as_of: NaiveDate,
    pub rule_id: String,
    pub code: String,
    pub value: Decimal,
    pub is_overridden: bool,
    pub effective_from: NaiveDate,
    pub priority: i32,
}

/// Read-only access to a farm's effective rules.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    db: Database,
}

impl RuleEngine {
    pub fn new(db: Database) -> Self {
        RuleEngine { db }
    }

    /// Loads an immutable snapshot of the farm's rules as of a date.
    ///
    /// ## Errors
    /// `NotFound` when the farm does not exist.
    pub async fn snapshot(&self, farm_id: &str, as_of: NaiveDate) -> EngineResult<RuleSnapshot> {
        self.db.farms().require(farm_id).await?;
        let rules = self.db.rules().list_effective(farm_id, as_of).await?;
        debug!(farm_id, %as_of, rules = rules.len(), "Rule snapshot taken");
        Ok(RuleSnapshot::new(farm_id, as_of, rules))
    }

    /// Resolves a single rule value.
    ///
    /// ## Errors
    /// `Configuration` when no active rule matches: a missing rule is never
    /// reported as zero.
    pub async fn get_rule_value(
        &self,
        farm_id: &str,
        selector: &RuleSelector,
        as_of: NaiveDate,
    ) -> EngineResult<RuleValueAnswer> {
        let snapshot = self.snapshot(farm_id, as_of).await?;
        answer(&snapshot, selector.as_query())
    }
}

fn answer(snapshot: &RuleSnapshot, query: RuleQuery<'_>) -> EngineResult<RuleValueAnswer> {
    // value() raises the Configuration error for a missing rule
    let value = snapshot.value(query)?;
    let rule = snapshot
        .resolve(query)
        .ok_or_else(|| crate::EngineError::Internal(format!("rule {} vanished from snapshot", query)))?;

    Ok(RuleValueAnswer {
        farm_id: snapshot.farm_id().to_string(),
        query: query.to_string(),
        as_of: snapshot.as_of(),
        rule_id: rule.id.clone(),
        code: rule.code.clone(),
        value,
        is_overridden: rule.value.is_overridden,
        effective_from: rule.effective_from,
        priority: rule.priority,
    })
}
