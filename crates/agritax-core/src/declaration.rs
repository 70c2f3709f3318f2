//! # Declaration State Machine
//!
//! ```text
//!            calculate             file
//!   DRAFT ─────────────► CALCULATED ──────► FILED
//!                          │    ▲              │
//!                          └────┘              │
//!                        recalculate           │
//!                              ▲    unlock     │
//!                              └───────────────┘
//! ```
//!
//! Recalculating a FILED period is rejected with `PeriodLocked`; the only
//! way back is an explicit unlock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::period::Period;
use crate::types::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum DeclarationKind {
    Vat,
    Pit,
    Cit,
}

text_enum!(DeclarationKind, "kind", {
    Vat => "VAT",
    Pit => "PIT",
    Cit => "CIT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum DeclarationStatus {
    #[default]
    Draft,
    Calculated,
    Filed,
}

text_enum!(DeclarationStatus, "status", {
    Draft => "DRAFT",
    Calculated => "CALCULATED",
    Filed => "FILED",
});

/// One tax declaration for a farm and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Declaration {
    pub farm_id: String,
    pub kind: DeclarationKind,
    #[ts(as = "String")]
    pub period: Period,
    pub status: DeclarationStatus,
    #[ts(as = "Option<String>")]
    pub calculated_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub filed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Declaration {
    pub fn draft(farm_id: impl Into<String>, kind: DeclarationKind, period: Period, now: DateTime<Utc>) -> Self {
        Declaration {
            farm_id: farm_id.into(),
            kind,
            period,
            status: DeclarationStatus::Draft,
            calculated_at: None,
            filed_at: None,
            updated_at: now,
        }
    }

    /// Fails with `PeriodLocked` when the declaration is filed.
    pub fn ensure_unlocked(&self) -> CoreResult<()> {
        if self.status == DeclarationStatus::Filed {
            return Err(CoreError::PeriodLocked {
                kind: self.kind.to_string(),
                period: self.period.to_string(),
            });
        }
        Ok(())
    }

    /// DRAFT | CALCULATED → CALCULATED.
    pub fn mark_calculated(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_unlocked()?;
        self.status = DeclarationStatus::Calculated;
        self.calculated_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// CALCULATED → FILED.
    pub fn mark_filed(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != DeclarationStatus::Calculated {
            return Err(self.invalid(DeclarationStatus::Filed));
        }
        self.status = DeclarationStatus::Filed;
        self.filed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// FILED → CALCULATED.
    pub fn unlock(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != DeclarationStatus::Filed {
            return Err(self.invalid(DeclarationStatus::Calculated));
        }
        self.status = DeclarationStatus::Calculated;
        self.filed_at = None;
        self.updated_at = now;
        Ok(())
    }

    fn invalid(&self, to: DeclarationStatus) -> CoreError {
        CoreError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
