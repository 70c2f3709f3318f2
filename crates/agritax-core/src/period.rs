//! # Tax Periods
//!
//! Parsing and date-span resolution for declaration periods.
//!
//! ## Formats
//! ```text
//! ┌──────────────┬────────────┬──────────────────────────────────────────┐
//! │ Kind         │ Text       │ Span                                     │
//! ├──────────────┼────────────┼──────────────────────────────────────────┤
//! │ Monthly      │ 2025-03    │ 2025-03-01 ..= 2025-03-31                │
//! │ Quarterly    │ 2025-Q2    │ 2025-04-01 ..= 2025-06-30 (calendar)     │
//! │ Annual       │ 2025       │ fiscal year starting in 2025 at the      │
//! │              │            │ farm's fiscal_year_start_month           │
//! └──────────────┴────────────┴──────────────────────────────────────────┘
//! ```

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::text_enum;

/// Declaration cadence for CIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Annual,
}

text_enum!(PeriodType, "period_type", {
    Monthly => "MONTHLY",
    Quarterly => "QUARTERLY",
    Annual => "ANNUAL",
});

/// A parsed tax period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
    Year { year: i32 },
}

/// The inclusive date range a period covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl Period {
    pub fn period_type(&self) -> PeriodType {
        match self {
            Period::Month { .. } => PeriodType::Monthly,
            Period::Quarter { .. } => PeriodType::Quarterly,
            Period::Year { .. } => PeriodType::Annual,
        }
    }

    /// The year label of the period (fiscal year label for annual periods).
    pub fn year(&self) -> i32 {
        match *self {
            Period::Month { year, .. } | Period::Quarter { year, .. } | Period::Year { year } => year,
        }
    }

    /// Label of the fiscal year the period starts in.
    ///
    /// Months and quarters are calendar based, so with a July fiscal start
    /// `2025-Q1` and `2025-03` belong to fiscal year 2024.
    pub fn fiscal_year(&self, fiscal_year_start_month: u32) -> i32 {
        match *self {
            Period::Year { year } => year,
            Period::Month { year, month } => fiscal_label(year, month, fiscal_year_start_month),
            Period::Quarter { year, quarter } => fiscal_label(year, (quarter - 1) * 3 + 1, fiscal_year_start_month),
        }
    }

    /// Number of calendar months covered.
    pub fn months(&self) -> u32 {
        match self {
            Period::Month { .. } => 1,
            Period::Quarter { .. } => 3,
            Period::Year { .. } => 12,
        }
    }

    /// Resolves the period to its date range.
    ///
    /// `fiscal_year_start_month` only affects annual periods.
    pub fn span(&self, fiscal_year_start_month: u32) -> Result<DateSpan, ValidationError> {
        let (year, month) = match *self {
            Period::Month { year, month } => (year, month),
            Period::Quarter { year, quarter } => (year, (quarter - 1) * 3 + 1),
            Period::Year { year } => {
                if !(1..=12).contains(&fiscal_year_start_month) {
                    return Err(ValidationError::OutOfRange {
                        field: "fiscal_year_start_month".to_string(),
                        min: 1,
                        max: 12,
                    });
                }
                (year, fiscal_year_start_month)
            }
        };

        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| invalid(self))?;
        let end = start
            .checked_add_months(Months::new(self.months()))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| invalid(self))?;

        Ok(DateSpan { start, end })
    }

    /// Checks the period against the declared cadence.
    pub fn expect_type(&self, expected: PeriodType) -> Result<(), ValidationError> {
        if self.period_type() == expected {
            Ok(())
        } else {
            Err(ValidationError::InvalidFormat {
                field: "period".to_string(),
                reason: format!(
                    "'{}' is a {} period, expected {}",
                    self,
                    self.period_type(),
                    expected
                ),
            })
        }
    }
}

fn fiscal_label(year: i32, start_month: u32, fiscal_year_start_month: u32) -> i32 {
    if start_month < fiscal_year_start_month {
        year - 1
    } else {
        year
    }
}

fn invalid(period: &Period) -> ValidationError {
    ValidationError::InvalidFormat {
        field: "period".to_string(),
        reason: format!("'{}' does not map to a calendar range", period),
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Period::Quarter { year, quarter } => write!(f, "{:04}-Q{}", year, quarter),
            Period::Year { year } => write!(f, "{:04}", year),
        }
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let bad = |reason: &str| ValidationError::InvalidFormat {
            field: "period".to_string(),
            reason: format!("'{}': {} (expected YYYY, YYYY-MM or YYYY-Qn)", text, reason),
        };

        if text.is_empty() {
            return Err(ValidationError::Required {
                field: "period".to_string(),
            });
        }

        let (year_part, rest) = match text.split_once('-') {
            Some((y, r)) => (y, Some(r)),
            None => (text, None),
        };

        if year_part.len() != 4 || !year_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad("year must be four digits"));
        }
        let year: i32 = year_part.parse().map_err(|_| bad("year is not a number"))?;

        match rest {
            None => Ok(Period::Year { year }),
            Some(r) if r.starts_with('Q') || r.starts_with('q') => {
                let quarter: u32 = r[1..].parse().map_err(|_| bad("quarter is not a number"))?;
                if !(1..=4).contains(&quarter) || r.len() != 2 {
                    return Err(bad("quarter must be Q1..Q4"));
                }
                Ok(Period::Quarter { year, quarter })
            }
            Some(r) => {
                if r.len() != 2 || !r.chars().all(|c| c.is_ascii_digit()) {
                    return Err(bad("month must be two digits"));
                }
                let month: u32 = r.parse().map_err(|_| bad("month is not a number"))?;
                if !(1..=12).contains(&month) {
                    return Err(bad("month must be 01..12"));
                }
                Ok(Period::Month { year, month })
            }
        }
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// The calendar month containing `date`, as a monthly period.
pub fn month_of(date: NaiveDate) -> Period {
    Period::Month {
        year: date.year(),
        month: date.month(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
