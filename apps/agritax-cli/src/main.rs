//! # AgriTax CLI Entry Point
//!
//! One subcommand per engine operation. Results go to stdout as pretty
//! JSON; logs go to stderr.
//!
//! ## Exit Codes
//! ```text
//! 0  success
//! 1  configuration, database or internal failure
//! 2  caller error (VALIDATION_ERROR, NOT_FOUND, PERIOD_LOCKED)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use agritax_core::pit::PitInput;
use agritax_core::rules::RuleSelector;
use agritax_core::vat::VatInvoice;
use agritax_core::{DeclarationKind, Money, Period, RuleType, ValidationError};
use agritax_engine::{load_catalog, EngineConfig, EngineError, LogFormat, TaxEngine};
use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Tax compliance rule engine for farm accounting.
#[derive(Parser, Debug)]
#[command(name = "agritax", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge the rule catalog into a farm's rules.
    SyncRules {
        #[arg(long)]
        farm: String,
        /// Catalog file; defaults to catalog.path from the config.
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Show what would change without writing.
        #[arg(long)]
        preview: bool,
    },
    /// Set a farm-specific value for a rule.
    Override {
        #[arg(long)]
        farm: String,
        /// Rule code, e.g. VAT_CASH_LIMIT.
        #[arg(long)]
        rule: String,
        #[arg(long)]
        value: Decimal,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Drop an override and return to the catalog value.
    Reset {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        rule: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Resolve one rule value as of a date.
    RuleValue {
        #[arg(long)]
        farm: String,
        #[arg(long, conflicts_with_all = ["rule_type", "category"])]
        code: Option<String>,
        #[arg(long = "type", requires = "category")]
        rule_type: Option<RuleType>,
        #[arg(long, requires = "rule_type")]
        category: Option<String>,
        /// Defaults to today.
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// PIT for one employee and month.
    Pit {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        employee: String,
        /// YYYY-MM
        #[arg(long)]
        period: Period,
        #[arg(long)]
        gross: Money,
        #[arg(long)]
        dependents: Option<u32>,
        #[arg(long)]
        other: Option<Money>,
        #[arg(long)]
        insurance: Option<Money>,
    },
    /// PIT for every payroll entry of a month.
    PitBatch {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        period: Period,
    },
    /// CIT for a quarter (YYYY-Qn) or fiscal year (YYYY).
    Cit {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        period: Period,
    },
    /// Validate one purchase invoice given as a JSON file.
    Vat {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        invoice: PathBuf,
    },
    /// Validate every invoice of a month.
    VatDeclare {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        period: Period,
    },
    /// Show a declaration's status.
    Status {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        kind: DeclarationKind,
        #[arg(long)]
        period: Period,
    },
    /// Confirm a calculated declaration as filed.
    File {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        kind: DeclarationKind,
        #[arg(long)]
        period: Period,
    },
    /// Reopen a filed declaration.
    Unlock {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        kind: DeclarationKind,
        #[arg(long)]
        period: Period,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EngineConfig::load(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => return report(&e.into()),
    };
    init_tracing(&config);

    match run(cli.command, config).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => report(&e.into()),
        },
        Err(e) => report(&e),
    }
}

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Prints the error as JSON on stderr and picks the exit code.
fn report(err: &anyhow::Error) -> ExitCode {
    let (code, client) = match err.downcast_ref::<EngineError>() {
        Some(e) => (e.error_code(), e.is_client_error()),
        None => ("INTERNAL", false),
    };
    let body = json!({ "error_code": code, "message": format!("{err:#}") });
    eprintln!("{body}");

    if client {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

async fn run(command: Command, config: EngineConfig) -> anyhow::Result<Value> {
    let catalog_default = config.catalog.path.clone();
    let engine = TaxEngine::open(config).await?;
    debug!(?command, "Dispatching command");

    let output = match command {
        Command::SyncRules { farm, catalog, preview } => {
            let catalog = load_catalog(&catalog.unwrap_or(catalog_default))?;
            let plan = if preview {
                engine.sync().preview(&farm, &catalog).await?
            } else {
                engine.sync().apply(&farm, &catalog).await?
            };
            json!({
                "catalog_version": catalog.version,
                "applied": !preview,
                "summary": plan.summary(),
                "plan": plan,
            })
        }
        Command::Override { farm, rule, value, by } => {
            serde_json::to_value(engine.sync().override_by_code(&farm, &rule, value, &by).await?)?
        }
        Command::Reset { farm, rule, by } => {
            serde_json::to_value(engine.sync().reset_by_code(&farm, &rule, &by).await?)?
        }
        Command::RuleValue {
            farm,
            code,
            rule_type,
            category,
            as_of,
        } => {
            let selector = match (code, rule_type, category) {
                (Some(code), _, _) => RuleSelector::Code { code },
                (None, Some(rule_type), Some(category)) => RuleSelector::Category { rule_type, category },
                _ => {
                    return Err(EngineError::from(ValidationError::Required {
                        field: "--code or --type with --category".to_string(),
                    })
                    .into())
                }
            };
            let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
            serde_json::to_value(engine.rules().get_rule_value(&farm, &selector, as_of).await?)?
        }
        Command::Pit {
            farm,
            employee,
            period,
            gross,
            dependents,
            other,
            insurance,
        } => {
            let input = PitInput {
                employee_id: employee,
                period,
                gross_income: gross,
                dependents_count: dependents,
                other_deduction: other,
                insurance_deduction: insurance,
            };
            serde_json::to_value(engine.pit().calculate(&farm, &input).await?)?
        }
        Command::PitBatch { farm, period } => serde_json::to_value(engine.pit().batch(&farm, period).await?)?,
        Command::Cit { farm, period } => serde_json::to_value(engine.cit().calculate(&farm, period).await?)?,
        Command::Vat { farm, invoice } => {
            let text = std::fs::read_to_string(&invoice)
                .with_context(|| format!("reading invoice {}", invoice.display()))?;
            let invoice: VatInvoice =
                serde_json::from_str(&text).with_context(|| format!("parsing invoice {}", invoice.display()))?;
            serde_json::to_value(engine.vat().validate(&farm, &invoice).await?)?
        }
        Command::VatDeclare { farm, period } => serde_json::to_value(engine.vat().declare(&farm, period).await?)?,
        Command::Status { farm, kind, period } => {
            serde_json::to_value(engine.declaration(&farm, kind, period).await?)?
        }
        Command::File { farm, kind, period } => {
            serde_json::to_value(engine.file_declaration(&farm, kind, period).await?)?
        }
        Command::Unlock { farm, kind, period } => {
            serde_json::to_value(engine.unlock_declaration(&farm, kind, period).await?)?
        }
    };

    engine.db().close().await;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_typed_arguments() {
        let cli = Cli::parse_from([
            "agritax", "pit", "--farm", "f1", "--employee", "e1", "--period", "2025-03", "--gross", "30000000",
            "--dependents", "2",
        ]);
        match cli.command {
            Command::Pit {
                period,
                gross,
                dependents,
                ..
            } => {
                assert_eq!(period, "2025-03".parse::<Period>().unwrap());
                assert_eq!(gross, Money::from_units(30_000_000));
                assert_eq!(dependents, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rule_value_by_category() {
        let cli = Cli::parse_from([
            "agritax",
            "rule-value",
            "--farm",
            "f1",
            "--type",
            "cit-deduction",
            "--category",
            "TAX_RATE",
        ]);
        assert!(matches!(
            cli.command,
            Command::RuleValue {
                rule_type: Some(RuleType::CitDeduction),
                ..
            }
        ));
    }

    #[test]
    fn test_bad_period_is_rejected() {
        assert!(Cli::try_parse_from(["agritax", "cit", "--farm", "f1", "--period", "2025-13"]).is_err());
    }
}
