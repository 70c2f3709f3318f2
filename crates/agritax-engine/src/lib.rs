//! # agritax-engine: Tax Services for AgriTax
//!
//! Wires the pure calculators in `agritax-core` to the repositories in
//! `agritax-db`. Every calculation takes a fresh rule snapshot, runs the
//! calculator, stores the result and advances the declaration.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       agritax-engine (THIS CRATE)                       │
//! │                                                                         │
//! │   TaxEngine::open(EngineConfig)                                        │
//! │        │                                                                │
//! │        ├── rules()  RuleEngine       get_rule_value, snapshot          │
//! │        ├── sync()   RuleSyncService  catalog merge, override, reset    │
//! │        ├── vat()    VatService       invoice validation, monthly run   │
//! │        ├── pit()    PitService       per employee, monthly batch       │
//! │        ├── cit()    CitService       quarter / fiscal year, losses     │
//! │        └── file_declaration / unlock_declaration                       │
//! │                                                                         │
//! │   All services share one Database (a cloneable SqlitePool handle).    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agritax_engine::{EngineConfig, TaxEngine};
//!
//! let engine = TaxEngine::open(EngineConfig::load(None)?).await?;
//! engine.sync().apply("farm-1", &catalog).await?;
//! let result = engine.cit().calculate("farm-1", "2025".parse()?).await?;
//! ```

pub mod cit;
pub mod config;
pub mod engine;
pub mod error;
pub mod pit;
pub mod sync;
pub mod vat;

pub use cit::CitService;
pub use config::{EngineConfig, LogFormat};
pub use engine::{RuleEngine, RuleValueAnswer};
pub use error::{EngineError, EngineResult};
pub use pit::PitService;
pub use sync::{load_catalog, RuleSyncService};
pub use vat::VatService;

use agritax_core::{Declaration, DeclarationKind, Period};
use agritax_db::{Database, DbConfig};
use tracing::info;

/// Entry point bundling the database handle with the services.
#[derive(Debug, Clone)]
pub struct TaxEngine {
    db: Database,
    config: EngineConfig,
}

impl TaxEngine {
    /// Opens (creating if needed) the configured database and runs
    /// migrations.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        if let Some(parent) = config.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EngineError::InvalidConfig(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db = Database::new(
            DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
        )
        .await?;

        info!(path = %config.database.path.display(), "Tax engine ready");
        Ok(TaxEngine::new(db, config))
    }

    /// Builds an engine over an existing database handle.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        TaxEngine { db, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> RuleEngine {
        RuleEngine::new(self.db.clone())
    }

    pub fn sync(&self) -> RuleSyncService {
        RuleSyncService::new(self.db.clone())
    }

    pub fn vat(&self) -> VatService {
        VatService::new(self.db.clone())
    }

    pub fn pit(&self) -> PitService {
        PitService::new(self.db.clone(), self.config.pit.batch_concurrency)
    }

    pub fn cit(&self) -> CitService {
        CitService::new(self.db.clone())
    }

    /// Current state of a declaration; DRAFT when never touched.
    pub async fn declaration(&self, farm_id: &str, kind: DeclarationKind, period: Period) -> EngineResult<Declaration> {
        self.db.farms().require(farm_id).await?;
        Ok(self.db.declarations().get(farm_id, kind, period).await?)
    }

    /// CALCULATED ──► FILED. Recalculation is refused until unlocked.
    pub async fn file_declaration(
        &self,
        farm_id: &str,
        kind: DeclarationKind,
        period: Period,
    ) -> EngineResult<Declaration> {
        self.db.farms().require(farm_id).await?;
        Ok(self.db.declarations().mark_filed(farm_id, kind, period).await?)
    }

    /// FILED ──► CALCULATED, for an amended return.
    pub async fn unlock_declaration(
        &self,
        farm_id: &str,
        kind: DeclarationKind,
        period: Period,
    ) -> EngineResult<Declaration> {
        self.db.farms().require(farm_id).await?;
        Ok(self.db.declarations().unlock(farm_id, kind, period).await?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use agritax_core::rules::RuleCatalog;
    use agritax_core::Farm;

    pub const FARM: &str = "farm-1";

    pub fn catalog() -> RuleCatalog {
        RuleCatalog::from_toml_str(include_str!("../../../catalog/default.toml")).unwrap()
    }

    /// Engine over a fresh in-memory database holding one calendar-year farm.
    pub async fn engine_with_farm() -> TaxEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.farms()
            .insert(&Farm {
                id: FARM.to_string(),
                name: "Green Valley".to_string(),
                fiscal_year_start_month: 1,
            })
            .await
            .unwrap();
        TaxEngine::new(db, EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{engine_with_farm, FARM};
    use super::*;
    use agritax_core::DeclarationStatus;

    #[tokio::test]
    async fn test_declaration_lifecycle_through_engine() {
        let engine = engine_with_farm().await;
        let period: Period = "2025-03".parse().unwrap();

        let draft = engine.declaration(FARM, DeclarationKind::Vat, period).await.unwrap();
        assert_eq!(draft.status, DeclarationStatus::Draft);

        // Filing straight from DRAFT is not a valid transition
        let err = engine.file_declaration(FARM, DeclarationKind::Vat, period).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        engine.vat().declare(FARM, period).await.unwrap();
        let filed = engine.file_declaration(FARM, DeclarationKind::Vat, period).await.unwrap();
        assert_eq!(filed.status, DeclarationStatus::Filed);

        let reopened = engine.unlock_declaration(FARM, DeclarationKind::Vat, period).await.unwrap();
        assert_eq!(reopened.status, DeclarationStatus::Calculated);
        assert!(reopened.filed_at.is_none());
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = std::env::temp_dir().join(format!("agritax-open-{}", std::process::id()));
        let mut config = EngineConfig::default();
        config.database.path = dir.join("nested").join("agritax.db");

        let engine = TaxEngine::open(config.clone()).await.unwrap();
        assert!(engine.db().health_check().await);
        assert!(config.database.path.exists());

        engine.db().close().await;
        std::fs::remove_dir_all(&dir).ok();
    }
}
