//! Walletflow Core - batch analytics over wallet and UPI transaction exports
//!
//! The pipeline has three stages over one DuckDB store:
//!
//! - **load**: raw CSV rows land verbatim in the staging relation
//! - **normalize**: staging is cleaned into `users`, `recipients` and `transactions`
//! - **report**: the analytics catalogue runs over the normalized relations
//!
//! Layout:
//!
//! - **domain**: entities and the cleaning rules for staged text
//! - **services**: one service per stage, plus status, doctor and ad-hoc query
//! - **adapters**: the DuckDB repository

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use adapters::duckdb::QueryResult;
pub use domain::result::Error;
pub use domain::{Recipient, StagingRecord, Transaction, User};

/// Main context for Walletflow operations
///
/// Holds the configuration, the store and every service wired to it.
pub struct WalletflowContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub load_service: LoadService,
    pub normalize_service: NormalizeService,
    pub report_service: ReportService,
    pub status_service: StatusService,
    pub doctor_service: DoctorService,
    pub query_service: QueryService,
}

impl WalletflowContext {
    /// Open the store configured for `data_dir`, creating it if needed
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir).context("Failed to load settings")?;
        Self::with_config(config)
    }

    /// Open the store for an already-resolved config
    pub fn with_config(config: Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        debug!(database = %config.database_path.display(), "opening store");

        let repository = Arc::new(DuckDbRepository::new(&config.database_path)?);
        repository.ensure_schema()?;

        Ok(Self {
            load_service: LoadService::new(Arc::clone(&repository)),
            normalize_service: NormalizeService::new(Arc::clone(&repository)),
            report_service: ReportService::new(Arc::clone(&repository), config.analytics.clone()),
            status_service: StatusService::new(Arc::clone(&repository)),
            doctor_service: DoctorService::new(Arc::clone(&repository)),
            query_service: QueryService::new(Arc::clone(&repository)),
            repository,
            config,
        })
    }

    /// Load options carrying the configured delimiter
    pub fn load_options(&self, replace: bool) -> LoadOptions {
        LoadOptions {
            delimiter: self.config.delimiter,
            replace,
        }
    }
}
