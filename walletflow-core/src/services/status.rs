//! Status service - store contents at a glance

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::adapters::duckdb::{DuckDbRepository, TableSizes};

/// Status service for store summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let tables = self.repository.get_table_sizes()?;
        let (earliest, latest) = self.repository.get_sent_range()?;

        Ok(StatusSummary {
            database: self
                .repository
                .db_path()
                .map(|p| p.display().to_string()),
            tables,
            sent_range: DateRange { earliest, latest },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    /// Backing file, absent for in-memory stores
    pub database: Option<String>,
    pub tables: TableSizes,
    pub sent_range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}
