//! Query service - ad-hoc read-only SQL

use std::sync::Arc;

use anyhow::Result;

use crate::adapters::duckdb::{DuckDbRepository, QueryResult};

/// Query service for SQL execution
pub struct QueryService {
    repository: Arc<DuckDbRepository>,
}

impl QueryService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Execute a read-only SQL query
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        let sql = sql.trim().trim_end_matches(';');
        self.repository.execute_query(sql)
    }
}
