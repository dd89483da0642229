//! Migration service - applies the embedded schema to a store
//!
//! Applied migrations are recorded in `sys_migrations`, so running the
//! service on an up-to-date store is a no-op.

use std::collections::HashSet;

use anyhow::{Context, Result};
use duckdb::Connection;
use tracing::debug;

use crate::migrations::{BOOTSTRAP_MIGRATION, MIGRATIONS};

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Names of migrations applied by this run, in order
    pub applied: Vec<String>,
    /// Migrations that were already present
    pub already_applied: usize,
}

/// Applies pending migrations over a borrowed connection
pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply every migration not yet recorded, bootstrap first
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let mut applied = Vec::new();

        if !self.bookkeeping_exists()? {
            self.apply(BOOTSTRAP_MIGRATION)?;
            applied.push(BOOTSTRAP_MIGRATION.to_string());
        }

        let recorded: HashSet<String> = self.get_applied()?.into_iter().collect();
        let already_applied = recorded.len() - applied.len();

        for (name, _) in MIGRATIONS {
            if !recorded.contains(*name) {
                self.apply(name)?;
                applied.push(name.to_string());
            }
        }

        Ok(MigrationResult {
            applied,
            already_applied,
        })
    }

    /// Names of recorded migrations, sorted
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn bookkeeping_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn apply(&self, name: &str) -> Result<()> {
        let sql = MIGRATIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, sql)| *sql)
            .with_context(|| format!("Unknown migration: {}", name))?;

        debug!(migration = name, "applying migration");
        self.conn
            .execute_batch(sql)
            .with_context(|| format!("Migration {} failed", name))?;
        self.conn.execute(
            "INSERT INTO sys_migrations (migration_name) VALUES (?)",
            [name],
        )?;
        Ok(())
    }
}
