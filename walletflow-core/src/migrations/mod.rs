//! Schema migrations - embedded SQL files
//!
//! Each migration is a `(name, sql)` pair compiled into the binary with
//! `include_str!` and applied in slice order. New files get the next number
//! and are appended here.

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_staging.sql", include_str!("001_staging.sql")),
    ("002_normalized.sql", include_str!("002_normalized.sql")),
    ("003_indexes.sql", include_str!("003_indexes.sql")),
];

/// Name of the migration that creates the bookkeeping table
pub const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";
