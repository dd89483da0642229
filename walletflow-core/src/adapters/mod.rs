//! Adapter implementations
//!
//! DuckDB is the only store: staging, normalized relations and ad-hoc
//! queries all go through [`duckdb::DuckDbRepository`].

pub mod duckdb;
