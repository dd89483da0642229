//! Query command - read-only SQL against the store

use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};

use super::get_context;
use crate::output::{self, OutputFormat};

pub fn run(sql: Option<&str>, file: Option<&Path>, format: OutputFormat) -> Result<()> {
    // Get SQL from: argument, file, or stdin
    let sql_content = if let Some(sql) = sql {
        sql.to_string()
    } else if let Some(file_path) = file {
        std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read SQL file: {:?}", file_path))?
    } else if atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read SQL from stdin")?;
        buffer
    } else {
        anyhow::bail!("No SQL query provided. Use positional argument, --file, or pipe from stdin.");
    };

    let ctx = get_context()?;
    let result = ctx.query_service.execute(&sql_content)?;

    match format {
        OutputFormat::Json => output::print_json(&result),
        _ => {
            output::print_rows(&result, format);
            Ok(())
        }
    }
}
