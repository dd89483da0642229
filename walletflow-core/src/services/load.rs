//! Load service - raw CSV into the staging relation
//!
//! Fields are copied verbatim. The only validation is structural: every row
//! (header included) must carry exactly the staging column count.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result as CoreResult};
use crate::domain::{StagingRecord, STAGING_COLUMNS, STAGING_COLUMN_COUNT};

/// Options for a single load
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Field delimiter byte
    pub delimiter: u8,
    /// Clear staging before appending this file
    pub replace: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            replace: false,
        }
    }
}

/// Result of loading one file
#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub batch_id: String,
    pub rows_loaded: usize,
    pub file: PathBuf,
    pub replaced: bool,
}

/// Parse a delimited source with a header row into staging records.
///
/// Header names are positional: mismatches are logged, never rejected.
pub fn read_staging<R: Read>(source: R, delimiter: u8) -> CoreResult<Vec<StagingRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    if headers.len() != STAGING_COLUMN_COUNT {
        return Err(Error::load(format!(
            "header has {} columns, expected {}",
            headers.len(),
            STAGING_COLUMN_COUNT
        )));
    }

    let renamed: Vec<String> = headers
        .iter()
        .zip(STAGING_COLUMNS)
        .filter(|(found, expected)| !found.trim().eq_ignore_ascii_case(expected))
        .map(|(found, expected)| format!("{} (expected {})", found, expected))
        .collect();
    if !renamed.is_empty() {
        warn!(columns = %renamed.join(", "), "header names differ, loading by position");
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        let record = StagingRecord::from_fields(row.iter()).map_err(|e| match e {
            Error::Load(msg) => Error::load(format!("line {}: {}", line, msg)),
            other => other,
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Load service for staging CSV files
pub struct LoadService {
    repository: Arc<DuckDbRepository>,
}

impl LoadService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Load a file into staging as one batch.
    ///
    /// The whole file is parsed before anything is written, and the write is
    /// a single transaction, so a structural error leaves staging untouched.
    pub fn load(&self, file_path: &Path, options: &LoadOptions) -> Result<LoadResult> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        let records = read_staging(file, options.delimiter)
            .with_context(|| format!("Failed to load {}", file_path.display()))?;

        let batch_id = Uuid::new_v4().to_string();
        let rows_loaded = if options.replace {
            self.repository.replace_staging_records(&batch_id, &records)?
        } else {
            self.repository.insert_staging_records(&batch_id, &records)?
        };

        info!(
            file = %file_path.display(),
            batch = %batch_id,
            rows = rows_loaded,
            replaced = options.replace,
            "staging loaded"
        );

        Ok(LoadResult {
            batch_id,
            rows_loaded,
            file: file_path.to_path_buf(),
            replaced: options.replace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "customer_id,transaction_id,amount,sent_time,received_time,recipient_id,category,payment_method,status,age,sender_bank,receiver_bank,origin_state,destination_state,channel_app,device";

    fn row(customer: &str, txn: &str, amount: &str) -> String {
        format!(
            "{},{},{},2024-01-15 10:00:00,,R1,Food,UPI,SUCCESS,30,SBI,HDFC,Goa,Assam,PhonePe,Android",
            customer, txn, amount
        )
    }

    #[test]
    fn test_reads_rows_verbatim() {
        let data = format!("{}\n{}\n{}\n", HEADER, row("C1", "T1", " 1,234.56 "), row("C2", "T2", "\"₹10\""));
        // The quoted amount keeps its comma inside one field
        let data = data.replace(" 1,234.56 ", "\" 1,234.56 \"");

        let records = read_staging(data.as_bytes(), b',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, " 1,234.56 ");
        assert_eq!(records[1].amount, "₹10");
        assert_eq!(records[1].received_time, "");
    }

    #[test]
    fn test_short_row_is_structural_error() {
        let data = format!("{}\n{}\nC3,T3,10\n", HEADER, row("C1", "T1", "5"));
        let err = read_staging(data.as_bytes(), b',').unwrap_err();
        assert!(matches!(err, Error::Load(_)));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_wrong_header_width_rejected() {
        let err = read_staging("a,b,c\n1,2,3\n".as_bytes(), b',').unwrap_err();
        assert!(err.to_string().contains("header has 3 columns"));
    }

    #[test]
    fn test_renamed_headers_load_by_position() {
        let header = HEADER.replace("customer_id", "Customer ID");
        let data = format!("{}\n{}\n", header, row("C1", "T1", "5"));
        let records = read_staging(data.as_bytes(), b',').unwrap();
        assert_eq!(records[0].customer_id, "C1");
    }

    #[test]
    fn test_custom_delimiter() {
        let data = format!("{}\n{}\n", HEADER.replace(',', ";"), row("C1", "T1", "5").replace(',', ";"));
        let records = read_staging(data.as_bytes(), b';').unwrap();
        assert_eq!(records[0].device, "Android");
    }

    #[test]
    fn test_header_only_file_loads_nothing() {
        let records = read_staging(format!("{}\n", HEADER).as_bytes(), b',').unwrap();
        assert!(records.is_empty());
    }
}
