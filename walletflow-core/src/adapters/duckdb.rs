//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use crate::domain::{Recipient, StagingRecord, Transaction, User};
use crate::services::MigrationService;

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Layout used for every TIMESTAMP written to or read from the store (UTC)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// Parse SQL and require every statement to be a read-only query.
///
/// Only `SELECT` / `WITH ... SELECT` (and set operations over them) pass.
fn validate_read_only(sql: &str) -> Result<()> {
    let dialect = DuckDbDialect {};
    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| {
        let msg = e.to_string();
        anyhow!("{}", msg.trim_start_matches("sql parser error: "))
    })?;

    if statements.is_empty() {
        anyhow::bail!("No SQL statement provided");
    }
    if statements.iter().any(|s| !matches!(s, Statement::Query(_))) {
        anyhow::bail!("Only SELECT queries are allowed");
    }
    Ok(())
}

/// Result of a SQL query
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

/// Row counts of every relation in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableSizes {
    pub staging_rows: i64,
    pub users: i64,
    pub recipients: i64,
    pub transactions: i64,
}

/// Soft-reference integrity counts for the fact table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceCounts {
    /// Transactions whose payer id has no row in `users`
    pub unresolved_payers: i64,
    /// Transactions whose payee id has no row in `recipients`
    pub unresolved_payees: i64,
    pub null_payers: i64,
    pub null_payees: i64,
    pub null_amounts: i64,
    pub null_sent_at: i64,
    /// Distinct non-blank staged transaction ids not present in `transactions`
    pub pending_staged_ids: i64,
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a store file.
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Autoloaded extensions are never needed and can fail on locked-down hosts
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        Ok(conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Path of the backing file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> Result<crate::services::MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            debug!(applied = ?result.applied, "schema migrated");
        }
        Ok(())
    }

    // === Staging ===

    /// Append raw records under one load batch id.
    ///
    /// All rows go in one transaction: either the whole batch lands or none of it.
    pub fn insert_staging_records(&self, batch_id: &str, records: &[StagingRecord]) -> Result<usize> {
        self.write_staging(batch_id, records, false)
    }

    /// Swap the whole staging relation for `records` in one transaction
    pub fn replace_staging_records(&self, batch_id: &str, records: &[StagingRecord]) -> Result<usize> {
        self.write_staging(batch_id, records, true)
    }

    fn write_staging(&self, batch_id: &str, records: &[StagingRecord], replace: bool) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if replace {
            let removed = tx.execute("DELETE FROM staging_transactions", [])?;
            debug!(removed, "staging cleared");
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO staging_transactions (load_batch_id, customer_id, transaction_id, amount,
                                                   sent_time, received_time, recipient_id, category,
                                                   payment_method, status, age, sender_bank, receiver_bank,
                                                   origin_state, destination_state, channel_app, device)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for r in records {
                stmt.execute(params![
                    batch_id,
                    r.customer_id,
                    r.transaction_id,
                    r.amount,
                    r.sent_time,
                    r.received_time,
                    r.recipient_id,
                    r.category,
                    r.payment_method,
                    r.status,
                    r.age,
                    r.sender_bank,
                    r.receiver_bank,
                    r.origin_state,
                    r.destination_state,
                    r.channel_app,
                    r.device,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Remove every staged row, returning how many were dropped
    pub fn clear_staging(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM staging_transactions", [])?;
        Ok(removed)
    }

    /// All staged rows in load order
    pub fn get_staging_records(&self) -> Result<Vec<StagingRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT customer_id, transaction_id, amount, sent_time, received_time, recipient_id,
                    category, payment_method, status, age, sender_bank, receiver_bank,
                    origin_state, destination_state, channel_app, device
             FROM staging_transactions
             ORDER BY row_seq",
        )?;

        let records = stmt
            .query_map([], |row| {
                // Staged NULLs only come from manual inserts; treat them as empty text
                let text = |i: usize| -> duckdb::Result<String> {
                    Ok(row.get::<_, Option<String>>(i)?.unwrap_or_default())
                };
                Ok(StagingRecord {
                    customer_id: text(0)?,
                    transaction_id: text(1)?,
                    amount: text(2)?,
                    sent_time: text(3)?,
                    received_time: text(4)?,
                    recipient_id: text(5)?,
                    category: text(6)?,
                    payment_method: text(7)?,
                    status: text(8)?,
                    age: text(9)?,
                    sender_bank: text(10)?,
                    receiver_bank: text(11)?,
                    origin_state: text(12)?,
                    destination_state: text(13)?,
                    channel_app: text(14)?,
                    device: text(15)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        Ok(records)
    }

    // === Normalized relations ===

    /// Insert users whose id is not present yet; returns rows inserted
    pub fn insert_users_if_absent(&self, users: &[User]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO users (customer_id, age, origin_state)
                 VALUES (?, ?, ?)
                 ON CONFLICT (customer_id) DO NOTHING",
            )?;
            for u in users {
                inserted += stmt.execute(params![u.customer_id, u.age, u.origin_state])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Insert recipients whose id is not present yet; returns rows inserted
    pub fn insert_recipients_if_absent(&self, recipients: &[Recipient]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recipients (recipient_id, category, receiver_bank, destination_state)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (recipient_id) DO NOTHING",
            )?;
            for r in recipients {
                inserted += stmt.execute(params![
                    r.recipient_id,
                    r.category,
                    r.receiver_bank,
                    r.destination_state,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Insert transactions whose id is not present yet; returns rows inserted
    pub fn insert_transactions_if_absent(&self, transactions: &[Transaction]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transactions (transaction_id, sent_at, received_at, payer_id, payee_id,
                                           amount, category, payment_method, status, sender_bank,
                                           receiver_bank, origin_state, destination_state,
                                           channel_app, device, ingested_at)
                 VALUES (?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?,
                         CAST(? AS DECIMAL(18, 2)), ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))
                 ON CONFLICT (transaction_id) DO NOTHING",
            )?;
            for t in transactions {
                inserted += stmt.execute(params![
                    t.transaction_id,
                    t.sent_at.map(format_timestamp),
                    t.received_at.map(format_timestamp),
                    t.payer_id,
                    t.payee_id,
                    t.amount.map(|a| a.to_string()),
                    t.category,
                    t.payment_method,
                    t.status,
                    t.sender_bank,
                    t.receiver_bank,
                    t.origin_state,
                    t.destination_state,
                    t.channel_app,
                    t.device,
                    format_timestamp(t.ingested_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT customer_id, age, origin_state FROM users ORDER BY customer_id")?;
        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    customer_id: row.get(0)?,
                    age: row.get(1)?,
                    origin_state: row.get(2)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn get_recipients(&self) -> Result<Vec<Recipient>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT recipient_id, category, receiver_bank, destination_state
             FROM recipients ORDER BY recipient_id",
        )?;
        let recipients = stmt
            .query_map([], |row| {
                Ok(Recipient {
                    recipient_id: row.get(0)?,
                    category: row.get(1)?,
                    receiver_bank: row.get(2)?,
                    destination_state: row.get(3)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(recipients)
    }

    pub fn get_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        // Timestamps and amounts are read back as text so nothing depends on
        // duckdb-rs type features; they were written in a fixed layout.
        let mut stmt = conn.prepare(
            "SELECT transaction_id, sent_at::VARCHAR, received_at::VARCHAR, payer_id, payee_id,
                    amount::VARCHAR, category, payment_method, status, sender_bank, receiver_bank,
                    origin_state, destination_state, channel_app, device, ingested_at::VARCHAR
             FROM transactions
             ORDER BY transaction_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(RawTransaction {
                    transaction_id: row.get(0)?,
                    sent_at: row.get(1)?,
                    received_at: row.get(2)?,
                    payer_id: row.get(3)?,
                    payee_id: row.get(4)?,
                    amount: row.get(5)?,
                    category: row.get(6)?,
                    payment_method: row.get(7)?,
                    status: row.get(8)?,
                    sender_bank: row.get(9)?,
                    receiver_bank: row.get(10)?,
                    origin_state: row.get(11)?,
                    destination_state: row.get(12)?,
                    channel_app: row.get(13)?,
                    device: row.get(14)?,
                    ingested_at: row.get(15)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter().map(RawTransaction::into_transaction).collect()
    }

    // === Status ===

    pub fn get_table_sizes(&self) -> Result<TableSizes> {
        let conn = self.conn()?;
        let sizes = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM staging_transactions),
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM recipients),
                (SELECT COUNT(*) FROM transactions)",
            [],
            |row| {
                Ok(TableSizes {
                    staging_rows: row.get(0)?,
                    users: row.get(1)?,
                    recipients: row.get(2)?,
                    transactions: row.get(3)?,
                })
            },
        )?;
        Ok(sizes)
    }

    /// Earliest and latest `sent_at`
    pub fn get_sent_range(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let conn = self.conn()?;
        let (min, max): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(sent_at)::VARCHAR, MAX(sent_at)::VARCHAR FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((
            min.as_deref().map(parse_timestamp).transpose()?,
            max.as_deref().map(parse_timestamp).transpose()?,
        ))
    }

    // === Doctor checks ===

    pub fn get_reference_counts(&self) -> Result<ReferenceCounts> {
        let conn = self.conn()?;
        let counts = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM transactions t
                 WHERE t.payer_id IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM users u WHERE u.customer_id = t.payer_id)),
                (SELECT COUNT(*) FROM transactions t
                 WHERE t.payee_id IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM recipients r WHERE r.recipient_id = t.payee_id)),
                (SELECT COUNT(*) FROM transactions WHERE payer_id IS NULL),
                (SELECT COUNT(*) FROM transactions WHERE payee_id IS NULL),
                (SELECT COUNT(*) FROM transactions WHERE amount IS NULL),
                (SELECT COUNT(*) FROM transactions WHERE sent_at IS NULL),
                (SELECT COUNT(DISTINCT trim(s.transaction_id)) FROM staging_transactions s
                 WHERE trim(coalesce(s.transaction_id, '')) <> ''
                   AND NOT EXISTS (SELECT 1 FROM transactions t
                                   WHERE t.transaction_id = trim(s.transaction_id)))",
            [],
            |row| {
                Ok(ReferenceCounts {
                    unresolved_payers: row.get(0)?,
                    unresolved_payees: row.get(1)?,
                    null_payers: row.get(2)?,
                    null_payees: row.get(3)?,
                    null_amounts: row.get(4)?,
                    null_sent_at: row.get(5)?,
                    pending_staged_ids: row.get(6)?,
                })
            },
        )?;
        Ok(counts)
    }

    // === Query operations ===

    /// Execute a read-only SQL query
    pub fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        validate_read_only(sql)?;
        debug!(sql, "executing query");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let mut result_rows = stmt.query([])?;

        let mut rows: Vec<Vec<serde_json::Value>> = Vec::new();
        let mut column_count = 0;

        while let Some(row) = result_rows.next()? {
            if rows.is_empty() {
                column_count = row.as_ref().column_count();
            }
            rows.push((0..column_count).map(|i| column_value(row, i)).collect());
        }

        // Release the borrow on stmt before reading column names
        drop(result_rows);

        let count = if column_count > 0 {
            column_count
        } else {
            stmt.column_count()
        };
        let columns: Vec<String> = (0..count)
            .map(|i| {
                stmt.column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();

        let row_count = rows.len();
        Ok(QueryResult {
            columns,
            rows,
            row_count,
        })
    }
}

/// A transactions row as read, before text columns are cast back
struct RawTransaction {
    transaction_id: String,
    sent_at: Option<String>,
    received_at: Option<String>,
    payer_id: Option<String>,
    payee_id: Option<String>,
    amount: Option<String>,
    category: Option<String>,
    payment_method: Option<String>,
    status: Option<String>,
    sender_bank: Option<String>,
    receiver_bank: Option<String>,
    origin_state: Option<String>,
    destination_state: Option<String>,
    channel_app: Option<String>,
    device: Option<String>,
    ingested_at: String,
}

impl RawTransaction {
    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            sent_at: self.sent_at.as_deref().map(parse_timestamp).transpose()?,
            received_at: self.received_at.as_deref().map(parse_timestamp).transpose()?,
            amount: self
                .amount
                .as_deref()
                .map(|a| {
                    Decimal::from_str(a).with_context(|| format!("Stored amount {:?} is not a decimal", a))
                })
                .transpose()?,
            ingested_at: parse_timestamp(&self.ingested_at)?,
            transaction_id: self.transaction_id,
            payer_id: self.payer_id,
            payee_id: self.payee_id,
            category: self.category,
            payment_method: self.payment_method,
            status: self.status,
            sender_bank: self.sender_bank,
            receiver_bank: self.receiver_bank,
            origin_state: self.origin_state,
            destination_state: self.destination_state,
            channel_app: self.channel_app,
            device: self.device,
        })
    }
}

fn column_value(row: &duckdb::Row, idx: usize) -> serde_json::Value {
    use duckdb::types::ValueRef;

    match row.get_ref(idx) {
        Ok(ValueRef::Null) => serde_json::Value::Null,
        Ok(ValueRef::Boolean(b)) => serde_json::Value::Bool(b),
        Ok(ValueRef::TinyInt(i)) => serde_json::json!(i),
        Ok(ValueRef::SmallInt(i)) => serde_json::json!(i),
        Ok(ValueRef::Int(i)) => serde_json::json!(i),
        Ok(ValueRef::BigInt(i)) => serde_json::json!(i),
        Ok(ValueRef::HugeInt(i)) => serde_json::json!(i.to_string()),
        Ok(ValueRef::UTinyInt(i)) => serde_json::json!(i),
        Ok(ValueRef::USmallInt(i)) => serde_json::json!(i),
        Ok(ValueRef::UInt(i)) => serde_json::json!(i),
        Ok(ValueRef::UBigInt(i)) => serde_json::json!(i),
        Ok(ValueRef::Float(f)) => serde_json::json!(f),
        Ok(ValueRef::Double(f)) => serde_json::json!(f),
        // Keep exact decimal text; amounts must not pick up float noise
        Ok(ValueRef::Decimal(d)) => serde_json::Value::String(d.to_string()),
        Ok(ValueRef::Text(bytes)) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).to_string())
        }
        Ok(ValueRef::Blob(bytes)) => {
            serde_json::Value::String(format!("<blob {} bytes>", bytes.len()))
        }
        Ok(ValueRef::Date32(days)) => {
            // Days since epoch
            let date = chrono::NaiveDate::default() + chrono::Duration::days(days as i64);
            serde_json::Value::String(date.to_string())
        }
        Ok(ValueRef::Timestamp(_, micros)) => {
            let ts = DateTime::from_timestamp_micros(micros)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| micros.to_string());
            serde_json::Value::String(ts)
        }
        Ok(ValueRef::Interval {
            months,
            days,
            nanos,
        }) => serde_json::json!({
            "months": months,
            "days": days,
            "nanos": nanos
        }),
        Ok(other) => serde_json::Value::String(format!("{:?}", other)),
        Err(_) => serde_json::Value::Null,
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .with_context(|| format!("Stored timestamp {:?} is not readable", s))
}
