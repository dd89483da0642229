//! Normalize service - staging rows into users, recipients and transactions
//!
//! The projections are pure functions over an immutable staging batch. The
//! service reads staging once, runs the projections and writes each result
//! with insert-if-absent semantics, so re-running against unchanged staging
//! inserts nothing.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::clean::{clean_text, parse_age, parse_amount, parse_timestamp};
use crate::domain::result::Result as CoreResult;
use crate::domain::{Recipient, StagingRecord, Transaction, User};

/// Output of a full normalization pass over one staging batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub users: Vec<User>,
    pub recipients: Vec<Recipient>,
    pub transactions: Vec<Transaction>,
}

/// Run all three projections over a staging batch
pub fn normalize(batch: &[StagingRecord], ingested_at: DateTime<Utc>) -> CoreResult<NormalizedBatch> {
    Ok(NormalizedBatch {
        users: project_users(batch)?,
        recipients: project_recipients(batch)?,
        transactions: project_transactions(batch, ingested_at)?,
    })
}

/// Distinct users keyed by customer id, first-seen wins.
///
/// Every row is cast, including rows later discarded as duplicates, so one
/// bad age anywhere fails the projection.
pub fn project_users(batch: &[StagingRecord]) -> CoreResult<Vec<User>> {
    let mut seen = HashSet::new();
    let mut users = Vec::new();

    for record in batch {
        let Some(customer_id) = clean_text(&record.customer_id) else {
            continue;
        };
        let age = parse_age(&record.age)?;
        if !seen.insert(customer_id.clone()) {
            continue;
        }
        users.push(User {
            customer_id,
            age,
            origin_state: clean_text(&record.origin_state),
        });
    }

    Ok(users)
}

/// Distinct recipients keyed by recipient id, first-seen wins
pub fn project_recipients(batch: &[StagingRecord]) -> CoreResult<Vec<Recipient>> {
    let mut seen = HashSet::new();
    let mut recipients = Vec::new();

    for record in batch {
        let Some(recipient_id) = clean_text(&record.recipient_id) else {
            continue;
        };
        if !seen.insert(recipient_id.clone()) {
            continue;
        }
        recipients.push(Recipient {
            recipient_id,
            category: clean_text(&record.category),
            receiver_bank: clean_text(&record.receiver_bank),
            destination_state: clean_text(&record.destination_state),
        });
    }

    Ok(recipients)
}

/// Distinct transactions keyed by transaction id, first-seen wins
pub fn project_transactions(
    batch: &[StagingRecord],
    ingested_at: DateTime<Utc>,
) -> CoreResult<Vec<Transaction>> {
    let mut seen = HashSet::new();
    let mut transactions = Vec::new();

    for record in batch {
        let Some(transaction_id) = clean_text(&record.transaction_id) else {
            continue;
        };

        let sent_at = parse_timestamp("sent_time", &record.sent_time)?;
        let received_at = parse_timestamp("received_time", &record.received_time)?;
        let amount = parse_amount(&record.amount)?;

        if !seen.insert(transaction_id.clone()) {
            continue;
        }

        transactions.push(Transaction {
            transaction_id,
            sent_at,
            received_at,
            payer_id: clean_text(&record.customer_id),
            payee_id: clean_text(&record.recipient_id),
            amount,
            category: clean_text(&record.category),
            payment_method: clean_text(&record.payment_method),
            status: clean_text(&record.status),
            sender_bank: clean_text(&record.sender_bank),
            receiver_bank: clean_text(&record.receiver_bank),
            origin_state: clean_text(&record.origin_state),
            destination_state: clean_text(&record.destination_state),
            channel_app: clean_text(&record.channel_app),
            device: clean_text(&record.device),
            ingested_at,
        });
    }

    Ok(transactions)
}

/// Normalize service
pub struct NormalizeService {
    repository: Arc<DuckDbRepository>,
}

impl NormalizeService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Normalize the current staging relation into the target tables.
    ///
    /// Projections run in order users, recipients, transactions. A cast
    /// error stops the run before that projection writes anything; tables
    /// written by earlier projections keep their rows.
    pub fn run(&self, ingested_at: DateTime<Utc>) -> Result<NormalizeResult> {
        let staged = self.repository.get_staging_records()?;
        info!(rows = staged.len(), "normalizing staging batch");

        let users = project_users(&staged).context("User projection failed")?;
        let users_inserted = self.repository.insert_users_if_absent(&users)?;
        info!(candidates = users.len(), inserted = users_inserted, "users normalized");

        let recipients = project_recipients(&staged).context("Recipient projection failed")?;
        let recipients_inserted = self.repository.insert_recipients_if_absent(&recipients)?;
        info!(
            candidates = recipients.len(),
            inserted = recipients_inserted,
            "recipients normalized"
        );

        let transactions = project_transactions(&staged, ingested_at)
            .context("Transaction projection failed")?;
        let transactions_inserted = self.repository.insert_transactions_if_absent(&transactions)?;
        info!(
            candidates = transactions.len(),
            inserted = transactions_inserted,
            "transactions normalized"
        );

        Ok(NormalizeResult {
            staged_rows: staged.len(),
            users: TableCounts::new(users.len(), users_inserted),
            recipients: TableCounts::new(recipients.len(), recipients_inserted),
            transactions: TableCounts::new(transactions.len(), transactions_inserted),
        })
    }
}

/// Result of a normalization run
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeResult {
    /// Staging rows read
    pub staged_rows: usize,
    pub users: TableCounts,
    pub recipients: TableCounts,
    pub transactions: TableCounts,
}

/// Per-table counts for one projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    /// Distinct rows produced by the projection
    pub candidates: usize,
    /// Rows actually inserted (candidates minus ids already present)
    pub inserted: usize,
}

impl TableCounts {
    fn new(candidates: usize, inserted: usize) -> Self {
        Self { candidates, inserted }
    }

    /// Rows skipped because their key already existed
    pub fn skipped(&self) -> usize {
        self.candidates - self.inserted
    }
}
