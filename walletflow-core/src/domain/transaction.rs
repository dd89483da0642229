//! Transaction fact

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single wallet/UPI transfer
///
/// `payer_id` and `payee_id` are references, not ownership: they may name a
/// user or recipient that was never materialized in the dimension tables.
/// A blank or whitespace-only id in the export is kept as `None` (NULL in
/// the store), never as an empty string, so it cannot match a dimension key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    /// When the payer sent the money (UTC)
    pub sent_at: Option<DateTime<Utc>>,
    /// When the payee received it (UTC)
    pub received_at: Option<DateTime<Utc>>,
    pub payer_id: Option<String>,
    pub payee_id: Option<String>,
    /// Fixed-point, scale 2
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub status: Option<String>,
    pub sender_bank: Option<String>,
    pub receiver_bank: Option<String>,
    pub origin_state: Option<String>,
    pub destination_state: Option<String>,
    pub channel_app: Option<String>,
    pub device: Option<String>,
    /// Supplied by the caller of the normalizer, never taken implicitly
    pub ingested_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a transaction with only its key and ingestion time set
    pub fn new(transaction_id: impl Into<String>, ingested_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            sent_at: None,
            received_at: None,
            payer_id: None,
            payee_id: None,
            amount: None,
            category: None,
            payment_method: None,
            status: None,
            sender_bank: None,
            receiver_bank: None,
            origin_state: None,
            destination_state: None,
            channel_app: None,
            device: None,
            ingested_at,
        }
    }
}
