//! Staging record - one raw CSV line, untyped

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Number of columns every input file must carry
pub const STAGING_COLUMN_COUNT: usize = 16;

/// Column names in input order. The staging table uses the same names.
pub const STAGING_COLUMNS: [&str; STAGING_COLUMN_COUNT] = [
    "customer_id",
    "transaction_id",
    "amount",
    "sent_time",
    "received_time",
    "recipient_id",
    "category",
    "payment_method",
    "status",
    "age",
    "sender_bank",
    "receiver_bank",
    "origin_state",
    "destination_state",
    "channel_app",
    "device",
];

/// A raw row as it landed in the staging relation.
///
/// Every field is kept verbatim. Nothing here is validated: malformed and
/// duplicate values are expected and resolved by the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub customer_id: String,
    pub transaction_id: String,
    pub amount: String,
    pub sent_time: String,
    pub received_time: String,
    pub recipient_id: String,
    pub category: String,
    pub payment_method: String,
    pub status: String,
    pub age: String,
    pub sender_bank: String,
    pub receiver_bank: String,
    pub origin_state: String,
    pub destination_state: String,
    pub channel_app: String,
    pub device: String,
}

impl StagingRecord {
    /// Build a record from positional fields.
    ///
    /// Fails when the field count is not exactly [`STAGING_COLUMN_COUNT`].
    pub fn from_fields<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let found = fields.len();
        let [customer_id, transaction_id, amount, sent_time, received_time, recipient_id, category, payment_method, status, age, sender_bank, receiver_bank, origin_state, destination_state, channel_app, device]: [String; STAGING_COLUMN_COUNT] =
            fields.try_into().map_err(|_| {
                Error::load(format!(
                    "expected {} columns, found {}",
                    STAGING_COLUMN_COUNT, found
                ))
            })?;

        Ok(Self {
            customer_id,
            transaction_id,
            amount,
            sent_time,
            received_time,
            recipient_id,
            category,
            payment_method,
            status,
            age,
            sender_bank,
            receiver_bank,
            origin_state,
            destination_state,
            channel_app,
            device,
        })
    }

    /// Fields in column order, for positional binding
    pub fn fields(&self) -> [&str; STAGING_COLUMN_COUNT] {
        [
            &self.customer_id,
            &self.transaction_id,
            &self.amount,
            &self.sent_time,
            &self.received_time,
            &self.recipient_id,
            &self.category,
            &self.payment_method,
            &self.status,
            &self.age,
            &self.sender_bank,
            &self.receiver_bank,
            &self.origin_state,
            &self.destination_state,
            &self.channel_app,
            &self.device,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields_round_trips_column_order() {
        let fields: Vec<String> = (0..STAGING_COLUMN_COUNT).map(|i| format!("v{}", i)).collect();
        let record = StagingRecord::from_fields(fields.clone()).unwrap();
        assert_eq!(record.customer_id, "v0");
        assert_eq!(record.age, "v9");
        assert_eq!(record.device, "v15");
        let back: Vec<&str> = record.fields().to_vec();
        assert_eq!(back, fields.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_from_fields_rejects_wrong_count() {
        let err = StagingRecord::from_fields(vec!["a", "b", "c"]).unwrap_err();
        assert!(err.to_string().contains("expected 16 columns, found 3"));
    }
}
