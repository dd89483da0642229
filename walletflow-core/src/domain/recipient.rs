//! Recipient dimension

use serde::{Deserialize, Serialize};

/// A payee (merchant or person) keyed by the external recipient id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub recipient_id: String,
    pub category: Option<String>,
    pub receiver_bank: Option<String>,
    pub destination_state: Option<String>,
}
