//! User dimension

use serde::{Deserialize, Serialize};

/// A paying customer, keyed by the external customer id.
///
/// Only the first staged row seen for an id is kept; later rows with the
/// same id never update it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub customer_id: String,
    pub age: Option<i32>,
    pub origin_state: Option<String>,
}

impl User {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            age: None,
            origin_state: None,
        }
    }

    pub fn with_age(mut self, age: i32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_origin_state(mut self, state: impl Into<String>) -> Self {
        self.origin_state = Some(state.into());
        self
    }
}
