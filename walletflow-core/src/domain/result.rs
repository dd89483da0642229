//! Error type for the core library

use thiserror::Error;

/// Core library error type
///
/// Cast failures carry the offending field and raw text so a failed batch
/// can be traced back to the staging row that broke it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Cast error: cannot convert {field} value {value:?}: {reason}")]
    Cast {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a structural load error
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a cast error for a field
    pub fn cast(field: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::Cast {
            field,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors raised while casting staged text
    pub fn is_cast(&self) -> bool {
        matches!(self, Self::Cast { .. })
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
