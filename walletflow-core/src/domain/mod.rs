//! Core domain entities
//!
//! Pure data structures and the cleaning rules that turn staged text into
//! them - no I/O or external dependencies.

pub mod clean;
mod recipient;
pub mod result;
mod staging;
mod transaction;
mod user;

pub use recipient::Recipient;
pub use staging::{StagingRecord, STAGING_COLUMNS, STAGING_COLUMN_COUNT};
pub use transaction::Transaction;
pub use user::User;
