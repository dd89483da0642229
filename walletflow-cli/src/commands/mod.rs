//! CLI command implementations

pub mod doctor;
pub mod load;
pub mod normalize;
pub mod query;
pub mod report;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use walletflow_core::WalletflowContext;

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("WALLETFLOW_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".walletflow"))
}

/// Open the configured store
pub fn get_context() -> Result<WalletflowContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    WalletflowContext::new(&data_dir).context("Failed to initialize walletflow context")
}
