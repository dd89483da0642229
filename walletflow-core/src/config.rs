//! Configuration management
//!
//! Optional `settings.json` in the data directory:
//! ```json
//! {
//!   "database": "walletflow.duckdb",
//!   "load": { "delimiter": "," },
//!   "analytics": { "topN": 20, "corridorLimit": 50, "anomalyWindowDays": 30,
//!                  "anomalySigma": 3.0, "anomalyRowLimit": 200 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::services::AnalyticsSettings;

/// Environment variable that overrides the database location
pub const DATABASE_ENV: &str = "WALLETFLOW_DB";

const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_DATABASE: &str = "walletflow.duckdb";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    load: LoadSettings,
    #[serde(default)]
    analytics: AnalyticsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadSettings {
    pub delimiter: String,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Store file; relative names in settings resolve against the data dir
    pub database_path: PathBuf,
    pub delimiter: u8,
    pub analytics: AnalyticsSettings,
}

impl Config {
    /// Load config from the data directory.
    ///
    /// A missing settings file means defaults. `WALLETFLOW_DB` wins over the
    /// `database` setting.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let env_database = std::env::var(DATABASE_ENV).ok().filter(|v| !v.trim().is_empty());
        Self::load_with_override(data_dir, env_database.as_deref())
    }

    fn load_with_override(data_dir: &Path, database_override: Option<&str>) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("{}: {}", settings_path.display(), e))
            })?
        } else {
            SettingsFile::default()
        };

        let database = database_override
            .map(str::to_string)
            .or(raw.database)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let config = Self {
            database_path: data_dir.join(database),
            delimiter: parse_delimiter(&raw.load.delimiter)?,
            analytics: raw.analytics,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let a = &self.analytics;
        if a.top_n == 0 {
            return Err(Error::config("analytics.topN must be at least 1"));
        }
        if a.corridor_limit == 0 {
            return Err(Error::config("analytics.corridorLimit must be at least 1"));
        }
        if a.anomaly_window_days == 0 {
            return Err(Error::config("analytics.anomalyWindowDays must be at least 1"));
        }
        if a.anomaly_row_limit == 0 {
            return Err(Error::config("analytics.anomalyRowLimit must be at least 1"));
        }
        if !a.anomaly_sigma.is_finite() || a.anomaly_sigma <= 0.0 {
            return Err(Error::config("analytics.anomalySigma must be a positive number"));
        }
        Ok(())
    }
}

/// A delimiter is one ASCII character; `\t` and `tab` mean tab
fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "tab" => return Ok(b'\t'),
        _ => {}
    }
    match raw.as_bytes() {
        [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Ok(*b),
        _ => Err(Error::config(format!(
            "load.delimiter must be a single ASCII character, got {:?}",
            raw
        ))),
    }
}
