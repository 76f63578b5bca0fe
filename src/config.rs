//! Configuration types for transcript-harvest
//!
//! The settings file is a small JSON object loaded once at startup:
//!
//! ```json
//! {
//!   "inputCsvPath": "conversations.csv",
//!   "outputCsvPath": "transcripts.csv",
//!   "bearerToken": "…",
//!   "baseApiUrl": "https://api.example.com"
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default settings file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Hard ceiling on concurrently in-flight fetches
pub const MAX_CONCURRENT_FETCHES: usize = 5;

/// Number of buffered successes that triggers a flush to the output table
pub const BATCH_FLUSH_THRESHOLD: usize = 10;

/// Run settings. Immutable once loaded.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Input table listing one identifier per line (first column)
    pub input_csv_path: PathBuf,

    /// Output table, appended to
    pub output_csv_path: PathBuf,

    /// API credential sent as `Authorization: Bearer …`
    pub bearer_token: String,

    /// API origin, e.g. `https://api.mypurecloud.com`
    pub base_api_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("input_csv_path", &self.input_csv_path)
            .field("output_csv_path", &self.output_csv_path)
            .field("bearer_token", &"<redacted>")
            .field("base_api_url", &self.base_api_url)
            .finish()
    }
}

impl Config {
    /// Read, parse and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate settings from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw).map_err(|e| Error::Config {
            message: format!("malformed settings: {e}"),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field for values that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.input_csv_path.as_os_str().is_empty() {
            return Err(Error::config("inputCsvPath", "must not be empty"));
        }
        if self.output_csv_path.as_os_str().is_empty() {
            return Err(Error::config("outputCsvPath", "must not be empty"));
        }
        if self.bearer_token.trim().is_empty() {
            return Err(Error::config("bearerToken", "must not be empty"));
        }
        self.base_url()?;
        Ok(())
    }

    /// The API origin as a parsed, absolute http(s) URL.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(self.base_api_url.trim())
            .map_err(|e| Error::config("baseApiUrl", format!("not a valid URL: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::config(
                    "baseApiUrl",
                    format!("unsupported scheme '{other}', expected http or https"),
                ));
            }
        }
        if url.cannot_be_a_base() {
            return Err(Error::config("baseApiUrl", "must be an absolute base URL"));
        }
        Ok(url)
    }
}
