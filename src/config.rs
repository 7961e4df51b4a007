use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Client configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend root, without a trailing slash.
    pub api_base_url: String,
    /// Run against the in-process mock backend instead of `api_base_url`.
    pub use_mock: bool,
    /// Where auth state is persisted. `None` uses the platform data dir.
    pub storage_dir: Option<PathBuf>,
    /// Per-request timeout. Requests are unbounded when unset.
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            use_mock: false,
            storage_dir: None,
            request_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = lookup("PARLEY_API_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let use_mock = matches!(
            lookup("PARLEY_USE_MOCK")
                .unwrap_or_else(|| "false".into())
                .to_ascii_lowercase()
                .as_str(),
            "1" | "true" | "yes" | "on"
        );

        let request_timeout = lookup("PARLEY_REQUEST_TIMEOUT_SECS")
            .map(|secs| -> Result<Duration> {
                let secs = secs
                    .trim()
                    .parse::<u64>()
                    .context("Invalid PARLEY_REQUEST_TIMEOUT_SECS")?;
                anyhow::ensure!(secs > 0, "PARLEY_REQUEST_TIMEOUT_SECS must be at least 1");
                Ok(Duration::from_secs(secs))
            })
            .transpose()?;

        Ok(Config {
            api_base_url,
            use_mock,
            storage_dir: lookup("PARLEY_STORAGE_DIR").map(PathBuf::from),
            request_timeout,
        })
    }
}
