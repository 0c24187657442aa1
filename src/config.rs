//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default ledger location, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "./data/ingest-ledger.db";

/// Ambient settings read from the environment.
///
/// Per-run parameters (address, window, flags) come from the command line;
/// this covers what stays the same across runs.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Timeout applied to every Gmail and agent HTTP request.
    pub http_timeout: Duration,
    /// API key sent to the agent deployment as `x-api-key`.
    pub agent_api_key: Option<SecretString>,
    /// Directory for daily-rolling log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            agent_api_key: None,
            log_dir: None,
        }
    }
}

impl IngestConfig {
    /// Read `INGEST_HTTP_TIMEOUT_SECS`, `LANGGRAPH_API_KEY` (falling back to
    /// `LANGSMITH_API_KEY`) and `INGEST_LOG_DIR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let http_timeout = match get("INGEST_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "INGEST_HTTP_TIMEOUT_SECS".into(),
                    message: format!("'{raw}' is not a whole number of seconds"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "INGEST_HTTP_TIMEOUT_SECS".into(),
                        message: "timeout must be positive".into(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.http_timeout,
        };

        let agent_api_key = get("LANGGRAPH_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .or_else(|| get("LANGSMITH_API_KEY").filter(|k| !k.trim().is_empty()))
            .map(SecretString::from);

        let log_dir = get("INGEST_LOG_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            http_timeout,
            agent_api_key,
            log_dir,
        })
    }
}
