use std::path::PathBuf;

use cinelist_core::{ReadinessConfig, SessionConfig, SyncConfig};
use serde::{Deserialize, Serialize};

use crate::loader::ConfigLoadError;
use crate::util::{non_empty, parse_var};

/// Raw configuration as defined in a TOML or JSON file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub backend: FileBackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    pub redirect_url: Option<String>,
    pub sync_max_attempts: Option<u32>,
    pub sync_retry_delay_ms: Option<u64>,
}

impl EnvConfig {
    /// Reads the process environment.
    pub fn gather() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads variables through `lookup`, so callers can supply a fixed map.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigLoadError> {
        Ok(Self {
            config_path: non_empty(lookup("CINELIST_CONFIG_PATH"))
                .map(PathBuf::from),
            config_json: non_empty(lookup("CINELIST_CONFIG_JSON")),
            backend_url: non_empty(lookup("CINELIST_BACKEND_URL")),
            anon_key: non_empty(lookup("CINELIST_ANON_KEY")),
            redirect_url: non_empty(lookup("CINELIST_REDIRECT_URL")),
            sync_max_attempts: parse_var(
                "CINELIST_SYNC_MAX_ATTEMPTS",
                lookup("CINELIST_SYNC_MAX_ATTEMPTS"),
            )?,
            sync_retry_delay_ms: parse_var(
                "CINELIST_SYNC_RETRY_DELAY_MS",
                lookup("CINELIST_SYNC_RETRY_DELAY_MS"),
            )?,
        })
    }
}
