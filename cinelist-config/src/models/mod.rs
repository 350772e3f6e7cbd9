pub mod sources;

use std::path::PathBuf;
use std::time::Duration;

use cinelist_core::CoreConfig;
use serde::Serialize;
use url::Url;

use crate::util::redact;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub core: CoreConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: Option<Url>,
    pub anon_key: Option<String>,
    /// Where password-recovery emails send the user.
    pub redirect_url: Option<Url>,
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            redirect_url: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Source that produced the file-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// Path passed explicitly by the caller.
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    /// One of the well-known file locations.
    File(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConfigSource::Explicit(path)
            | ConfigSource::EnvPath(path)
            | ConfigSource::File(path) => Some(path),
            ConfigSource::Default | ConfigSource::EnvInline => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

#[derive(Serialize)]
struct PrintableBackend<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anon_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_url: Option<&'a str>,
    request_timeout_ms: u64,
}

#[derive(Serialize)]
struct PrintableConfig<'a> {
    backend: PrintableBackend<'a>,
    #[serde(flatten)]
    core: &'a CoreConfig,
}

impl ClientConfig {
    /// Effective configuration as TOML, with the API key masked.
    pub fn to_redacted_toml(&self) -> anyhow::Result<String> {
        let printable = PrintableConfig {
            backend: PrintableBackend {
                url: self.backend.url.as_ref().map(Url::as_str),
                anon_key: self.backend.anon_key.as_deref().map(redact),
                redirect_url: self
                    .backend
                    .redirect_url
                    .as_ref()
                    .map(Url::as_str),
                request_timeout_ms: self.backend.request_timeout_ms,
            },
            core: &self.core,
        };
        Ok(toml::to_string_pretty(&printable)?)
    }
}
