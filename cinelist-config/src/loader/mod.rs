//! Configuration resolution.
//!
//! File-level settings come from the first of: an explicit path,
//! `$CINELIST_CONFIG_PATH` (TOML or JSON), `$CINELIST_CONFIG_JSON` (inline
//! JSON), one of the well-known file locations, or built-in defaults.
//! Individual environment variables are applied on top.

mod error;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use cinelist_core::CoreConfig;
use tracing::{debug, info};
use url::Url;

pub use error::ConfigLoadError;

use crate::models::sources::{EnvConfig, FileConfig};
use crate::models::{
    BackendConfig, ClientConfig, ConfigMetadata, ConfigSource,
    DEFAULT_REQUEST_TIMEOUT_MS,
};
use crate::validation::{ConfigWarnings, collect_warnings};

const DEFAULT_FILES: &[&str] = &[
    "cinelist.toml",
    "cinelist.json",
    "config/cinelist.toml",
    "config/cinelist.json",
];

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: ClientConfig,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env: Option<EnvConfig>,
    load_env_file: bool,
    search_default_files: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env: None,
            load_env_file: true,
            search_default_files: true,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Uses `env` instead of the process environment. Also skips `.env`.
    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = Some(env);
        self.load_env_file = false;
        self
    }

    pub fn load_env_file(mut self, enabled: bool) -> Self {
        self.load_env_file = enabled;
        self
    }

    pub fn search_default_files(mut self, enabled: bool) -> Self {
        self.search_default_files = enabled;
        self
    }

    pub fn load(self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file && load_dotenv()?;
        let env = match self.env.clone() {
            Some(env) => env,
            None => EnvConfig::gather()?,
        };

        let (file, source) = self.resolve_file(&env)?;
        debug!(?source, "resolved config source");

        let config = ClientConfig {
            backend: backend_config(&file, &env)?,
            core: core_config(file, &env),
            metadata: ConfigMetadata {
                source,
                env_file_loaded,
            },
        };
        let warnings = collect_warnings(&config);
        Ok(ConfigLoad { config, warnings })
    }

    fn resolve_file(
        &self,
        env: &EnvConfig,
    ) -> Result<(FileConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.config_path {
            let file = load_from_file(path)?;
            return Ok((file, ConfigSource::Explicit(path.clone())));
        }

        if let Some(path) = &env.config_path {
            let file = load_from_file(path)?;
            return Ok((file, ConfigSource::EnvPath(path.clone())));
        }

        if let Some(raw) = &env.config_json {
            let file = parse_json(raw, "CINELIST_CONFIG_JSON")?;
            return Ok((file, ConfigSource::EnvInline));
        }

        if self.search_default_files
            && let Some(path) = find_default_file()
        {
            let file = load_from_file(&path)?;
            return Ok((file, ConfigSource::File(path)));
        }

        Ok((FileConfig::default(), ConfigSource::Default))
    }
}

fn load_dotenv() -> Result<bool, ConfigLoadError> {
    match dotenvy::dotenv() {
        Ok(path) => {
            info!(path = %path.display(), "loaded .env file");
            Ok(true)
        }
        Err(err) if err.not_found() => Ok(false),
        Err(err) => Err(err.into()),
    }
}

pub fn load_from_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") => {
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                origin,
                source: err.into(),
            })
        }
        _ => parse_from_str(&contents, &origin),
    }
}

/// Tries TOML first, then JSON.
pub fn parse_from_str(
    contents: &str,
    origin: &str,
) -> Result<FileConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            ConfigLoadError::Parse {
                origin: origin.to_string(),
                source: anyhow!(
                    "toml error: {toml_err}; json error: {json_err}"
                ),
            }
        })
    })
}

fn parse_json(raw: &str, origin: &str) -> Result<FileConfig, ConfigLoadError> {
    serde_json::from_str(raw).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        source: err.into(),
    })
}

fn find_default_file() -> Option<PathBuf> {
    DEFAULT_FILES
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
}

fn backend_config(
    file: &FileConfig,
    env: &EnvConfig,
) -> Result<BackendConfig, ConfigLoadError> {
    let url = env
        .backend_url
        .clone()
        .or_else(|| file.backend.url.clone())
        .map(|raw| parse_url("backend.url", raw))
        .transpose()?;
    let redirect_url = env
        .redirect_url
        .clone()
        .or_else(|| file.backend.redirect_url.clone())
        .map(|raw| parse_url("backend.redirect_url", raw))
        .transpose()?;

    Ok(BackendConfig {
        url,
        anon_key: env.anon_key.clone().or_else(|| file.backend.anon_key.clone()),
        redirect_url,
        request_timeout_ms: file
            .backend
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
    })
}

fn core_config(file: FileConfig, env: &EnvConfig) -> CoreConfig {
    let mut core = CoreConfig {
        session: file.session,
        sync: file.sync,
        readiness: file.readiness,
    };
    if let Some(attempts) = env.sync_max_attempts {
        core.sync.max_attempts = attempts;
    }
    if let Some(delay) = env.sync_retry_delay_ms {
        core.sync.retry_delay_ms = delay;
    }
    core
}

// Bare hosts like "localhost:54321" get an http scheme so they parse.
fn parse_url(field: &'static str, raw: String) -> Result<Url, ConfigLoadError> {
    let candidate = if raw.contains("://") {
        raw.clone()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&candidate).map_err(|source| ConfigLoadError::InvalidUrl {
        field,
        value: raw,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gains_a_scheme() {
        let url = parse_url("backend.url", "localhost:54321".into()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/");
    }

    #[test]
    fn unknown_extension_falls_back_to_json() {
        let file = parse_from_str(
            r#"{"backend": {"url": "https://x.example"}}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(file.backend.url.as_deref(), Some("https://x.example"));
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = parse_from_str("{{nope", "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("toml error"), "{message}");
        assert!(message.contains("json error"), "{message}");
    }
}
