use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid {field} '{value}'")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid value '{value}' for {name}")]
    InvalidEnvValue { name: &'static str, value: String },
    #[error("{0} is not configured")]
    Missing(&'static str),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
