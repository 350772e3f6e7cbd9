use std::str::FromStr;

use crate::loader::ConfigLoadError;

/// Treats blank values like unset ones.
pub fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parses an optional environment value, rejecting malformed input instead
/// of silently falling back to the default.
pub fn parse_var<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, ConfigLoadError> {
    match non_empty(raw) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigLoadError::InvalidEnvValue { name, value }),
    }
}

/// Masks all but the first four characters of a secret.
pub fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}
