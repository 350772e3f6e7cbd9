use crate::models::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.items.iter().any(|w| w.message.contains(needle))
    }
}

/// Suspicious but loadable settings.
pub fn collect_warnings(config: &ClientConfig) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();
    let backend = &config.backend;
    let core = &config.core;

    match &backend.url {
        None => warnings.push_with_hint(
            "backend.url not configured; commands that talk to the backend will fail",
            "Set CINELIST_BACKEND_URL or backend.url in cinelist.toml",
        ),
        Some(url)
            if url.scheme() == "http"
                && !matches!(
                    url.host_str(),
                    Some("localhost" | "127.0.0.1" | "::1")
                ) =>
        {
            warnings.push_with_hint(
                format!("backend.url {url} does not use https"),
                "Session tokens are sent with every request",
            )
        }
        Some(_) => {}
    }

    if backend.anon_key.is_none() {
        warnings.push_with_hint(
            "backend.anon_key not configured",
            "Set CINELIST_ANON_KEY to the project's public API key",
        );
    }

    if backend.request_timeout_ms == 0 {
        warnings.push("backend.request_timeout_ms is 0; requests time out immediately");
    }

    if core.sync.max_attempts == 0 {
        warnings.push("sync.max_attempts is 0; a single attempt will be made");
    }

    if core.readiness.debounce_ms > core.readiness.ceiling_ms {
        warnings.push(format!(
            "readiness.debounce_ms ({}) exceeds readiness.ceiling_ms ({}); the ceiling will always win",
            core.readiness.debounce_ms, core.readiness.ceiling_ms
        ));
    }

    if core.session.min_password_len < 6 {
        warnings.push(format!(
            "session.min_password_len is {}; passwords shorter than 6 characters are weak",
            core.session.min_password_len
        ));
    }

    warnings
}
