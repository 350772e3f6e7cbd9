//! Deep-link parameters that carry password-recovery evidence.

use url::Url;

use crate::error::Result;

const RECOVERY_TYPE: &str = "recovery";

/// Token and type extracted from the navigation context that opened the app.
///
/// Parameters are read from the query string first and from the URL fragment
/// second, since auth backends deliver them either way depending on the flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryLink {
    token: Option<String>,
    link_type: Option<String>,
    error_description: Option<String>,
}

impl RecoveryLink {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;
        let mut link = Self::default();

        for (key, value) in url.query_pairs() {
            link.absorb(&key, &value);
        }
        if let Some(fragment) = url.fragment() {
            for (key, value) in url::form_urlencoded::parse(fragment.as_bytes())
            {
                link.absorb(&key, &value);
            }
        }
        Ok(link)
    }

    /// Build a link directly from a token/type pair.
    pub fn new(token: impl Into<String>, link_type: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            link_type: Some(link_type.into()),
            error_description: None,
        }
    }

    fn absorb(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match key {
            "token" | "token_hash" => &mut self.token,
            "type" => &mut self.link_type,
            "error_description" => &mut self.error_description,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn link_type(&self) -> Option<&str> {
        self.link_type.as_deref()
    }

    /// Error the backend attached to the redirect instead of a token.
    pub fn error_description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }

    /// True when the link carries a recovery token that should be verified.
    pub fn is_recovery(&self) -> bool {
        self.link_type() == Some(RECOVERY_TYPE) && self.token.is_some()
    }

    /// True when the link was meant for recovery but arrived without a usable
    /// token (for example an expired OTP redirect).
    pub fn is_failed_recovery(&self) -> bool {
        self.error_description.is_some()
            && (self.link_type.is_none()
                || self.link_type() == Some(RECOVERY_TYPE))
            && self.token.is_none()
    }
}
