use chrono::{DateTime, Utc};

use crate::ids::UserId;

/// What a backend-issued session may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionScope {
    /// Full API access.
    #[default]
    General,
    /// Only valid to complete a password change.
    Recovery,
}

/// Backend-issued credential proving the user is signed in.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: UserId,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scope: SessionScope,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_recovery(&self) -> bool {
        self.scope == SessionScope::Recovery
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Session-change notification pushed by the authentication backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    /// A recovery link was consumed; the session (when known) is scoped to a
    /// password change only.
    PasswordRecovery(Option<Session>),
    TokenRefreshed(Session),
    UserUpdated,
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::PasswordRecovery(_) => "PASSWORD_RECOVERY",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated => "USER_UPDATED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn session(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            user_id: UserId(Uuid::nil()),
            email: Some("user@example.com".into()),
            expires_at,
            scope: SessionScope::General,
        }
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        assert!(session(Some(now)).is_expired(now));
        assert!(!session(Some(now + Duration::seconds(30))).is_expired(now));
        assert!(!session(None).is_expired(now));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", session(None));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("user@example.com"));
    }
}
