use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use cinelist_model::{AuthEvent, Session, SessionScope, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{RestClient, SessionHandle};
use crate::backend::{
    AuthBackend, AuthEventBus, AuthSubscription, BackendResult,
};
use crate::error::BackendError;

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserPayload,
}

impl SessionPayload {
    fn into_session(self, scope: SessionScope) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + ChronoDuration::seconds(secs))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: UserId(self.user.id),
            email: self.user.email,
            expires_at,
            scope,
        }
    }
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    token_hash: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateUserRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RecoverRequest<'a> {
    email: &'a str,
}

/// Session backend speaking the hosted `/auth/v1` endpoints.
///
/// The current session lives in memory only; persisting it across restarts is
/// the embedding application's concern.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    rest: RestClient,
    session: SessionHandle,
    events: AuthEventBus,
}

impl HttpAuthBackend {
    pub fn new(rest: RestClient) -> Self {
        Self {
            rest,
            session: SessionHandle::default(),
            events: AuthEventBus::new(),
        }
    }

    /// Shared handle to the current session, for the list store.
    pub fn session_handle(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Restore a previously obtained session, e.g. from a redirect callback.
    pub fn restore_session(&self, session: Session) {
        let event = if session.is_recovery() {
            AuthEvent::PasswordRecovery(Some(session.clone()))
        } else {
            AuthEvent::SignedIn(session.clone())
        };
        *self.session.write() = Some(session);
        self.events.publish(event);
    }

    /// Password sign-in. Pass-through to the backend; nothing is stored on
    /// disk.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> BackendResult<Session> {
        let request = self
            .rest
            .authorize(self.rest.post("auth/v1/token"), None)
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password });
        let payload: SessionPayload = self.rest.execute_json(request).await?;
        let session = payload.into_session(SessionScope::General);
        *self.session.write() = Some(session.clone());
        info!(user_id = %session.user_id, "signed in");
        self.events.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        scope: SessionScope,
    ) -> BackendResult<Session> {
        let request = self
            .rest
            .authorize(self.rest.post("auth/v1/token"), None)
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshGrant { refresh_token });
        let payload: SessionPayload = self.rest.execute_json(request).await?;
        let session = payload.into_session(scope);
        *self.session.write() = Some(session.clone());
        self.events.publish(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    fn current(&self) -> Option<Session> {
        self.session.read().clone()
    }

    fn current_or_err(&self) -> BackendResult<Session> {
        self.current().ok_or(BackendError::NoSession)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }
        match session.refresh_token.as_deref() {
            Some(token) => match self.refresh(token, session.scope).await {
                Ok(refreshed) => Ok(Some(refreshed)),
                Err(BackendError::Unauthorized)
                | Err(BackendError::Rejected { .. }) => {
                    warn!("stored session expired and could not be refreshed");
                    *self.session.write() = None;
                    self.events.publish(AuthEvent::SignedOut);
                    Ok(None)
                }
                Err(other) => Err(other),
            },
            // Expired without a way to refresh; hand it back and let the
            // caller treat it as unusable.
            None => Ok(Some(session)),
        }
    }

    #[instrument(skip(self, token))]
    async fn verify_recovery_token(
        &self,
        token: &str,
    ) -> BackendResult<Session> {
        let request = self
            .rest
            .authorize(self.rest.post("auth/v1/verify"), None)
            .json(&VerifyRequest {
                kind: "recovery",
                token_hash: token,
            });
        let payload: SessionPayload = self.rest.execute_json(request).await?;
        let session = payload.into_session(SessionScope::Recovery);
        *self.session.write() = Some(session.clone());
        info!(user_id = %session.user_id, "recovery token verified");
        self.events
            .publish(AuthEvent::PasswordRecovery(Some(session.clone())));
        Ok(session)
    }

    #[instrument(skip(self, new_password))]
    async fn update_password(&self, new_password: &str) -> BackendResult<()> {
        let session = self.current_or_err()?;
        let request = self
            .rest
            .authorize(self.rest.put("auth/v1/user"), Some(&session))
            .json(&UpdateUserRequest {
                password: new_password,
            });
        let _: UserPayload = self.rest.execute_json(request).await?;
        self.events.publish(AuthEvent::UserUpdated);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> BackendResult<()> {
        let session = self.session.write().take();
        if let Some(session) = session {
            let request = self
                .rest
                .authorize(self.rest.post("auth/v1/logout"), Some(&session));
            // The local session is gone either way; a failed revoke only
            // leaves a server-side token that expires on its own.
            if let Err(err) = self.rest.execute_empty(request).await {
                warn!(error = %err, "remote sign-out failed");
            }
        }
        self.events.publish(AuthEvent::SignedOut);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> BackendResult<()> {
        let mut request = self
            .rest
            .authorize(self.rest.post("auth/v1/recover"), None)
            .json(&RecoverRequest { email });
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        self.rest.execute_empty(request).await
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }
}
