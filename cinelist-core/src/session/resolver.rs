use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cinelist_model::{AuthEvent, RecoveryLink};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::password::{LoginRedirect, validate_email, validate_new_password};
use super::reducer::{Evidence, EvidenceChannel, reduce};
use super::state::{SessionState, SessionStatus};
use crate::backend::{AuthBackend, AuthSubscription};
use crate::config::SessionConfig;
use crate::error::{BackendError, PasswordResetError, SessionError};

/// Single authority for "is there a usable session right now".
///
/// Evidence from the recovery link, session polls and pushed auth events is
/// merged with [`reduce`], so the first conclusive channel wins and late
/// negative results never override an established session. The event
/// listener runs until the resolver is dropped.
pub struct SessionResolver {
    backend: Arc<dyn AuthBackend>,
    config: SessionConfig,
    state: Arc<watch::Sender<SessionState>>,
    resolving: Arc<watch::Sender<bool>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("state", &*self.state.borrow())
            .field("resolving", &*self.resolving.borrow())
            .finish()
    }
}

enum PollOutcome {
    Found { recovery: bool },
    Absent,
    Failed(String),
}

impl SessionResolver {
    /// Creates the resolver and starts listening for auth events. Must be
    /// called from within a Tokio runtime.
    pub fn spawn(
        backend: Arc<dyn AuthBackend>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::default());
        let (resolving, _) = watch::channel(false);
        let resolver = Arc::new(Self {
            backend,
            config,
            state: Arc::new(state),
            resolving: Arc::new(resolving),
            listener: Mutex::new(None),
        });

        // Subscribe before spawning so nothing published in between is lost.
        let subscription = resolver.backend.subscribe();
        let handle =
            tokio::spawn(listen(subscription, Arc::clone(&resolver.state)));
        *resolver.listener.lock() = Some(handle);
        resolver
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_resolving(&self) -> bool {
        *self.resolving.borrow()
    }

    /// True while a resolution pass is running.
    pub fn subscribe_resolving(&self) -> watch::Receiver<bool> {
        self.resolving.subscribe()
    }

    /// Runs one resolution pass.
    ///
    /// With a recovery link the token is verified and no session poll is
    /// made. Without one the backend is polled, and polled once more after
    /// `poll_retry_delay` unless another channel concludes first.
    #[instrument(skip_all, fields(with_link = link.is_some()))]
    pub async fn resolve(
        &self,
        link: Option<&RecoveryLink>,
    ) -> Result<SessionState, SessionError> {
        let _pass = ResolvingGuard::enter(&self.resolving);

        if let Some(link) = link {
            if let Some(token) = link.token().filter(|_| link.is_recovery()) {
                return self.verify_link(token).await;
            }
            if link.is_failed_recovery() {
                warn!(
                    description = link.error_description().unwrap_or_default(),
                    "recovery link carries an error"
                );
                self.apply(Evidence::RecoveryRejected);
                return Err(SessionError::InvalidOrExpiredLink);
            }
            debug!("link is not a recovery link; polling instead");
        }

        self.poll_with_retry().await
    }

    /// [`resolve`](Self::resolve) with an upper bound. When the bound is hit
    /// the pass is abandoned, the state is left as it is and the resolving
    /// flag is cleared.
    pub async fn resolve_within(
        &self,
        link: Option<&RecoveryLink>,
        limit: Duration,
    ) -> Result<SessionState, SessionError> {
        match tokio::time::timeout(limit, self.resolve(link)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(?limit, "session resolution timed out");
                Err(SessionError::ResolutionTimedOut(limit))
            }
        }
    }

    /// Resolution bounded by the configured `resolve_timeout`.
    pub async fn resolve_default(
        &self,
        link: Option<&RecoveryLink>,
    ) -> Result<SessionState, SessionError> {
        self.resolve_within(link, self.config.resolve_timeout()).await
    }

    /// Changes the password of a recovery session, then signs the recovery
    /// session out so it cannot be reused.
    #[instrument(skip_all)]
    pub async fn complete_password_reset(
        &self,
        new_password: &str,
        confirmation: &str,
    ) -> Result<LoginRedirect, PasswordResetError> {
        if !self.state.borrow().is_recovery_only() {
            return Err(PasswordResetError::NotInRecovery);
        }
        validate_new_password(
            new_password,
            confirmation,
            self.config.min_password_len,
        )?;

        self.backend.update_password(new_password).await?;
        info!("password updated");

        if let Err(err) = self.sign_out().await {
            warn!(error = %err, "failed to revoke recovery session");
        }
        Ok(LoginRedirect::after(self.config.login_redirect_delay()))
    }

    #[instrument(skip_all)]
    pub async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), PasswordResetError> {
        validate_email(email)?;
        self.backend
            .request_password_reset(email.trim(), redirect_to)
            .await?;
        info!("password recovery email requested");
        Ok(())
    }

    /// Ends the session locally whether or not the backend call succeeds.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let result = self.backend.sign_out().await;
        self.apply(Evidence::SignedOut);
        result
    }

    /// Records that the backend stopped accepting the current session.
    pub fn expire(&self) {
        self.apply(Evidence::Expired);
    }

    pub(crate) fn apply(&self, evidence: Evidence) -> bool {
        apply(&self.state, evidence)
    }

    async fn verify_link(
        &self,
        token: &str,
    ) -> Result<SessionState, SessionError> {
        match self.backend.verify_recovery_token(token).await {
            Ok(_) => {
                self.apply(Evidence::RecoveryVerified);
                Ok(self.state())
            }
            Err(err) if err.is_transient() => {
                let message = err.to_string();
                self.apply(Evidence::TransportFailed {
                    channel: EvidenceChannel::RecoveryLink,
                    message: message.clone(),
                });
                Err(SessionError::VerificationTransport(message))
            }
            Err(err) => {
                debug!(error = %err, "recovery token rejected");
                self.apply(Evidence::RecoveryRejected);
                Err(SessionError::InvalidOrExpiredLink)
            }
        }
    }

    async fn poll_with_retry(&self) -> Result<SessionState, SessionError> {
        match self.poll_once().await {
            PollOutcome::Found { recovery } => {
                self.apply(Evidence::SessionFound { recovery });
                return self.conclusion();
            }
            PollOutcome::Absent => debug!("no session on first poll"),
            PollOutcome::Failed(message) => {
                debug!(%message, "first session poll failed")
            }
        }

        let mut changes = self.state.subscribe();
        let delay = self.config.poll_retry_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = changes.wait_for(|s| s.is_usable()) => {
                debug!("another channel established the session");
                return self.conclusion();
            }
        }

        let evidence = match self.poll_once().await {
            PollOutcome::Found { recovery } => {
                Evidence::SessionFound { recovery }
            }
            PollOutcome::Absent => Evidence::SessionAbsent,
            PollOutcome::Failed(message) => Evidence::TransportFailed {
                channel: EvidenceChannel::SessionPoll,
                message,
            },
        };
        self.apply(evidence);
        self.conclusion()
    }

    async fn poll_once(&self) -> PollOutcome {
        match self.backend.get_session().await {
            Ok(Some(session)) if !session.is_expired(Utc::now()) => {
                PollOutcome::Found {
                    recovery: session.is_recovery(),
                }
            }
            Ok(_) => PollOutcome::Absent,
            Err(err) => PollOutcome::Failed(err.to_string()),
        }
    }

    fn conclusion(&self) -> Result<SessionState, SessionError> {
        let state = self.state();
        match state.status {
            SessionStatus::Authenticated | SessionStatus::RecoveryOnly => {
                Ok(state)
            }
            SessionStatus::Unauthenticated | SessionStatus::Unknown => {
                Err(state.error.unwrap_or(SessionError::NoActiveSession))
            }
        }
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}

fn apply(state: &watch::Sender<SessionState>, evidence: Evidence) -> bool {
    let now = Utc::now();
    state.send_if_modified(|current| match reduce(current, &evidence, now) {
        Some(next) => {
            info!(
                channel = ?evidence.channel(),
                from = %current.status,
                to = %next.status,
                generation = next.generation,
                "session state changed"
            );
            *current = next;
            true
        }
        None => {
            debug!(
                channel = ?evidence.channel(),
                status = %current.status,
                ?evidence,
                "evidence did not change session state"
            );
            false
        }
    })
}

fn evidence_for(event: &AuthEvent) -> Option<Evidence> {
    match event {
        AuthEvent::SignedIn(session) if session.is_recovery() => {
            Some(Evidence::PasswordRecoveryEvent)
        }
        AuthEvent::SignedIn(_) => Some(Evidence::SignedInEvent),
        AuthEvent::PasswordRecovery(_) => Some(Evidence::PasswordRecoveryEvent),
        AuthEvent::TokenRefreshed(session) => Some(Evidence::SessionFound {
            recovery: session.is_recovery(),
        }),
        AuthEvent::SignedOut => Some(Evidence::SignedOut),
        AuthEvent::UserUpdated => None,
    }
}

async fn listen(
    mut subscription: AuthSubscription,
    state: Arc<watch::Sender<SessionState>>,
) {
    while let Some(event) = subscription.next().await {
        debug!(event = event.name(), "auth event received");
        if let Some(evidence) = evidence_for(&event) {
            apply(&state, evidence);
        }
    }
    debug!("auth event stream closed");
}

/// Holds the resolving flag high for the lifetime of a pass, including a
/// pass cancelled by a timeout.
struct ResolvingGuard<'a> {
    flag: &'a watch::Sender<bool>,
}

impl<'a> ResolvingGuard<'a> {
    fn enter(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self { flag }
    }
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.flag.send_replace(false);
    }
}
