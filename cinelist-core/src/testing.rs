//! In-memory backends for tests and demos.
//!
//! Both fakes count their calls and can be told to fail, hide data or add
//! latency so timer-driven behavior can be exercised under a paused clock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cinelist_model::{
    AuthEvent, CollectionId, ListItem, Session, SessionScope, UserId,
};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::backend::{
    AuthBackend, AuthEventBus, AuthSubscription, BackendResult, ListStore,
};
use crate::error::BackendError;

pub fn test_session(scope: SessionScope) -> Session {
    Session {
        access_token: format!("access-{}", Uuid::new_v4()),
        refresh_token: Some("refresh".into()),
        user_id: UserId(Uuid::from_u128(0x5eed)),
        email: Some("user@example.com".into()),
        expires_at: None,
        scope,
    }
}

#[derive(Debug, Default)]
struct AuthInner {
    session: Option<Session>,
    valid_tokens: HashSet<String>,
    hidden_polls: usize,
    failing_polls: usize,
    latency: Duration,
    password: Option<String>,
    recovery_requests: Vec<String>,
    update_password_error: Option<BackendError>,
    verify_error: Option<BackendError>,
}

#[derive(Debug, Default)]
pub struct InMemoryAuthBackend {
    inner: Mutex<AuthInner>,
    events: AuthEventBus,
    get_session_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    update_password_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `token` verifiable as a recovery token.
    pub fn accept_recovery_token(&self, token: &str) {
        self.inner.lock().valid_tokens.insert(token.to_string());
    }

    /// Stores a general session without announcing it.
    pub fn set_general_session(&self) -> Session {
        let session = test_session(SessionScope::General);
        self.inner.lock().session = Some(session.clone());
        session
    }

    /// Stores a session and pushes the matching event.
    pub fn sign_in(&self) -> Session {
        let session = self.set_general_session();
        self.events.publish(AuthEvent::SignedIn(session.clone()));
        session
    }

    /// Pushes an arbitrary event to subscribers.
    pub fn emit(&self, event: AuthEvent) {
        self.events.publish(event);
    }

    /// The next `polls` calls to `get_session` report no session.
    pub fn hide_session_for_polls(&self, polls: usize) {
        self.inner.lock().hidden_polls = polls;
    }

    /// The next `polls` calls to `get_session` fail with a transport error.
    pub fn fail_polls(&self, polls: usize) {
        self.inner.lock().failing_polls = polls;
    }

    pub fn fail_verification(&self, error: BackendError) {
        self.inner.lock().verify_error = Some(error);
    }

    pub fn fail_password_update(&self, error: BackendError) {
        self.inner.lock().update_password_error = Some(error);
    }

    /// Delay applied to every backend call.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.lock().session.clone()
    }

    pub fn password(&self) -> Option<String> {
        self.inner.lock().password.clone()
    }

    pub fn recovery_requests(&self) -> Vec<String> {
        self.inner.lock().recovery_requests.clone()
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn update_password_calls(&self) -> usize {
        self.update_password_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = self.inner.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let mut inner = self.inner.lock();
        if inner.failing_polls > 0 {
            inner.failing_polls -= 1;
            return Err(BackendError::Transport("connection reset".into()));
        }
        if inner.hidden_polls > 0 {
            inner.hidden_polls -= 1;
            return Ok(None);
        }
        Ok(inner.session.clone())
    }

    async fn verify_recovery_token(
        &self,
        token: &str,
    ) -> BackendResult<Session> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let session = {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.verify_error.clone() {
                return Err(err);
            }
            if !inner.valid_tokens.remove(token) {
                return Err(BackendError::Rejected {
                    status: 403,
                    message: "Token has expired or is invalid".into(),
                });
            }
            let session = test_session(SessionScope::Recovery);
            inner.session = Some(session.clone());
            session
        };
        self.events
            .publish(AuthEvent::PasswordRecovery(Some(session.clone())));
        Ok(session)
    }

    async fn update_password(&self, new_password: &str) -> BackendResult<()> {
        self.update_password_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.update_password_error.clone() {
                return Err(err);
            }
            if inner.session.is_none() {
                return Err(BackendError::NoSession);
            }
            inner.password = Some(new_password.to_string());
        }
        self.events.publish(AuthEvent::UserUpdated);
        Ok(())
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.inner.lock().session = None;
        self.events.publish(AuthEvent::SignedOut);
        Ok(())
    }

    async fn request_password_reset(
        &self,
        email: &str,
        _redirect_to: Option<&str>,
    ) -> BackendResult<()> {
        self.delay().await;
        self.inner.lock().recovery_requests.push(email.to_string());
        Ok(())
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }
}

#[derive(Debug, Default)]
struct ListInner {
    lists: HashMap<CollectionId, Vec<ListItem>>,
    failing: HashMap<CollectionId, BackendError>,
    latency: Duration,
}

/// Remote list storage kept in a map.
#[derive(Debug, Default)]
pub struct InMemoryListStore {
    inner: Mutex<ListInner>,
    fetch_calls: AtomicUsize,
    push_calls: AtomicUsize,
}

impl InMemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, collection: CollectionId, items: Vec<ListItem>) {
        self.inner.lock().lists.insert(collection, items);
    }

    pub fn list(&self, collection: &CollectionId) -> Vec<ListItem> {
        self.inner
            .lock()
            .lists
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call touching `collection` fails until [`heal`](Self::heal).
    pub fn fail(&self, collection: CollectionId) {
        let error = BackendError::Rejected {
            status: 503,
            message: format!("{collection} unavailable"),
        };
        self.fail_with(collection, error);
    }

    /// Like [`fail`](Self::fail) with a chosen error.
    pub fn fail_with(&self, collection: CollectionId, error: BackendError) {
        self.inner.lock().failing.insert(collection, error);
    }

    pub fn heal(&self, collection: &CollectionId) {
        self.inner.lock().failing.remove(collection);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.fetch_calls() + self.push_calls()
    }

    async fn enter(&self, collection: &CollectionId) -> BackendResult<()> {
        let latency = self.inner.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.inner.lock().failing.get(collection) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ListStore for InMemoryListStore {
    async fn fetch_list(
        &self,
        collection: &CollectionId,
    ) -> BackendResult<Vec<ListItem>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(collection).await?;
        Ok(self.list(collection))
    }

    async fn push_list(
        &self,
        collection: &CollectionId,
        items: &[ListItem],
    ) -> BackendResult<()> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(collection).await?;
        self.inner
            .lock()
            .lists
            .insert(collection.clone(), items.to_vec());
        Ok(())
    }
}
