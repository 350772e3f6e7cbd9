//! Backend contracts the core consumes.
//!
//! The authentication backend is the authority for sessions and password
//! changes; the list store is the authority for the remote copy of each
//! collection. The core only talks to them through these traits so tests and
//! demos can swap in the in-memory implementations from `crate::testing`.

use async_trait::async_trait;
use cinelist_model::{CollectionId, ListItem, Session};

use crate::error::BackendError;

pub mod events;
pub mod http;

pub use events::{AuthEventBus, AuthSubscription};

pub type BackendResult<T> = Result<T, BackendError>;

/// Authentication/session backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current session, if any. Expired sessions may be returned; callers
    /// decide whether they are usable.
    async fn get_session(&self) -> BackendResult<Option<Session>>;

    /// Exchange a recovery token for a recovery-scoped session.
    async fn verify_recovery_token(&self, token: &str)
    -> BackendResult<Session>;

    /// Change the password of the user owning the current session.
    async fn update_password(&self, new_password: &str) -> BackendResult<()>;

    /// Invalidate the current session.
    async fn sign_out(&self) -> BackendResult<()>;

    /// Send a password-recovery email whose link opens `redirect_to`.
    async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> BackendResult<()>;

    /// Subscribe to session-change notifications. Dropping the subscription
    /// unsubscribes.
    fn subscribe(&self) -> AuthSubscription;
}

/// Remote storage for the user's collections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListStore: Send + Sync {
    async fn fetch_list(
        &self,
        collection: &CollectionId,
    ) -> BackendResult<Vec<ListItem>>;

    /// Replace the remote copy of `collection` with `items`.
    async fn push_list(
        &self,
        collection: &CollectionId,
        items: &[ListItem],
    ) -> BackendResult<()>;
}
