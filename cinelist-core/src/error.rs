use std::fmt;
use std::time::Duration;

use cinelist_model::CollectionId;
use thiserror::Error;

/// What the user can do about a surfaced error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Remediation {
    /// Ask for a fresh password-recovery email.
    RequestNewLink,
    /// Sign in again (or request a new link when recovering a password).
    SignIn,
    /// Try the same operation again.
    Retry,
}

/// Failures reported by the authentication or list-storage backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no active session")]
    NoSession,
}

impl BackendError {
    /// Network-level or server-side failures that may succeed on a later try.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Rejected { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            _ => false,
        }
    }

    /// The backend no longer accepts the session's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            BackendError::Unauthorized
                | BackendError::Rejected {
                    status: 401 | 403,
                    ..
                }
        )
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Why a resolution pass concluded that no usable session exists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("reset link invalid or expired")]
    InvalidOrExpiredLink,

    #[error(
        "no active session found; request a new recovery link or log in again"
    )]
    NoActiveSession,

    #[error("could not reach the authentication service: {0}")]
    VerificationTransport(String),

    #[error("session resolution did not settle within {0:?}")]
    ResolutionTimedOut(Duration),
}

impl SessionError {
    pub fn remediation(&self) -> Remediation {
        match self {
            SessionError::InvalidOrExpiredLink => Remediation::RequestNewLink,
            SessionError::NoActiveSession => Remediation::SignIn,
            SessionError::VerificationTransport(_)
            | SessionError::ResolutionTimedOut(_) => Remediation::Retry,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.remediation() == Remediation::Retry
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PasswordResetError {
    #[error("password reset requires a recovery session")]
    NotInRecovery,

    #[error("please enter a new password")]
    Empty,

    #[error("password must be at least {min} characters")]
    TooShort { min: usize },

    #[error("passwords do not match")]
    Mismatch,

    #[error("please enter a valid email address")]
    InvalidEmail,

    #[error("password reset failed: {0}")]
    Backend(#[from] BackendError),
}

/// One collection that failed during a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFailure {
    pub collection: CollectionId,
    pub error: BackendError,
}

impl fmt::Display for CollectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.collection, self.error)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("sync requires an authenticated session")]
    NotAuthenticated,

    #[error("a sync is already in progress")]
    AlreadyInProgress,

    #[error("sync failed for {}", join_failures(.0))]
    Collections(Vec<CollectionFailure>),

    #[error("session changed while syncing; results were discarded")]
    SessionChanged,

    #[error("sync failed after {attempts} attempts: {last}")]
    Terminal { attempts: u32, last: Box<SyncError> },
}

impl SyncError {
    pub fn remediation(&self) -> Remediation {
        match self {
            SyncError::NotAuthenticated => Remediation::SignIn,
            _ => Remediation::Retry,
        }
    }

    /// Terminal errors stop automatic retries and wait for the user.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncError::Terminal { .. })
    }

    /// Whether another automatic attempt could succeed. A pass in which
    /// every collection failed permanently is not worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Collections(failures) => {
                failures.iter().any(|f| f.error.is_transient())
            }
            SyncError::SessionChanged => true,
            SyncError::NotAuthenticated
            | SyncError::AlreadyInProgress
            | SyncError::Terminal { .. } => false,
        }
    }

    /// A collection failed because the session was rejected.
    pub fn session_rejected(&self) -> bool {
        self.failures().iter().any(|f| f.error.is_unauthorized())
    }

    pub fn failures(&self) -> &[CollectionFailure] {
        match self {
            SyncError::Collections(failures) => failures,
            SyncError::Terminal { last, .. } => last.failures(),
            _ => &[],
        }
    }

    pub fn failed_collections(&self) -> Vec<&CollectionId> {
        self.failures().iter().map(|f| &f.collection).collect()
    }
}

fn join_failures(failures: &[CollectionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_session_error_maps_to_its_remediation() {
        assert_eq!(
            SessionError::InvalidOrExpiredLink.remediation(),
            Remediation::RequestNewLink
        );
        assert_eq!(
            SessionError::NoActiveSession.remediation(),
            Remediation::SignIn
        );
        assert_eq!(
            SessionError::VerificationTransport("down".into()).remediation(),
            Remediation::Retry
        );
    }

    #[test]
    fn terminal_sync_error_lists_failed_collections() {
        let err = SyncError::Terminal {
            attempts: 3,
            last: Box::new(SyncError::Collections(vec![CollectionFailure {
                collection: CollectionId::watched(),
                error: BackendError::Transport("timeout".into()),
            }])),
        };
        assert!(err.is_terminal());
        assert_eq!(err.failed_collections(), vec![&CollectionId::watched()]);
        assert_eq!(
            err.to_string(),
            "sync failed after 3 attempts: sync failed for watched (transport error: timeout)"
        );
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(BackendError::Transport("reset".into()).is_transient());
        assert!(
            BackendError::Rejected {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !BackendError::Rejected {
                status: 400,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!BackendError::Unauthorized.is_transient());
    }

    fn failed(
        collection: CollectionId,
        error: BackendError,
    ) -> CollectionFailure {
        CollectionFailure { collection, error }
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let rejected = SyncError::Collections(vec![
            failed(CollectionId::watchlist(), BackendError::Unauthorized),
            failed(
                CollectionId::watched(),
                BackendError::Rejected {
                    status: 403,
                    message: "permission denied".into(),
                },
            ),
        ]);
        assert!(!rejected.is_retryable());
        assert!(rejected.session_rejected());

        let mixed = SyncError::Collections(vec![
            failed(
                CollectionId::watchlist(),
                BackendError::Rejected {
                    status: 422,
                    message: String::new(),
                },
            ),
            failed(
                CollectionId::watched(),
                BackendError::Transport("eof".into()),
            ),
        ]);
        assert!(mixed.is_retryable());
        assert!(!mixed.session_rejected());
    }
}
