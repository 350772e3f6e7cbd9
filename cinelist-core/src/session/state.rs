use chrono::{DateTime, Utc};

use crate::error::SessionError;

/// Whether the client currently holds a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// No evidence has concluded yet.
    #[default]
    Unknown,
    Unauthenticated,
    Authenticated,
    /// A session exists but may only be used to change the password.
    RecoveryOnly,
}

impl SessionStatus {
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            SessionStatus::Authenticated | SessionStatus::RecoveryOnly
        )
    }

    /// Position in the confidence lattice: unknown < unauthenticated <
    /// usable. Implicit evidence may only move upwards.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            SessionStatus::Unknown => 0,
            SessionStatus::Unauthenticated => 1,
            SessionStatus::Authenticated | SessionStatus::RecoveryOnly => 2,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionStatus::Unknown => "unknown",
            SessionStatus::Unauthenticated => "unauthenticated",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::RecoveryOnly => "recovery_only",
        };
        f.write_str(label)
    }
}

/// The resolver's single authoritative answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    /// Set when the status enters `Authenticated` or `RecoveryOnly`.
    pub established_at: Option<DateTime<Utc>>,
    /// Bumped every time a usable session is established or explicitly
    /// ended. Work started under one generation is stale under any other.
    pub generation: u64,
    /// Why the current `Unauthenticated` conclusion was reached.
    pub error: Option<SessionError>,
}

impl SessionState {
    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn is_recovery_only(&self) -> bool {
        self.status == SessionStatus::RecoveryOnly
    }

    pub(crate) fn established(
        &self,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            established_at: Some(now),
            generation: self.generation + 1,
            error: None,
        }
    }

    pub(crate) fn concluded_without_session(
        &self,
        error: Option<SessionError>,
    ) -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            established_at: None,
            generation: self.generation,
            error,
        }
    }

    pub(crate) fn ended(&self, error: Option<SessionError>) -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            established_at: None,
            generation: self.generation + 1,
            error,
        }
    }
}
