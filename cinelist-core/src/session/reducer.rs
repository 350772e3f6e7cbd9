//! Monotonic merge of session evidence.
//!
//! Every channel (recovery link, session poll, pushed auth events, explicit
//! user actions) reports what it observed as an [`Evidence`] value and the
//! resolver folds it into the current [`SessionState`] with [`reduce`].
//! Implicit evidence only ever raises confidence; a usable session can be
//! lost only through explicit evidence (sign-out or expiry).

use chrono::{DateTime, Utc};

use super::state::{SessionState, SessionStatus};
use crate::error::SessionError;

/// Where a piece of evidence came from, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceChannel {
    RecoveryLink,
    SessionPoll,
    AuthEvents,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// The backend accepted the recovery token from the link.
    RecoveryVerified,
    /// The backend rejected the recovery token, or the link carried an error.
    RecoveryRejected,
    /// The backend could not be reached while verifying or polling.
    TransportFailed {
        channel: EvidenceChannel,
        message: String,
    },
    /// A poll returned a live session.
    SessionFound { recovery: bool },
    /// The final poll of a pass returned no live session.
    SessionAbsent,
    /// `PASSWORD_RECOVERY` was pushed.
    PasswordRecoveryEvent,
    /// `SIGNED_IN` was pushed.
    SignedInEvent,
    /// Sign-out, either by the user or pushed by the backend.
    SignedOut,
    /// The session stopped being accepted by the backend.
    Expired,
}

impl Evidence {
    pub fn channel(&self) -> EvidenceChannel {
        match self {
            Evidence::RecoveryVerified | Evidence::RecoveryRejected => {
                EvidenceChannel::RecoveryLink
            }
            Evidence::TransportFailed { channel, .. } => *channel,
            Evidence::SessionFound { .. } | Evidence::SessionAbsent => {
                EvidenceChannel::SessionPoll
            }
            Evidence::PasswordRecoveryEvent | Evidence::SignedInEvent => {
                EvidenceChannel::AuthEvents
            }
            Evidence::SignedOut | Evidence::Expired => EvidenceChannel::Explicit,
        }
    }
}

/// Fold `evidence` into `current`. Returns `None` when the state does not
/// change.
pub fn reduce(
    current: &SessionState,
    evidence: &Evidence,
    now: DateTime<Utc>,
) -> Option<SessionState> {
    match evidence {
        Evidence::RecoveryVerified | Evidence::PasswordRecoveryEvent => {
            enter_recovery(current, now)
        }
        Evidence::SessionFound { recovery: true } => enter_recovery(current, now),
        Evidence::SessionFound { recovery: false } | Evidence::SignedInEvent => {
            enter_authenticated(current, now)
        }
        Evidence::RecoveryRejected => {
            conclude_unusable(current, SessionError::InvalidOrExpiredLink)
        }
        Evidence::SessionAbsent => {
            conclude_unusable(current, SessionError::NoActiveSession)
        }
        Evidence::TransportFailed { message, .. } => conclude_unusable(
            current,
            SessionError::VerificationTransport(message.clone()),
        ),
        Evidence::SignedOut => end_session(current, None),
        Evidence::Expired => {
            end_session(current, Some(SessionError::NoActiveSession))
        }
    }
}

// Recovery evidence wins over any state, including `Authenticated`.
fn enter_recovery(
    current: &SessionState,
    now: DateTime<Utc>,
) -> Option<SessionState> {
    if current.status == SessionStatus::RecoveryOnly {
        return None;
    }
    Some(current.established(SessionStatus::RecoveryOnly, now))
}

// A recovery-scoped session is never upgraded by a general sign-in signal.
fn enter_authenticated(
    current: &SessionState,
    now: DateTime<Utc>,
) -> Option<SessionState> {
    if current.status.is_usable() {
        return None;
    }
    Some(current.established(SessionStatus::Authenticated, now))
}

fn conclude_unusable(
    current: &SessionState,
    error: SessionError,
) -> Option<SessionState> {
    if current.status.rank() > SessionStatus::Unauthenticated.rank() {
        return None;
    }
    if current.status == SessionStatus::Unauthenticated
        && current.error.as_ref() == Some(&error)
    {
        return None;
    }
    Some(current.concluded_without_session(Some(error)))
}

fn end_session(
    current: &SessionState,
    error: Option<SessionError>,
) -> Option<SessionState> {
    match current.status {
        SessionStatus::Authenticated | SessionStatus::RecoveryOnly => {
            Some(current.ended(error))
        }
        SessionStatus::Unknown => {
            Some(current.concluded_without_session(error))
        }
        SessionStatus::Unauthenticated => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(evidence: &[Evidence]) -> SessionState {
        let now = Utc::now();
        evidence.iter().fold(SessionState::default(), |state, ev| {
            reduce(&state, ev, now).unwrap_or(state)
        })
    }

    fn transport() -> Evidence {
        Evidence::TransportFailed {
            channel: EvidenceChannel::SessionPoll,
            message: "connection reset".into(),
        }
    }

    fn permutations(items: &[Evidence]) -> Vec<Vec<Evidence>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn late_negative_conclusions_never_downgrade() {
        let channels = [
            Evidence::SessionFound { recovery: false },
            Evidence::SessionAbsent,
            Evidence::RecoveryRejected,
            transport(),
        ];
        for order in permutations(&channels) {
            let state = fold(&order);
            assert_eq!(
                state.status,
                SessionStatus::Authenticated,
                "order {order:?} ended in {state:?}"
            );
            assert!(state.error.is_none());
        }
    }

    #[test]
    fn password_recovery_event_wins_in_every_ordering() {
        let channels = [
            Evidence::PasswordRecoveryEvent,
            Evidence::SessionAbsent,
            Evidence::SignedInEvent,
        ];
        for order in permutations(&channels) {
            let state = fold(&order);
            assert_eq!(
                state.status,
                SessionStatus::RecoveryOnly,
                "order {order:?} ended in {state:?}"
            );
        }
    }

    #[test]
    fn reentering_recovery_is_a_no_op() {
        let state = fold(&[Evidence::RecoveryVerified]);
        assert!(
            reduce(&state, &Evidence::PasswordRecoveryEvent, Utc::now())
                .is_none()
        );
    }

    #[test]
    fn unauthenticated_can_still_become_usable() {
        let state = fold(&[Evidence::SessionAbsent, Evidence::SignedInEvent]);
        assert_eq!(state.status, SessionStatus::Authenticated);
        assert!(state.established_at.is_some());
    }

    #[test]
    fn only_explicit_evidence_ends_a_session() {
        let authenticated = fold(&[Evidence::SignedInEvent]);
        let ended = reduce(&authenticated, &Evidence::SignedOut, Utc::now())
            .expect("sign-out changes state");
        assert_eq!(ended.status, SessionStatus::Unauthenticated);
        assert!(ended.generation > authenticated.generation);
        assert!(ended.established_at.is_none());

        let expired = reduce(&authenticated, &Evidence::Expired, Utc::now())
            .expect("expiry changes state");
        assert_eq!(expired.error, Some(SessionError::NoActiveSession));
    }

    #[test]
    fn nothing_moves_a_state_back_to_unknown() {
        let every = [
            Evidence::RecoveryVerified,
            Evidence::RecoveryRejected,
            transport(),
            Evidence::SessionFound { recovery: false },
            Evidence::SessionAbsent,
            Evidence::PasswordRecoveryEvent,
            Evidence::SignedInEvent,
            Evidence::SignedOut,
            Evidence::Expired,
        ];
        let start = fold(&[Evidence::SessionAbsent]);
        for ev in &every {
            let next = reduce(&start, ev, Utc::now()).unwrap_or(start.clone());
            assert_ne!(next.status, SessionStatus::Unknown, "{ev:?}");
        }
    }

    #[test]
    fn a_newer_negative_conclusion_replaces_the_older_error() {
        let state = fold(&[Evidence::SessionAbsent, Evidence::RecoveryRejected]);
        assert_eq!(state.status, SessionStatus::Unauthenticated);
        assert_eq!(state.error, Some(SessionError::InvalidOrExpiredLink));
    }

    #[test]
    fn recovery_session_found_by_poll_is_recovery_only() {
        let state = fold(&[Evidence::SessionFound { recovery: true }]);
        assert_eq!(state.status, SessionStatus::RecoveryOnly);
    }

    #[test]
    fn generation_counts_established_sessions() {
        let state = fold(&[
            Evidence::SignedInEvent,
            Evidence::SignedOut,
            Evidence::SignedInEvent,
        ]);
        assert_eq!(state.generation, 3);
    }
}
