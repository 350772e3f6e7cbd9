use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the session resolver, sync orchestrator and readiness
/// gate.
///
/// All fields carry defaults so a partial configuration payload only needs to
/// name the values it overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub session: SessionConfig,
    pub sync: SyncConfig,
    pub readiness: ReadinessConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay before the single follow-up session poll. A redirect callback
    /// can still be storing its session when the first poll runs.
    pub poll_retry_delay_ms: u64,
    /// Upper bound for one resolution pass before it is force-completed.
    pub resolve_timeout_ms: u64,
    /// Delay between a successful password change and the login redirect.
    pub login_redirect_delay_ms: u64,
    pub min_password_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_retry_delay_ms: 1_000,
            resolve_timeout_ms: 3_000,
            login_redirect_delay_ms: 2_000,
            min_password_len: 6,
        }
    }
}

impl SessionConfig {
    pub fn poll_retry_delay(&self) -> Duration {
        Duration::from_millis(self.poll_retry_delay_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn login_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.login_redirect_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Automatic attempts before a terminal error is surfaced.
    pub max_attempts: u32,
    /// Fixed delay between automatic attempts.
    pub retry_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1_500,
        }
    }
}

impl SyncConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// How long "not loading" must hold before `ready` flips to true.
    pub debounce_ms: u64,
    /// Hard ceiling after which `ready` is forced to true once.
    pub ceiling_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            ceiling_ms: 5_000,
        }
    }
}

impl ReadinessConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let cfg: CoreConfig =
            serde_json::from_str(r#"{"sync":{"max_attempts":5}}"#).unwrap();
        assert_eq!(cfg.sync.max_attempts, 5);
        assert_eq!(cfg.sync.retry_delay(), Duration::from_millis(1_500));
        assert_eq!(cfg.session, SessionConfig::default());
        assert_eq!(cfg.readiness.debounce(), Duration::from_millis(500));
    }
}
