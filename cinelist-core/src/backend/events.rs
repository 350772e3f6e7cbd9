use cinelist_model::AuthEvent;
use tokio::sync::broadcast;
use tracing::{trace, warn};

const EVENT_CAPACITY: usize = 64;

/// Fan-out channel for session-change notifications.
#[derive(Debug, Clone)]
pub struct AuthEventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: AuthEvent) {
        trace!(event = event.name(), "publishing auth event");
        // No subscribers is fine; the event simply has no audience yet.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Live subscription to an [`AuthEventBus`]. Drop it to unsubscribe.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event, or `None` once the backend has gone away.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth subscription lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_only_see_events_published_after_subscribing() {
        let bus = AuthEventBus::new();
        bus.publish(AuthEvent::SignedOut);

        let mut sub = bus.subscribe();
        bus.publish(AuthEvent::UserUpdated);
        assert_eq!(sub.next().await, Some(AuthEvent::UserUpdated));
    }

    #[tokio::test]
    async fn subscription_ends_when_bus_is_dropped() {
        let bus = AuthEventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.next().await, None);
    }
}
