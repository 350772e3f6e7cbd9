//! Debounced "ready" signal over any number of loading flags.
//!
//! Loading is published immediately; not-loading only after it has held for
//! the debounce window. A ceiling forces the first `ready = true` if the
//! sources never settle.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::config::ReadinessConfig;

/// Clock-free debounce state machine. Callers feed it observations and
/// timer ticks and read [`ready`](Self::ready) afterwards.
#[derive(Debug, Clone)]
pub struct ReadinessDebouncer {
    debounce: Duration,
    ceiling_at: Instant,
    loading: bool,
    ready: bool,
    settle_at: Option<Instant>,
    /// Set once `ready` has been true; the ceiling no longer applies.
    settled_once: bool,
}

impl ReadinessDebouncer {
    pub fn new(config: &ReadinessConfig, started: Instant) -> Self {
        Self {
            debounce: config.debounce(),
            ceiling_at: started + config.ceiling(),
            loading: false,
            ready: false,
            settle_at: Some(started + config.debounce()),
            settled_once: false,
        }
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn observe(&mut self, loading: bool, now: Instant) {
        if loading == self.loading {
            return;
        }
        self.loading = loading;
        if loading {
            self.ready = false;
            self.settle_at = None;
        } else {
            self.settle_at = Some(now + self.debounce);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(settle_at) = self.settle_at
            && !self.loading
            && now >= settle_at
        {
            self.settle_at = None;
            self.mark_ready();
        }
        if !self.settled_once && now >= self.ceiling_at {
            info!("readiness ceiling reached; forcing ready");
            self.mark_ready();
        }
    }

    /// Next instant at which [`tick`](Self::tick) can change anything.
    pub fn next_deadline(&self) -> Option<Instant> {
        let ceiling = (!self.settled_once).then_some(self.ceiling_at);
        match (self.settle_at, ceiling) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn mark_ready(&mut self) {
        self.ready = true;
        self.settled_once = true;
    }
}

/// Background task publishing the debounced readiness of its sources.
#[derive(Debug)]
pub struct ReadinessGate {
    ready: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ReadinessGate {
    /// Starts the gate over `sources`; a source reports `true` while
    /// loading. Must be called from within a Tokio runtime.
    pub fn spawn(
        sources: Vec<watch::Receiver<bool>>,
        config: &ReadinessConfig,
    ) -> Self {
        let (tx, ready) = watch::channel(false);
        let debouncer = ReadinessDebouncer::new(config, Instant::now());
        let task = tokio::spawn(drive(sources, debouncer, tx));
        Self { ready, task }
    }

    pub fn ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }
}

impl Drop for ReadinessGate {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive(
    sources: Vec<watch::Receiver<bool>>,
    mut debouncer: ReadinessDebouncer,
    ready: watch::Sender<bool>,
) {
    let mut values = vec![false; sources.len()];
    let mut merged = stream::select_all(
        sources
            .into_iter()
            .enumerate()
            .map(|(i, rx)| WatchStream::new(rx).map(move |v| (i, v))),
    );
    let mut sources_open = !values.is_empty();

    loop {
        let deadline = debouncer.next_deadline();
        if !sources_open && deadline.is_none() {
            break;
        }
        tokio::select! {
            next = merged.next(), if sources_open => match next {
                Some((index, loading)) => {
                    values[index] = loading;
                    let now = Instant::now();
                    debouncer.observe(values.iter().any(|v| *v), now);
                    debouncer.tick(now);
                }
                None => sources_open = false,
            },
            _ = sleep_until(deadline), if deadline.is_some() => {
                debouncer.tick(Instant::now());
            }
        }

        let next = debouncer.ready();
        if ready.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        }) {
            debug!(ready = next, "readiness changed");
        }
    }
    debug!("readiness sources closed");
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}
