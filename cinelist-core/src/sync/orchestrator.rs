use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use cinelist_model::CollectionId;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::job::{JobState, SyncAggregate, SyncJob};
use super::reconcile::reconcile;
use super::store::CollectionStore;
use crate::backend::ListStore;
use crate::config::SyncConfig;
use crate::error::{BackendError, CollectionFailure, SyncError};
use crate::session::SessionState;

/// Reactive summary of the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub in_progress: bool,
    /// The last pass succeeded for `generation`.
    pub synced: bool,
    /// Session generation of the last completed pass.
    pub generation: Option<u64>,
    pub error: Option<SyncError>,
}

/// Called when the list store rejects the session's credentials.
pub type SessionRejectedHook = Arc<dyn Fn() + Send + Sync>;

enum JobOutcome {
    Committed,
    Failed(BackendError),
    Stale,
}

/// Runs one sync job per registered collection against the list store.
pub struct SyncOrchestrator {
    list_store: Arc<dyn ListStore>,
    session: watch::Receiver<SessionState>,
    collections: Vec<Arc<CollectionStore>>,
    jobs: Mutex<BTreeMap<CollectionId, SyncJob>>,
    status: watch::Sender<SyncStatus>,
    busy: watch::Sender<bool>,
    config: SyncConfig,
    on_session_rejected: Option<SessionRejectedHook>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("collections", &self.collections.len())
            .field("status", &*self.status.borrow())
            .field("expires_session", &self.on_session_rejected.is_some())
            .finish()
    }
}

impl SyncOrchestrator {
    pub fn new(
        list_store: Arc<dyn ListStore>,
        session: watch::Receiver<SessionState>,
        collections: Vec<Arc<CollectionStore>>,
        config: SyncConfig,
    ) -> Self {
        let jobs = collections
            .iter()
            .map(|c| (c.id().clone(), SyncJob::new(c.id().clone())))
            .collect();
        let (status, _) = watch::channel(SyncStatus::default());
        let (busy, _) = watch::channel(false);
        Self {
            list_store,
            session,
            collections,
            jobs: Mutex::new(jobs),
            status,
            busy,
            config,
            on_session_rejected: None,
        }
    }

    /// Runs `hook` whenever a pass fails because the list store refused the
    /// session, typically to expire it.
    pub fn on_session_rejected(mut self, hook: SessionRejectedHook) -> Self {
        self.on_session_rejected = Some(hook);
        self
    }

    pub fn collections(&self) -> &[Arc<CollectionStore>] {
        &self.collections
    }

    pub fn collection(
        &self,
        id: &CollectionId,
    ) -> Option<&Arc<CollectionStore>> {
        self.collections.iter().find(|c| c.id() == id)
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// True while a pass is running, for the readiness gate.
    pub fn subscribe_in_progress(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    pub fn jobs(&self) -> Vec<SyncJob> {
        self.jobs.lock().values().cloned().collect()
    }

    pub fn aggregate(&self) -> SyncAggregate {
        SyncAggregate::of(self.jobs.lock().values())
    }

    /// One pass over every collection.
    ///
    /// Succeeds only if every collection succeeds. Collections that did
    /// succeed keep their committed data either way.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<(), SyncError> {
        let session = self.session.borrow().clone();
        if !session.is_authenticated() {
            debug!(status = %session.status, "sync skipped without session");
            return Err(self.record(SyncError::NotAuthenticated));
        }

        let claimed = self.status.send_if_modified(|status| {
            if status.in_progress {
                return false;
            }
            status.in_progress = true;
            true
        });
        if !claimed {
            return Err(SyncError::AlreadyInProgress);
        }
        self.busy.send_replace(true);
        let _pass = InProgressGuard {
            status: &self.status,
            busy: &self.busy,
        };

        let generation = session.generation;
        if self.is_current(generation) {
            debug!(generation, "collections already synced");
            self.finish(generation, Ok(()));
            return Ok(());
        }

        {
            let mut jobs = self.jobs.lock();
            for job in jobs.values_mut() {
                job.start();
            }
        }

        let outcomes = join_all(
            self.collections
                .iter()
                .map(|collection| self.run_job(collection, generation)),
        )
        .await;

        let result = self.settle(outcomes, generation);
        if let Err(err) = &result
            && err.session_rejected()
        {
            warn!(generation, "list store rejected the session");
            if let Some(hook) = &self.on_session_rejected {
                hook();
            }
        }
        self.finish(generation, result.clone());
        result
    }

    /// [`sync_all`](Self::sync_all) with a fixed number of attempts.
    /// Exhaustion, or a pass whose failures are all permanent, yields
    /// [`SyncError::Terminal`] and stops until [`retry`](Self::retry) is
    /// called.
    pub async fn sync_with_retry(&self) -> Result<(), SyncError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sync_all().await {
                Ok(()) => return Ok(()),
                Err(
                    err @ (SyncError::NotAuthenticated
                    | SyncError::AlreadyInProgress),
                ) => return Err(err),
                Err(err)
                    if attempt >= max_attempts || !err.is_retryable() =>
                {
                    error!(attempts = attempt, error = %err, "sync gave up");
                    let terminal = SyncError::Terminal {
                        attempts: attempt,
                        last: Box::new(err),
                    };
                    return Err(self.record(terminal));
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "sync attempt failed; retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
            }
        }
    }

    /// Manual retry: failed jobs go back to `Pending` and the retrying sync
    /// runs again.
    pub async fn retry(&self) -> Result<(), SyncError> {
        {
            let mut jobs = self.jobs.lock();
            for job in jobs.values_mut() {
                if job.state == JobState::Failed {
                    job.reset();
                }
            }
        }
        self.status.send_modify(|status| status.error = None);
        info!("manual sync retry");
        self.sync_with_retry().await
    }

    /// Drives syncing from session changes: one retrying sync per newly
    /// established authenticated generation. Ends when the session sender
    /// is dropped.
    pub async fn run(self: Arc<Self>) {
        let mut session = self.session.clone();
        let mut last_generation = None;
        loop {
            let state = session.borrow_and_update().clone();
            if state.is_authenticated() {
                if last_generation != Some(state.generation) {
                    last_generation = Some(state.generation);
                    if let Err(err) = self.sync_with_retry().await {
                        warn!(error = %err, "automatic sync failed");
                    }
                }
            } else if !state.is_usable() {
                self.session_ended();
            }
            if session.changed().await.is_err() {
                debug!("session channel closed; sync driver stopping");
                break;
            }
        }
    }

    pub fn spawn_driver(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    async fn run_job(
        &self,
        collection: &CollectionStore,
        generation: u64,
    ) -> JobOutcome {
        let id = collection.id();
        let snapshot = collection.snapshot();

        let remote = match self.list_store.fetch_list(id).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(collection = %id, error = %err, "fetch failed");
                return JobOutcome::Failed(err);
            }
        };
        let merged = reconcile(&remote, &snapshot.mutations);

        if merged.diverged {
            if !self.generation_is(generation) {
                return JobOutcome::Stale;
            }
            if let Err(err) =
                self.list_store.push_list(id, &merged.items).await
            {
                warn!(collection = %id, error = %err, "push failed");
                return JobOutcome::Failed(err);
            }
        }

        if !self.generation_is(generation) {
            return JobOutcome::Stale;
        }
        collection.commit(merged.items, snapshot.through_seq, Utc::now());
        debug!(collection = %id, pushed = merged.diverged, "collection synced");
        JobOutcome::Committed
    }

    fn settle(
        &self,
        outcomes: Vec<JobOutcome>,
        generation: u64,
    ) -> Result<(), SyncError> {
        let mut jobs = self.jobs.lock();
        let mut failures = Vec::new();
        let mut stale = false;
        for (collection, outcome) in self.collections.iter().zip(outcomes) {
            let Some(job) = jobs.get_mut(collection.id()) else {
                continue;
            };
            match outcome {
                JobOutcome::Committed => job.succeed(generation),
                JobOutcome::Failed(err) => {
                    failures.push(CollectionFailure {
                        collection: collection.id().clone(),
                        error: err.clone(),
                    });
                    job.fail(err);
                }
                JobOutcome::Stale => {
                    stale = true;
                    job.requeue();
                }
            }
        }

        if stale {
            warn!(generation, "session changed mid-sync; results discarded");
            Err(SyncError::SessionChanged)
        } else if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Collections(failures))
        }
    }

    fn finish(&self, generation: u64, result: Result<(), SyncError>) {
        match &result {
            Ok(()) => info!(generation, "sync complete"),
            Err(err) => warn!(generation, error = %err, "sync pass failed"),
        }
        self.status.send_modify(|status| {
            status.synced = result.is_ok();
            status.generation = Some(generation);
            status.error = result.err();
        });
    }

    fn record(&self, err: SyncError) -> SyncError {
        self.status.send_modify(|status| {
            status.synced = false;
            status.error = Some(err.clone());
        });
        err
    }

    // Idempotence: nothing to do when every job already succeeded for this
    // generation and no local edit is waiting.
    fn is_current(&self, generation: u64) -> bool {
        let jobs = self.jobs.lock();
        !jobs.is_empty()
            && jobs.values().all(|job| job.is_current(generation))
            && self.collections.iter().all(|c| c.pending_count() == 0)
    }

    fn generation_is(&self, generation: u64) -> bool {
        let session = self.session.borrow();
        session.is_authenticated() && session.generation == generation
    }

    fn session_ended(&self) {
        let mut jobs = self.jobs.lock();
        for job in jobs.values_mut() {
            if job.state != JobState::InFlight {
                job.reset();
            }
        }
        drop(jobs);
        self.status.send_if_modified(|status| {
            let changed = status.synced;
            status.synced = false;
            changed
        });
    }
}

struct InProgressGuard<'a> {
    status: &'a watch::Sender<SyncStatus>,
    busy: &'a watch::Sender<bool>,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.status.send_modify(|status| status.in_progress = false);
        self.busy.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::MockListStore;
    use crate::session::SessionStatus;
    use cinelist_model::ListItem;

    fn authenticated(generation: u64) -> SessionState {
        SessionState {
            status: SessionStatus::Authenticated,
            established_at: Some(Utc::now()),
            generation,
            error: None,
        }
    }

    fn stores() -> Vec<Arc<CollectionStore>> {
        vec![
            Arc::new(CollectionStore::new(CollectionId::watchlist())),
            Arc::new(CollectionStore::new(CollectionId::watched())),
        ]
    }

    #[tokio::test]
    async fn second_pass_without_edits_makes_no_calls() {
        let mut mock = MockListStore::new();
        mock.expect_fetch_list()
            .times(2)
            .returning(|_| Ok(vec![ListItem::new(550u64, "Fight Club")]));
        mock.expect_push_list().never();

        let (_tx, rx) = watch::channel(authenticated(1));
        let orchestrator = SyncOrchestrator::new(
            Arc::new(mock),
            rx,
            stores(),
            SyncConfig::default(),
        );

        orchestrator.sync_all().await.unwrap();
        orchestrator.sync_all().await.unwrap();
        assert!(orchestrator.status().synced);
        assert!(orchestrator.aggregate().all_succeeded);
    }

    #[tokio::test]
    async fn local_edit_after_sync_triggers_a_push() {
        let mut mock = MockListStore::new();
        mock.expect_fetch_list().times(4).returning(|_| Ok(Vec::new()));
        mock.expect_push_list()
            .times(1)
            .withf(|collection, items| {
                *collection == CollectionId::watchlist() && items.len() == 1
            })
            .returning(|_, _| Ok(()));

        let (_tx, rx) = watch::channel(authenticated(1));
        let collections = stores();
        let watchlist = Arc::clone(&collections[0]);
        let orchestrator = SyncOrchestrator::new(
            Arc::new(mock),
            rx,
            collections,
            SyncConfig::default(),
        );

        orchestrator.sync_all().await.unwrap();
        watchlist.add(ListItem::new(27205u64, "Inception"));
        orchestrator.sync_all().await.unwrap();
        assert_eq!(watchlist.pending_count(), 0);
    }

    #[tokio::test]
    async fn unauthenticated_sync_is_rejected_without_calls() {
        let mut mock = MockListStore::new();
        mock.expect_fetch_list().never();

        let (_tx, rx) = watch::channel(SessionState::default());
        let orchestrator = SyncOrchestrator::new(
            Arc::new(mock),
            rx,
            stores(),
            SyncConfig::default(),
        );

        assert_eq!(
            orchestrator.sync_all().await,
            Err(SyncError::NotAuthenticated)
        );
        assert_eq!(
            orchestrator.status().error,
            Some(SyncError::NotAuthenticated)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_surface_a_terminal_error() {
        let mut mock = MockListStore::new();
        mock.expect_fetch_list().times(3).returning(|_| {
            Err(BackendError::Transport("connection refused".into()))
        });

        let (_tx, rx) = watch::channel(authenticated(1));
        let orchestrator = SyncOrchestrator::new(
            Arc::new(mock),
            rx,
            vec![Arc::new(CollectionStore::new(CollectionId::watchlist()))],
            SyncConfig::default(),
        );

        let err = orchestrator.sync_with_retry().await.unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(orchestrator.status().error, Some(err));
        assert!(orchestrator.aggregate().any_failed);
        assert!(!orchestrator.status().in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credentials_stop_retrying_and_fire_the_hook() {
        let mut mock = MockListStore::new();
        mock.expect_fetch_list()
            .times(2)
            .returning(|_| Err(BackendError::Unauthorized));

        let rejections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rejections);
        let (_tx, rx) = watch::channel(authenticated(1));
        let orchestrator = SyncOrchestrator::new(
            Arc::new(mock),
            rx,
            stores(),
            SyncConfig::default(),
        )
        .on_session_rejected(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let started = tokio::time::Instant::now();
        let err = orchestrator.sync_with_retry().await.unwrap_err();

        assert!(err.is_terminal());
        assert!(err.session_rejected());
        assert_eq!(rejections.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), std::time::Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let mut mock = MockListStore::new();
        mock.expect_fetch_list().times(1).returning(|_| {
            Err(BackendError::Rejected {
                status: 400,
                message: "bad filter".into(),
            })
        });

        let (_tx, rx) = watch::channel(authenticated(1));
        let orchestrator = SyncOrchestrator::new(
            Arc::new(mock),
            rx,
            vec![Arc::new(CollectionStore::new(CollectionId::watchlist()))],
            SyncConfig::default(),
        );

        let err = orchestrator.sync_with_retry().await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Terminal {
                attempts: 1,
                last: Box::new(SyncError::Collections(vec![
                    CollectionFailure {
                        collection: CollectionId::watchlist(),
                        error: BackendError::Rejected {
                            status: 400,
                            message: "bad filter".into(),
                        },
                    }
                ])),
            }
        );
    }
}
