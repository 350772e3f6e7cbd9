use std::sync::Arc;

use cinelist_model::{CollectionId, RecoveryLink};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::{AuthBackend, ListStore};
use crate::config::CoreConfig;
use crate::error::{SessionError, SyncError};
use crate::readiness::ReadinessGate;
use crate::session::{SessionResolver, SessionState};
use crate::sync::{CollectionStore, SyncOrchestrator, SyncStatus};

/// Entry point tying the resolver, the orchestrator and the readiness gate
/// together.
#[derive(Debug)]
pub struct CinelistClient {
    resolver: Arc<SessionResolver>,
    orchestrator: Arc<SyncOrchestrator>,
    readiness: ReadinessGate,
    driver: Option<JoinHandle<()>>,
}

pub struct CinelistClientBuilder {
    auth: Arc<dyn AuthBackend>,
    lists: Arc<dyn ListStore>,
    config: CoreConfig,
    stores: Vec<Arc<CollectionStore>>,
    auto_sync: bool,
}

impl std::fmt::Debug for CinelistClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CinelistClientBuilder")
            .field("config", &self.config)
            .field("collections", &self.stores.len())
            .field("auto_sync", &self.auto_sync)
            .finish()
    }
}

impl CinelistClientBuilder {
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an empty collection.
    pub fn collection(self, id: CollectionId) -> Self {
        self.store(Arc::new(CollectionStore::new(id)))
    }

    /// Registers a collection store owned by the caller.
    pub fn store(mut self, store: Arc<CollectionStore>) -> Self {
        self.stores.retain(|s| s.id() != store.id());
        self.stores.push(store);
        self
    }

    /// Sync automatically whenever a new authenticated session appears.
    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> CinelistClient {
        let stores = if self.stores.is_empty() {
            vec![
                Arc::new(CollectionStore::new(CollectionId::watchlist())),
                Arc::new(CollectionStore::new(CollectionId::watched())),
            ]
        } else {
            self.stores
        };

        let resolver =
            SessionResolver::spawn(self.auth, self.config.session.clone());
        let rejected = Arc::downgrade(&resolver);
        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                self.lists,
                resolver.subscribe(),
                stores,
                self.config.sync.clone(),
            )
            .on_session_rejected(Arc::new(move || {
                if let Some(resolver) = rejected.upgrade() {
                    resolver.expire();
                }
            })),
        );
        let readiness = ReadinessGate::spawn(
            vec![
                resolver.subscribe_resolving(),
                orchestrator.subscribe_in_progress(),
            ],
            &self.config.readiness,
        );
        let driver = self.auto_sync.then(|| orchestrator.spawn_driver());

        info!(
            collections = orchestrator.collections().len(),
            auto_sync = self.auto_sync,
            "client started"
        );
        CinelistClient {
            resolver,
            orchestrator,
            readiness,
            driver,
        }
    }
}

impl CinelistClient {
    pub fn builder(
        auth: Arc<dyn AuthBackend>,
        lists: Arc<dyn ListStore>,
    ) -> CinelistClientBuilder {
        CinelistClientBuilder {
            auth,
            lists,
            config: CoreConfig::default(),
            stores: Vec::new(),
            auto_sync: true,
        }
    }

    pub fn resolver(&self) -> &Arc<SessionResolver> {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.resolver.subscribe()
    }

    /// Resolves the session, bounded by the configured resolution timeout.
    pub async fn resolve(
        &self,
        link: Option<&RecoveryLink>,
    ) -> Result<SessionState, SessionError> {
        self.resolver.resolve_default(link).await
    }

    /// Retrying sync of every collection. Failures are kept in
    /// [`sync_error`](Self::sync_error).
    pub async fn sync_all_data(&self) -> bool {
        self.orchestrator.sync_with_retry().await.is_ok()
    }

    /// Manual retry after a terminal sync error.
    pub async fn retry_sync(&self) -> bool {
        self.orchestrator.retry().await.is_ok()
    }

    pub fn is_data_synced(&self) -> bool {
        let status = self.orchestrator.status();
        let generation = self.resolver.state().generation;
        status.synced && status.generation == Some(generation)
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.orchestrator.status().in_progress
    }

    pub fn sync_error(&self) -> Option<SyncError> {
        self.orchestrator.status().error
    }

    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.orchestrator.subscribe()
    }

    /// Debounced readiness of the session and sync layers.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.readiness.subscribe()
    }

    pub fn collection(
        &self,
        id: &CollectionId,
    ) -> Option<Arc<CollectionStore>> {
        self.orchestrator.collection(id).cloned()
    }

    pub fn collections(&self) -> &[Arc<CollectionStore>] {
        self.orchestrator.collections()
    }
}

impl Drop for CinelistClient {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
