use std::sync::Arc;
use std::time::Duration;

use cinelist_core::model::{CollectionId, ListItem, MovieId};
use cinelist_core::sync::JobState;
use cinelist_core::testing::{InMemoryAuthBackend, InMemoryListStore};
use cinelist_core::{
    BackendError, CinelistClient, CollectionStore, SessionError, SessionStatus,
    SyncError,
};

struct Harness {
    auth: Arc<InMemoryAuthBackend>,
    lists: Arc<InMemoryListStore>,
    client: CinelistClient,
    watchlist: Arc<CollectionStore>,
    watched: Arc<CollectionStore>,
}

async fn signed_in(watched_seed: Vec<ListItem>) -> Harness {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let lists = Arc::new(InMemoryListStore::new());
    auth.set_general_session();

    let watchlist =
        Arc::new(CollectionStore::new(CollectionId::watchlist()));
    let watched = Arc::new(CollectionStore::with_items(
        CollectionId::watched(),
        watched_seed,
    ));
    let client = CinelistClient::builder(auth.clone(), lists.clone())
        .store(watchlist.clone())
        .store(watched.clone())
        .auto_sync(false)
        .build();
    client.resolve(None).await.unwrap();

    Harness {
        auth,
        lists,
        client,
        watchlist,
        watched,
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_sync_without_edits_only_hits_the_network_once() {
    let h = signed_in(Vec::new()).await;
    h.lists.seed(
        CollectionId::watchlist(),
        vec![ListItem::new(603u64, "The Matrix")],
    );

    assert!(h.client.sync_all_data().await);
    let calls = h.lists.network_calls();
    assert_eq!(calls, 2);

    assert!(h.client.sync_all_data().await);
    assert_eq!(h.lists.network_calls(), calls);
    assert!(h.client.is_data_synced());
    assert!(h.watchlist.contains(MovieId(603)));
}

#[tokio::test(start_paused = true)]
async fn partial_failure_keeps_successful_data_and_prior_local_data() {
    let prior = vec![ListItem::new(11u64, "Star Wars")];
    let h = signed_in(prior.clone()).await;
    h.lists.seed(
        CollectionId::watchlist(),
        vec![ListItem::new(78u64, "Blade Runner")],
    );
    h.lists.fail(CollectionId::watched());

    let err = h.client.orchestrator().sync_all().await.unwrap_err();

    assert_eq!(err.failed_collections(), vec![&CollectionId::watched()]);
    assert!(h.watchlist.contains(MovieId(78)));
    assert!(h.watchlist.last_synced_at().is_some());
    assert_eq!(h.watched.items(), prior);
    assert!(h.watched.last_synced_at().is_none());

    let aggregate = h.client.orchestrator().aggregate();
    assert!(aggregate.any_failed);
    assert!(!aggregate.all_succeeded);
}

#[tokio::test(start_paused = true)]
async fn terminal_error_waits_for_manual_retry() {
    let h = signed_in(Vec::new()).await;
    h.lists.fail(CollectionId::watched());

    assert!(!h.client.sync_all_data().await);
    let err = h.client.sync_error().unwrap();
    assert!(err.is_terminal());
    // Three passes over two collections.
    assert_eq!(h.lists.fetch_calls(), 6);

    h.lists.heal(&CollectionId::watched());
    assert!(h.client.retry_sync().await);
    assert!(h.client.sync_error().is_none());
    assert!(h.client.is_data_synced());
}

#[tokio::test(start_paused = true)]
async fn local_edits_win_and_are_pushed() {
    let h = signed_in(Vec::new()).await;
    h.lists.seed(
        CollectionId::watchlist(),
        vec![
            ListItem::new(1u64, "Heat"),
            ListItem::new(2u64, "Ronin"),
        ],
    );
    h.watchlist.add(ListItem::new(3u64, "Collateral"));
    h.watchlist.remove(MovieId(9));

    assert!(h.client.sync_all_data().await);

    let remote: Vec<u64> = h
        .lists
        .list(&CollectionId::watchlist())
        .iter()
        .map(|i| i.movie_id.0)
        .collect();
    assert_eq!(remote, vec![1, 2, 3]);
    assert_eq!(h.watchlist.pending_count(), 0);
    assert_eq!(h.lists.push_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn edits_made_during_a_sync_stay_pending() {
    let h = signed_in(Vec::new()).await;
    h.lists.set_latency(Duration::from_millis(300));

    let watchlist = h.watchlist.clone();
    let (synced, _) = tokio::join!(h.client.sync_all_data(), async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        watchlist.add(ListItem::new(680u64, "Pulp Fiction"));
    });

    assert!(synced);
    assert!(h.watchlist.contains(MovieId(680)));
    assert_eq!(h.watchlist.pending_count(), 1);
    assert!(h.lists.list(&CollectionId::watchlist()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_sync_is_rejected() {
    let h = signed_in(Vec::new()).await;
    h.lists.set_latency(Duration::from_millis(200));
    let orchestrator = h.client.orchestrator();

    let (first, second) =
        tokio::join!(orchestrator.sync_all(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            orchestrator.sync_all().await
        });

    assert!(first.is_ok());
    assert_eq!(second, Err(SyncError::AlreadyInProgress));
}

#[tokio::test(start_paused = true)]
async fn results_from_an_ended_session_are_discarded() {
    let h = signed_in(Vec::new()).await;
    h.lists.set_latency(Duration::from_millis(500));
    h.lists.seed(
        CollectionId::watchlist(),
        vec![ListItem::new(238u64, "The Godfather")],
    );
    let orchestrator = h.client.orchestrator();
    let resolver = h.client.resolver();

    let (result, _) = tokio::join!(orchestrator.sync_all(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        resolver.sign_out().await.unwrap();
    });

    assert_eq!(result, Err(SyncError::SessionChanged));
    assert!(h.watchlist.items().is_empty());
    assert!(
        orchestrator
            .jobs()
            .iter()
            .all(|job| job.state == JobState::Pending)
    );
    assert_eq!(h.auth.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn recovery_session_cannot_sync() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let lists = Arc::new(InMemoryListStore::new());
    auth.accept_recovery_token("abc123");
    let client = CinelistClient::builder(auth.clone(), lists.clone())
        .auto_sync(false)
        .build();
    let link = cinelist_core::model::RecoveryLink::new("abc123", "recovery");
    client.resolve(Some(&link)).await.unwrap();

    assert!(!client.sync_all_data().await);
    assert_eq!(client.sync_error(), Some(SyncError::NotAuthenticated));
    assert_eq!(lists.network_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn driver_syncs_each_new_session_once() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let lists = Arc::new(InMemoryListStore::new());
    auth.set_general_session();
    let client = CinelistClient::builder(auth.clone(), lists.clone()).build();
    let mut status = client.sync_status();

    client.resolve(None).await.unwrap();
    status.wait_for(|s| s.synced).await.unwrap();
    assert_eq!(lists.fetch_calls(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(lists.fetch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_expire_the_session() {
    let h = signed_in(Vec::new()).await;
    let generation = h.client.resolver().state().generation;
    h.lists
        .fail_with(CollectionId::watchlist(), BackendError::Unauthorized);

    assert!(!h.client.sync_all_data().await);

    let state = h.client.resolver().state();
    assert_eq!(state.status, SessionStatus::Unauthenticated);
    assert_eq!(state.error, Some(SessionError::NoActiveSession));
    assert!(state.generation > generation);

    let err = h.client.sync_error().unwrap();
    assert!(err.is_terminal());
    assert!(err.session_rejected());
    // One pass; a rejected session is not retried.
    assert_eq!(h.lists.fetch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn driver_expires_a_rejected_session() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    let lists = Arc::new(InMemoryListStore::new());
    auth.set_general_session();
    for collection in [CollectionId::watchlist(), CollectionId::watched()] {
        lists.fail_with(collection, BackendError::Unauthorized);
    }
    let client = CinelistClient::builder(auth.clone(), lists.clone()).build();
    let mut session = client.session_state();

    client.resolve(None).await.unwrap();
    let state = session
        .wait_for(|s| s.status == SessionStatus::Unauthenticated)
        .await
        .unwrap()
        .clone();

    assert_eq!(state.error, Some(SessionError::NoActiveSession));
    assert!(client.sync_error().is_some_and(|e| e.session_rejected()));
    assert_eq!(lists.fetch_calls(), 2);
}
