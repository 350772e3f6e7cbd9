use std::sync::Arc;
use std::time::Duration;

use cinelist_core::readiness::ReadinessGate;
use cinelist_core::testing::{InMemoryAuthBackend, InMemoryListStore};
use cinelist_core::{CinelistClient, ReadinessConfig};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn ready_never_rises_twice_within_the_window() {
    let config = ReadinessConfig::default();
    let (loading_tx, loading_rx) = watch::channel(true);
    let gate = ReadinessGate::spawn(vec![loading_rx], &config);

    let rises = Arc::new(Mutex::new(Vec::new()));
    let mut ready = gate.subscribe();
    let recorder = {
        let rises = rises.clone();
        tokio::spawn(async move {
            while ready.changed().await.is_ok() {
                if *ready.borrow_and_update() {
                    rises.lock().push(Instant::now());
                }
            }
        })
    };

    // Flickering source: on/off periods shorter and longer than the window.
    let pattern_ms = [120u64, 80, 600, 50, 700, 300, 40, 900, 10, 650];
    let mut loading = true;
    for period in pattern_ms {
        tokio::time::sleep(Duration::from_millis(period)).await;
        loading = !loading;
        loading_tx.send_replace(loading);
    }
    loading_tx.send_replace(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    drop(gate);
    recorder.abort();

    let rises = rises.lock().clone();
    assert!(!rises.is_empty());
    for pair in rises.windows(2) {
        assert!(
            pair[1] - pair[0] >= config.debounce(),
            "ready rose twice within {:?}",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn ceiling_forces_ready_when_loading_never_settles() {
    let (_loading_tx, loading_rx) = watch::channel(true);
    let gate =
        ReadinessGate::spawn(vec![loading_rx], &ReadinessConfig::default());
    let mut ready = gate.subscribe();

    let started = Instant::now();
    ready.wait_for(|r| *r).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn client_becomes_ready_after_resolution_and_sync() {
    let auth = Arc::new(InMemoryAuthBackend::new());
    auth.set_general_session();
    let client = CinelistClient::builder(
        auth.clone(),
        Arc::new(InMemoryListStore::new()),
    )
    .build();
    let mut ready = client.ready();

    client.resolve(None).await.unwrap();
    ready.wait_for(|r| *r).await.unwrap();
    assert!(!client.is_sync_in_progress());
}
