mod support;

use std::sync::mpsc::channel;
use std::sync::Arc;

use catalog_replica::{
    CatalogSync, EntityStore, InMemoryEntityStore, ItemEntity, ObjectType, ReplicaConfig,
    ReplicaError, SyncStatus, SyncType, SyncWorkerThread,
};
use support::{categories, category, image, item, tax, ScriptedSource};

fn config(checkpoint_interval: usize) -> ReplicaConfig {
    ReplicaConfig {
        checkpoint_interval,
        yield_between_checkpoints: false,
        ..ReplicaConfig::default()
    }
}

fn image_refs(store: &InMemoryEntityStore, id: &str) -> Vec<String> {
    store
        .get_entity::<ItemEntity>(id)
        .unwrap()
        .unwrap()
        .image_refs
}

#[test]
fn full_sync_walks_every_page_and_completes() {
    let store = InMemoryEntityStore::new();
    let sync = CatalogSync::new(store.clone(), config(50));
    let mut source = ScriptedSource::new(vec![
        vec![item("A", 1, "Toast", &["I1"]), category("C1", 1, "Breakfast")],
        vec![image("I1", 1), tax("T1", 1, "VAT")],
    ])
    .with_watermark("t-1");

    let report = sync.run_full_sync(&mut source).unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.result.applied, 4);
    assert_eq!(report.link.edges_linked, 1);
    assert_eq!(image_refs(&store, "A"), vec!["I1"]);

    let state = sync.coordinator().state().unwrap();
    assert_eq!(state.status, SyncStatus::Completed);
    assert_eq!(state.sync_type, Some(SyncType::Full));
    assert_eq!(state.progress_current, 4);
    assert_eq!(state.last_incremental_cursor.as_deref(), Some("t-1"));
    assert!(state.last_page_cursor.is_none());
    assert!(state.last_sync_time.is_some());

    let stats = sync.stats().snapshot().unwrap();
    assert!(sync.stats().has_loaded_stats());
    assert_eq!(stats.total, 4);
}

#[test]
fn failed_full_sync_resumes_from_the_last_committed_page() {
    let store = InMemoryEntityStore::new();
    let sync = CatalogSync::new(store.clone(), config(50));
    let mut source = ScriptedSource::new(vec![
        vec![category("C1", 1, "One")],
        vec![category("C2", 1, "Two")],
        vec![category("C3", 1, "Three")],
    ])
    .failing_once_on(2);

    let err = sync.run_full_sync(&mut source).unwrap_err();
    assert!(matches!(err, ReplicaError::Source(_)));

    let failed = sync.coordinator().state().unwrap();
    assert_eq!(failed.status, SyncStatus::Failed);
    assert!(failed
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("connection reset")));
    assert_eq!(failed.last_page_cursor.as_deref(), Some("page-2"));
    assert_eq!(store.count_active(ObjectType::Category).unwrap(), 2);
    assert_eq!(sync.stats().snapshot().unwrap().total, 2);

    source.requests.clear();
    let report = sync.run_full_sync(&mut source).unwrap();

    assert_eq!(report.resumed_from.as_deref(), Some("page-2"));
    assert_eq!(report.pages, 1);
    assert_eq!(source.requests[0].cursor.as_deref(), Some("page-2"));
    let state = sync.coordinator().state().unwrap();
    assert_eq!(state.status, SyncStatus::Completed);
    assert_eq!(state.attempt_count, 2);
    assert!(state.last_error.is_none());
    assert_eq!(store.count_active(ObjectType::Category).unwrap(), 3);
}

#[test]
fn sync_requested_while_syncing_is_rejected() {
    let sync = CatalogSync::new(InMemoryEntityStore::new(), config(50));
    sync.coordinator().start_sync(SyncType::Full).unwrap();
    sync.coordinator().update_progress(10, 20).unwrap();
    sync.stats().refresh(true).unwrap();

    let mut source = ScriptedSource::new(vec![vec![category("C1", 1, "One")]]);
    let err = sync.run_incremental_sync(&mut source).unwrap_err();

    assert!(matches!(err, ReplicaError::ReentrantSync { .. }));
    assert!(source.requests.is_empty());
    let state = sync.coordinator().state().unwrap();
    assert_eq!(state.status, SyncStatus::Syncing);
    assert_eq!(state.progress_current, 10);
    assert_eq!(state.sync_type, Some(SyncType::Full));
    assert!(sync.stats().has_loaded_stats());
}

#[test]
fn incremental_sync_asks_for_changes_since_the_watermark() {
    let store = InMemoryEntityStore::new();
    let sync = CatalogSync::new(store.clone(), config(50));
    let mut full = ScriptedSource::new(vec![vec![
        item("A", 1, "Toast", &["I1"]),
        image("I1", 1),
        image("I2", 1),
    ]])
    .with_watermark("t-1");
    sync.run_full_sync(&mut full).unwrap();

    let mut changes =
        ScriptedSource::new(vec![vec![item("A", 2, "Toast", &["I2"])]]).with_watermark("t-2");
    let report = sync.run_incremental_sync(&mut changes).unwrap();

    assert_eq!(changes.requests[0].since.as_deref(), Some("t-1"));
    assert_eq!(changes.requests[0].cursor, None);
    assert_eq!(report.result.applied, 1);
    // Incremental relinking is additive.
    assert_eq!(image_refs(&store, "A"), vec!["I1", "I2"]);

    let state = sync.coordinator().state().unwrap();
    assert_eq!(state.sync_type, Some(SyncType::Incremental));
    assert_eq!(state.last_incremental_cursor.as_deref(), Some("t-2"));
}

#[test]
fn pushed_records_bypass_the_state_machine() {
    let store = InMemoryEntityStore::new();
    let sync = CatalogSync::new(store.clone(), config(50));

    let result = sync
        .apply_push(vec![image("I1", 1), item("A", 1, "Toast", &["I1"])])
        .unwrap();

    assert_eq!(result.applied, 2);
    assert_eq!(image_refs(&store, "A"), vec!["I1"]);
    assert_eq!(sync.coordinator().state().unwrap().status, SyncStatus::Idle);
    assert_eq!(sync.stats().snapshot().unwrap().total, 2);
}

#[test]
fn stopping_the_worker_leaves_a_resumable_state() {
    let store = InMemoryEntityStore::new();
    let sync = Arc::new(CatalogSync::new(store.clone(), config(2)));
    let all = categories(12);
    let (reached_tx, reached_rx) = channel();
    let (resume_tx, resume_rx) = channel();
    let source = ScriptedSource::new(vec![
        all[0..4].to_vec(),
        all[4..8].to_vec(),
        all[8..12].to_vec(),
    ])
    .pausing_before(1, reached_tx, resume_rx);

    let worker = SyncWorkerThread::spawn(Arc::clone(&sync), source, SyncType::Full);
    reached_rx.recv().unwrap();
    worker.signal_stop();
    resume_tx.send(()).unwrap();

    // Four records of page 0 plus the first checkpoint of page 1.
    let err = worker.join().unwrap_err();
    assert!(matches!(err, ReplicaError::Cancelled { committed: 6 }));

    let state = sync.coordinator().state().unwrap();
    assert_eq!(state.status, SyncStatus::Failed);
    assert_eq!(state.last_page_cursor.as_deref(), Some("page-1"));
    assert_eq!(state.last_page_offset, 2);
    assert_eq!(state.progress_current, 6);
    assert_eq!(store.uncommitted_len().unwrap(), 0);
    assert_eq!(store.count_active(ObjectType::Category).unwrap(), 6);
}

#[test]
fn worker_runs_to_completion_when_joined() {
    let store = InMemoryEntityStore::new();
    let sync = Arc::new(CatalogSync::new(store.clone(), config(50)));
    let source = ScriptedSource::new(vec![categories(3)]);

    let report = SyncWorkerThread::spawn(Arc::clone(&sync), source, SyncType::Full)
        .join()
        .unwrap();

    assert_eq!(report.result.applied, 3);
    assert_eq!(
        sync.coordinator().state().unwrap().status,
        SyncStatus::Completed
    );
}

#[cfg(feature = "emitter")]
#[test]
fn stats_are_published_after_a_sync() {
    use catalog_replica::{StatsSnapshot, SyncEvents};
    use std::sync::Mutex;
    use std::time::Duration;

    let events = Arc::new(SyncEvents::new());
    let (tx, rx) = channel();
    let tx = Mutex::new(tx);
    events.on_stats(move |payload| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(payload);
        }
    });

    let sync = CatalogSync::with_events(InMemoryEntityStore::new(), config(50), events);
    let mut source = ScriptedSource::new(vec![categories(3)]);
    sync.run_full_sync(&mut source).unwrap();

    // Listeners may run on their own threads, so arrival order is not fixed.
    let mut totals = Vec::new();
    for _ in 0..2 {
        let payload = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let snapshot: StatsSnapshot = serde_json::from_str(&payload).unwrap();
        totals.push(snapshot.total);
    }
    totals.sort_unstable();
    assert_eq!(totals, vec![0, 3]);
}
