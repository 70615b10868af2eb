//! Sync tests: incremental upload, retries, failure handling, synced cache

mod common;

use common::*;
use trueno_lineage::config::SyncConfig;
use trueno_lineage::lineage::GraphCheckpoint;
use trueno_lineage::run::Tracker;
use trueno_lineage::sync::{
    BatchStatus, MemoryMetadataStore, MetadataStore, SyncBatch, TransportError,
};
use trueno_lineage::Error;

#[tokio::test]
async fn test_sync_uploads_delta_once() {
    let tracker = memory_tracker();
    let run = census_run(&tracker);
    run.random_split(&census_frame(50), &[0.5, 0.5], 1).unwrap();

    let report = tracker.sync(&run).await.unwrap();
    assert_eq!(report.status, Some(BatchStatus::Accepted));
    assert_eq!(report.nodes_sent, 4);
    assert_eq!(report.edges_sent, 3);
    assert_eq!(report.events_sent, 1);
    assert_eq!(report.created, 4);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.checkpoint, run.graph().checkpoint());
    assert_eq!(run.synced_checkpoint(), run.graph().checkpoint());

    let store = tracker.client().store();
    assert_eq!(store.node_count(), 4);
    assert_eq!(store.edge_count(), 3);
    assert_eq!(store.event_count(&run.run_id()), 1);

    let again = tracker.sync(&run).await.unwrap();
    assert!(again.is_noop());
    assert_eq!(store.batch_count(), 1);
}

#[tokio::test]
async fn test_sync_sends_only_new_elements() {
    let tracker = memory_tracker();
    let run = census_run(&tracker);
    let frame = census_frame(50);
    let parts = run.random_split(&frame, &[0.5, 0.5], 1).unwrap();
    let first = tracker.sync(&run).await.unwrap();

    run.select_columns(&parts[0], &["age", "hours"]).unwrap();
    assert_eq!(run.pending_delta().start, first.checkpoint);

    let second = tracker.sync(&run).await.unwrap();
    // selector + projected frame; the partition was already sent
    assert_eq!(second.nodes_sent, 2);
    assert_eq!(second.edges_sent, 2);
    assert_eq!(second.events_sent, 1);
    assert_eq!(second.status, Some(BatchStatus::Accepted));
    assert_eq!(second.checkpoint, first.checkpoint.max(second.checkpoint));

    let store = tracker.client().store();
    assert_eq!(store.node_count(), 6);
    assert_eq!(store.event_count(&run.run_id()), 2);
    for edge in run.graph().edges() {
        assert!(store.contains_edge(&edge));
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let tracker = Tracker::new(FlakyStore::unavailable(2), fast_config()).unwrap();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();

    let report = tracker.sync(&run).await.unwrap();
    assert_eq!(report.attempts, 3);
    assert_eq!(tracker.client().store().calls(), 3);
    assert_eq!(tracker.client().store().inner.node_count(), 3);
}

#[tokio::test]
async fn test_retries_reuse_batch_id_but_each_sync_gets_a_new_one() {
    let tracker = Tracker::new(FlakyStore::unavailable(2), fast_config()).unwrap();
    let run = census_run(&tracker);
    let frame = census_frame(10);
    run.select_columns(&frame, &["age"]).unwrap();

    let first = tracker.sync(&run).await.unwrap();
    let ids = tracker.client().store().batch_ids();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| Some(*id) == first.batch_id));

    run.select_columns(&frame, &["hours"]).unwrap();
    let second = tracker.sync(&run).await.unwrap();
    assert_ne!(second.batch_id, first.batch_id);
    assert_eq!(tracker.client().store().batch_ids().len(), 4);
}

#[tokio::test]
async fn test_network_errors_are_retried() {
    let store = FlakyStore::new(1, TransportError::Network("connection reset".to_string()));
    let tracker = Tracker::new(store, fast_config()).unwrap();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();

    let report = tracker.sync(&run).await.unwrap();
    assert_eq!(report.attempts, 2);
}

#[tokio::test]
async fn test_exhausted_retries_keep_delta_pending() {
    let tracker = Tracker::new(FlakyStore::unavailable(10), fast_config()).unwrap();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();
    let pending = run.pending_delta();

    let err = tracker.sync(&run).await.unwrap_err();
    assert!(matches!(err, Error::Sync { attempts: 3, .. }));
    assert_eq!(run.synced_checkpoint(), GraphCheckpoint::default());
    assert_eq!(tracker.client().store().inner.node_count(), 0);

    let retry = run.pending_delta();
    assert_eq!(retry.start, pending.start);
    assert_eq!(retry.end, pending.end);

    tracker.client().store().fail_next(0);
    let report = tracker.sync(&run).await.unwrap();
    assert_eq!(report.nodes_sent, pending.nodes.len());
    assert_eq!(report.events_sent, 1);
    assert_eq!(run.synced_checkpoint(), pending.end);
}

#[tokio::test]
async fn test_client_errors_fail_immediately() {
    let store = FlakyStore::new(
        5,
        TransportError::Client {
            status: 422,
            message: "unknown node kind".to_string(),
        },
    );
    let tracker = Tracker::new(store, fast_config()).unwrap();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();

    let err = tracker.sync(&run).await.unwrap_err();
    assert!(matches!(err, Error::Sync { attempts: 1, .. }));
    assert_eq!(tracker.client().store().calls(), 1);
    assert_eq!(run.synced_checkpoint(), GraphCheckpoint::default());
}

#[tokio::test]
async fn test_rejected_batch_is_an_error() {
    let tracker = Tracker::new(RejectingStore::default(), fast_config()).unwrap();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();

    match tracker.sync(&run).await {
        Err(Error::Sync { attempts, message }) => {
            assert_eq!(attempts, 1);
            assert!(message.contains("schema version mismatch"));
        }
        other => panic!("expected a sync error, got {other:?}"),
    }
    assert_eq!(run.synced_checkpoint(), GraphCheckpoint::default());
}

#[tokio::test]
async fn test_second_run_sees_existing_nodes() {
    let tracker = memory_tracker();
    let frame = census_frame(40);

    let first = census_run(&tracker);
    first.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    tracker.sync(&first).await.unwrap();

    let second = census_run(&tracker);
    second.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    let report = tracker.sync(&second).await.unwrap();

    assert_eq!(report.status, Some(BatchStatus::PartiallyAccepted));
    assert_eq!(report.created, 0);
    assert_eq!(report.already_existed, 4);

    let store = tracker.client().store();
    assert_eq!(store.node_count(), 4);
    assert_eq!(store.edge_count(), 3);
    assert_eq!(store.event_count(&first.run_id()), 1);
    assert_eq!(store.event_count(&second.run_id()), 1);
}

#[tokio::test]
async fn test_synced_cache_skips_known_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("synced.parquet");
    let config = fast_config().sync(
        SyncConfig::default()
            .max_attempts(3)
            .backoff_ms(1, 2)
            .cache_path(&cache_path),
    );
    let tracker = Tracker::new(MemoryMetadataStore::new(), config).unwrap();
    let frame = census_frame(40);

    let first = census_run(&tracker);
    first.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    tracker.sync(&first).await.unwrap();
    assert!(cache_path.exists());

    let second = census_run(&tracker);
    let parts = second.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    second.select_columns(&parts[0], &["age"]).unwrap();
    let report = tracker.sync(&second).await.unwrap();

    assert_eq!(report.nodes_skipped, 4);
    assert_eq!(report.nodes_sent, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.status, Some(BatchStatus::Accepted));
    assert_eq!(report.events_sent, 2);
    assert_eq!(tracker.client().store().node_count(), 6);
}

#[tokio::test]
async fn test_synced_cache_is_ignored_by_another_store() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("synced.parquet");
    let config = fast_config().sync(
        SyncConfig::default()
            .max_attempts(3)
            .backoff_ms(1, 2)
            .cache_path(&cache_path),
    );
    let frame = census_frame(40);

    let first = Tracker::new(MemoryMetadataStore::new(), config.clone()).unwrap();
    let run = census_run(&first);
    run.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    first.sync(&run).await.unwrap();

    let second = Tracker::new(MemoryMetadataStore::new(), config).unwrap();
    let run = census_run(&second);
    run.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    let report = second.sync(&run).await.unwrap();

    assert_eq!(report.nodes_skipped, 0);
    assert_eq!(report.nodes_sent, 4);
    assert_eq!(report.status, Some(BatchStatus::Accepted));
    assert_eq!(second.client().store().node_count(), 4);
    assert_eq!(second.client().store().edge_count(), 3);
}

#[tokio::test]
async fn test_stale_synced_cache_falls_back_to_full_delta() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("synced.parquet");
    let config = fast_config().sync(
        SyncConfig::default()
            .max_attempts(3)
            .backoff_ms(1, 2)
            .cache_path(&cache_path),
    );
    let tracker = Tracker::new(MemoryMetadataStore::new(), config).unwrap();
    let frame = census_frame(40);

    let first = census_run(&tracker);
    first.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    tracker.sync(&first).await.unwrap();
    tracker.client().store().clear();

    let second = census_run(&tracker);
    second.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    let report = tracker.sync(&second).await.unwrap();

    assert_eq!(report.nodes_skipped, 0);
    assert_eq!(report.nodes_sent, 4);
    assert_eq!(report.created, 4);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.status, Some(BatchStatus::Accepted));
    assert!(second.pending_delta().is_empty());
    assert_eq!(tracker.client().store().node_count(), 4);
    assert_eq!(tracker.client().store().edge_count(), 3);

    let third = census_run(&tracker);
    third.random_split(&frame, &[0.5, 0.5], 5).unwrap();
    let report = tracker.sync(&third).await.unwrap();
    assert_eq!(report.nodes_skipped, 4);
    assert_eq!(report.nodes_sent, 0);
    assert_eq!(report.edges_sent, 3);
}

#[tokio::test]
async fn test_sync_after_close_flushes_final_delta() {
    let tracker = memory_tracker();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();
    tracker.close_run(&run).unwrap();

    let report = tracker.sync(&run).await.unwrap();
    assert_eq!(report.nodes_sent, 3);
    let stored = tracker.registry().get_run(&run.run_id()).cloned().unwrap();
    assert_eq!(stored.state(), trueno_lineage::experiment::RunState::Closed);
}

#[tokio::test]
async fn test_concurrent_syncs_upload_once() {
    let tracker = memory_tracker();
    let run = census_run(&tracker);
    run.random_split(&census_frame(30), &[0.5, 0.5], 2).unwrap();

    let (a, b) = tokio::join!(tracker.sync(&run), tracker.sync(&run));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.is_noop() != b.is_noop());
    assert_eq!(tracker.client().store().batch_count(), 1);
}

#[tokio::test]
async fn test_store_rejects_edges_to_unknown_nodes() {
    let tracker = memory_tracker();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();

    let batch = SyncBatch::from_delta(
        run.project().clone(),
        run.experiment().clone(),
        run.record(),
        &run.pending_delta(),
        |_| true,
    );
    let store = MemoryMetadataStore::new();
    let response = store.upload_batch(&batch).await.unwrap();

    assert_eq!(response.status, BatchStatus::Rejected);
    assert!(response.message.is_some());
    assert_eq!(store.node_count(), 0);
}

#[tokio::test]
async fn test_replayed_batch_gets_original_response() {
    let tracker = memory_tracker();
    let run = census_run(&tracker);
    run.select_columns(&census_frame(10), &["age"]).unwrap();

    let batch = SyncBatch::from_delta(
        run.project().clone(),
        run.experiment().clone(),
        run.record(),
        &run.pending_delta(),
        |_| false,
    );
    let store = MemoryMetadataStore::new();
    let first = store.upload_batch(&batch).await.unwrap();
    let replay = store.upload_batch(&batch).await.unwrap();

    assert_eq!(first, replay);
    assert_eq!(replay.created(), 3);
    assert_eq!(store.batch_count(), 1);
}
