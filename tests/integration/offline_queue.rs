//! Integration tests for the offline mutation link
//!
//! Tests cover:
//! - Pass-through of queries and online mutations
//! - Queueing while offline, with optimistic layers
//! - Strictly serial, ordered replay
//! - Rejected responses staying queued
//! - Drain aborts on connectivity loss and replay timeout
//! - Re-issued requests settling their queued callers
//! - Settled requests leaving the state table
//! - Rolling back a queued entry when the optimistic write fails
//! - Restoring a persisted queue

use super::test_utils::{mutation, query, IssuedRequests, ScriptedLink};
use futures::StreamExt;
use graphcache::cache::{
    CacheStore, InMemoryCacheStore, NormalizedRecord, RecordSource, WriteOptions,
};
use graphcache::connectivity::ConnectivityGate;
use graphcache::error::{LinkError, StorageError};
use graphcache::link::{
    DrainAbort, DrainReport, Link, MutationQueueLink, MutationState, QueueLinkConfig, StateChange,
};
use graphcache::operation::OperationRequest;
use graphcache::queue::{InMemoryQueueStore, QueueStore, SledQueueStore};
use graphcache::types::{DataSource, RequestId, ROOT_MUTATION};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    link: MutationQueueLink,
    issued: IssuedRequests,
    queue: Arc<InMemoryQueueStore>,
    cache: Arc<InMemoryCacheStore>,
    gate: Arc<ConnectivityGate>,
}

impl Harness {
    fn new(online: bool, config: QueueLinkConfig) -> Self {
        let (transport, issued) = ScriptedLink::new();
        let queue = Arc::new(InMemoryQueueStore::new());
        let cache = Arc::new(InMemoryCacheStore::new());
        let gate = Arc::new(ConnectivityGate::new(online));
        let link = MutationQueueLink::new(
            Arc::new(transport),
            queue.clone(),
            cache.clone(),
            gate.clone(),
            config,
        )
        .unwrap();
        Self {
            link,
            issued,
            queue,
            cache,
            gate,
        }
    }

    fn spawn_drain(&self) -> tokio::task::JoinHandle<Result<DrainReport, LinkError>> {
        let link = self.link.clone();
        tokio::spawn(async move { link.drain().await })
    }

    fn state(&self, id: &str) -> Option<MutationState> {
        self.link.state(&RequestId::new(id))
    }

    fn queued_keys(&self) -> Vec<String> {
        self.queue
            .entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect()
    }
}

#[tokio::test]
async fn test_queries_pass_through_while_offline() {
    let mut h = Harness::new(false, QueueLinkConfig::default());

    let _responses = h.link.request(query("q1"));
    let issued = h.issued.next().await;

    assert_eq!(issued.id(), "q1");
    assert!(h.queue.is_empty().unwrap());
    assert_eq!(h.state("q1"), None);
}

#[tokio::test]
async fn test_online_mutation_is_forwarded() {
    let mut h = Harness::new(true, QueueLinkConfig::default());

    let mut responses = h.link.request(mutation("m1"));
    let issued = h.issued.next().await;
    assert_eq!(issued.id(), "m1");
    assert_eq!(h.state("m1"), Some(MutationState::Forwarded));

    issued.respond_ok();
    drop(issued);

    let response = responses.next().await.unwrap().unwrap();
    assert_eq!(response.data_source, DataSource::Network);
    assert!(responses.next().await.is_none());
    assert!(h.queue.is_empty().unwrap());
    assert_eq!(h.state("m1"), None);
}

#[tokio::test]
async fn test_offline_mutations_are_queued_not_forwarded() {
    let mut h = Harness::new(false, QueueLinkConfig::default());

    let _m1 = h.link.request(mutation("m1"));
    let _m2 = h.link.request(mutation("m2"));

    h.issued.assert_idle().await;
    assert_eq!(h.queued_keys(), vec!["m1", "m2"]);
    assert_eq!(h.state("m1"), Some(MutationState::Queued));

    let pending = h.link.pending().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[1].variables["title"], json!("todo m2"));
}

#[tokio::test]
async fn test_replay_preserves_order_and_waits_for_each_response() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let callers: Vec<_> = ["m1", "m2", "m3"]
        .iter()
        .map(|id| h.link.request(mutation(id)))
        .collect();

    h.gate.set_online(true);
    let drain = h.spawn_drain();

    for id in ["m1", "m2", "m3"] {
        let issued = h.issued.next().await;
        assert_eq!(issued.id(), id);
        // The next entry is not issued before this one is answered.
        h.issued.assert_idle().await;
        issued.respond_ok();
    }

    let report = drain.await.unwrap().unwrap();
    assert_eq!(
        report,
        DrainReport {
            attempted: 3,
            dequeued: 3,
            retained: 0,
            aborted: None,
        }
    );
    assert!(h.queue.is_empty().unwrap());

    for mut caller in callers {
        let response = caller.next().await.unwrap().unwrap();
        assert_eq!(response.data_source, DataSource::Network);
        assert!(caller.next().await.is_none(), "caller stream should complete");
    }
    assert_eq!(h.state("m3"), None);
}

#[tokio::test]
async fn test_rejected_response_keeps_entry_for_next_drain() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let mut caller = h.link.request(mutation("m1"));
    h.gate.set_online(true);

    let drain = h.spawn_drain();
    h.issued.next().await.respond_errors("boom");
    let report = drain.await.unwrap().unwrap();

    assert_eq!(report.retained, 1);
    assert_eq!(report.dequeued, 0);
    assert_eq!(h.queued_keys(), vec!["m1"]);
    assert_eq!(h.state("m1"), Some(MutationState::Queued));

    match caller.next().await.unwrap() {
        Err(LinkError::Rejected(response)) => {
            assert_eq!(response.errors[0].message, "boom");
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    let drain = h.spawn_drain();
    h.issued.next().await.respond_ok();
    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.dequeued, 1);
    assert!(h.queue.is_empty().unwrap());

    assert!(caller.next().await.unwrap().is_ok());
    assert!(caller.next().await.is_none());
}

#[tokio::test]
async fn test_dequeue_on_error_accepts_errored_response() {
    let config = QueueLinkConfig {
        dequeue_on_error: true,
        ..QueueLinkConfig::default()
    };
    let mut h = Harness::new(false, config);
    let mut caller = h.link.request(mutation("m1"));
    h.gate.set_online(true);

    let drain = h.spawn_drain();
    h.issued.next().await.respond_errors("validation failed");
    let report = drain.await.unwrap().unwrap();

    assert_eq!(report.dequeued, 1);
    assert!(h.queue.is_empty().unwrap());
    let response = caller.next().await.unwrap().unwrap();
    assert!(response.has_errors());
}

#[tokio::test]
async fn test_predicate_and_exception_handler_see_errored_responses() {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    let config = QueueLinkConfig::default()
        .with_should_dequeue(|response| {
            response
                .errors
                .iter()
                .any(|e| e.message.contains("already exists"))
        })
        .with_exception_handler(move |_response, _sink| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let mut h = Harness::new(false, config);
    let _m1 = h.link.request(mutation("m1"));
    let _m2 = h.link.request(mutation("m2"));
    h.gate.set_online(true);

    let drain = h.spawn_drain();
    h.issued.next().await.respond_errors("todo already exists");
    h.issued.next().await.respond_errors("server unavailable");
    let report = drain.await.unwrap().unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 2);
    assert_eq!(report.dequeued, 1);
    assert_eq!(report.retained, 1);
    assert_eq!(h.queued_keys(), vec!["m2"]);
}

#[tokio::test]
async fn test_same_request_id_is_queued_once() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let mut first = h.link.request(mutation("m1"));
    let mut second = h.link.request(mutation("m1"));
    assert_eq!(h.queue.len().unwrap(), 1);

    h.gate.set_online(true);
    let drain = h.spawn_drain();
    let issued = h.issued.next().await;
    h.issued.assert_idle().await;
    issued.respond_ok();
    assert_eq!(drain.await.unwrap().unwrap().attempted, 1);

    assert!(first.next().await.unwrap().is_ok());
    assert!(second.next().await.unwrap().is_ok());
}

#[tokio::test]
async fn test_reissued_request_completes_queued_caller() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let mut original = h.link.request(mutation("m1"));
    h.gate.set_online(true);

    let mut retry = h.link.request(mutation("m1"));
    let issued = h.issued.next().await;
    assert_eq!(issued.id(), "m1");
    issued.respond_ok();
    drop(issued);

    assert!(retry.next().await.unwrap().is_ok());
    assert!(h.queue.is_empty().unwrap());
    assert_eq!(h.state("m1"), None);

    let delivered = tokio::time::timeout(Duration::from_secs(5), original.next())
        .await
        .expect("queued caller never saw the response");
    assert_eq!(delivered.unwrap().unwrap().data_source, DataSource::Network);
    let end = tokio::time::timeout(Duration::from_secs(5), original.next())
        .await
        .expect("queued caller stream never completed");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_rejected_reissue_keeps_queued_caller_open() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let mut original = h.link.request(mutation("m1"));
    h.gate.set_online(true);

    let mut retry = h.link.request(mutation("m1"));
    h.issued.next().await.respond_errors("boom");
    assert!(matches!(retry.next().await, Some(Err(LinkError::Rejected(_)))));

    let rejected = tokio::time::timeout(Duration::from_secs(5), original.next())
        .await
        .unwrap();
    assert!(matches!(rejected, Some(Err(LinkError::Rejected(_)))));
    assert_eq!(h.queued_keys(), vec!["m1"]);
    assert_eq!(h.state("m1"), Some(MutationState::Queued));

    let drain = h.spawn_drain();
    h.issued.next().await.respond_ok();
    assert_eq!(drain.await.unwrap().unwrap().dequeued, 1);
    assert!(original.next().await.unwrap().is_ok());
    assert!(original.next().await.is_none());
}

#[tokio::test]
async fn test_settled_requests_leave_state_table() {
    let mut h = Harness::new(true, QueueLinkConfig::default());

    for i in 0..20 {
        let id = format!("online{}", i);
        let mut responses = h.link.request(mutation(&id));
        let issued = h.issued.next().await;
        if i % 5 == 0 {
            issued.respond_errors("boom");
        } else {
            issued.respond_ok();
        }
        drop(issued);
        while responses.next().await.is_some() {}
    }
    assert_eq!(h.link.tracked_requests(), 0);

    h.gate.set_online(false);
    let _queued: Vec<_> = (0..5)
        .map(|i| h.link.request(mutation(&format!("offline{}", i))))
        .collect();
    assert_eq!(h.link.tracked_requests(), 5);

    h.gate.set_online(true);
    let drain = h.spawn_drain();
    for _ in 0..5 {
        h.issued.next().await.respond_ok();
    }
    assert_eq!(drain.await.unwrap().unwrap().dequeued, 5);
    assert_eq!(h.link.tracked_requests(), 0);
    assert_eq!(h.state("offline0"), None);
}

/// Cache whose writes always fail.
struct FailingCache;

impl RecordSource for FailingCache {
    fn read(&self, _id: &str) -> Result<Option<NormalizedRecord>, StorageError> {
        Ok(None)
    }
}

impl CacheStore for FailingCache {
    fn put_record(&self, _record: NormalizedRecord) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove_record(&self, _id: &str) -> Result<bool, StorageError> {
        Ok(false)
    }

    fn write(
        &self,
        _request: &OperationRequest,
        _data: &Value,
        _options: &WriteOptions,
    ) -> Result<(), StorageError> {
        Err(StorageError::Codec("cache unavailable".to_string()))
    }

    fn remove_optimistic(&self, _request_id: &RequestId) -> Result<bool, StorageError> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_failed_optimistic_write_rolls_back_queue_entry() {
    let (transport, mut issued) = ScriptedLink::new();
    let queue = Arc::new(InMemoryQueueStore::new());
    let link = MutationQueueLink::new(
        Arc::new(transport),
        queue.clone(),
        Arc::new(FailingCache),
        Arc::new(ConnectivityGate::new(false)),
        QueueLinkConfig::default(),
    )
    .unwrap();
    let optimistic = json!({ "addTodo": { "id": "tmp", "title": "pending" } });

    let _plain = link.request(mutation("m0"));
    let mut failed = link.request(mutation("m1").with_optimistic_response(optimistic.clone()));
    assert!(matches!(failed.next().await, Some(Err(LinkError::Storage(_)))));
    assert!(failed.next().await.is_none());
    assert_eq!(link.state(&RequestId::new("m1")), None);

    // A failed re-enqueue restores the entry that was already queued.
    let mut again = link.request(mutation("m0").with_optimistic_response(optimistic));
    assert!(matches!(again.next().await, Some(Err(LinkError::Storage(_)))));

    let pending = link.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id.as_str(), "m0");
    assert!(pending[0].optimistic_response.is_none());
    assert_eq!(queue.len().unwrap(), 1);

    link.gate().set_online(true);
    let drain = tokio::spawn({
        let link = link.clone();
        async move { link.drain().await }
    });
    let next = issued.next().await;
    assert_eq!(next.id(), "m0");
    next.respond_ok();
    assert_eq!(drain.await.unwrap().unwrap().attempted, 1);
}

#[tokio::test]
async fn test_connectivity_loss_aborts_drain() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let _m1 = h.link.request(mutation("m1"));
    let _m2 = h.link.request(mutation("m2"));
    h.gate.set_online(true);

    let drain = h.spawn_drain();
    let issued = h.issued.next().await;
    h.gate.set_online(false);
    issued.respond_ok();

    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.dequeued, 1);
    assert_eq!(report.aborted, Some(DrainAbort::WentOffline));
    assert_eq!(h.queued_keys(), vec!["m2"]);
    assert_eq!(h.state("m2"), Some(MutationState::Queued));
    h.issued.assert_idle().await;
}

#[tokio::test]
async fn test_replay_timeout_aborts_pass() {
    let config = QueueLinkConfig {
        replay_timeout: Some(Duration::from_millis(50)),
        ..QueueLinkConfig::default()
    };
    let mut h = Harness::new(false, config);
    let _m1 = h.link.request(mutation("m1"));
    let _m2 = h.link.request(mutation("m2"));
    h.gate.set_online(true);

    let drain = h.spawn_drain();
    let _unanswered = h.issued.next().await;
    let report = drain.await.unwrap().unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.retained, 1);
    assert_eq!(report.aborted, Some(DrainAbort::Timeout(RequestId::new("m1"))));
    assert_eq!(h.queued_keys(), vec!["m1", "m2"]);
    assert_eq!(h.state("m1"), Some(MutationState::Queued));
}

#[tokio::test]
async fn test_stream_ending_without_response_moves_on() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let _m1 = h.link.request(mutation("m1"));
    let _m2 = h.link.request(mutation("m2"));
    h.gate.set_online(true);

    let drain = h.spawn_drain();
    h.issued.next().await.hang_up();
    let issued = h.issued.next().await;
    assert_eq!(issued.id(), "m2");
    issued.respond_ok();

    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.dequeued, 1);
    assert_eq!(report.retained, 1);
    assert_eq!(h.queued_keys(), vec!["m1"]);
    assert_eq!(h.state("m1"), Some(MutationState::Queued));
}

#[tokio::test]
async fn test_undecodable_entry_is_skipped() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    h.queue.put("corrupt", b"\x00\x01".to_vec()).unwrap();
    let _m1 = h.link.request(mutation("m1"));
    h.gate.set_online(true);

    let drain = h.spawn_drain();
    h.issued.next().await.respond_ok();
    let report = drain.await.unwrap().unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.dequeued, 1);
    assert_eq!(h.queued_keys(), vec!["corrupt"]);
}

#[tokio::test]
async fn test_optimistic_layer_is_dropped_on_dequeue() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let request = mutation("m1")
        .with_optimistic_response(json!({ "addTodo": { "id": "m1", "title": "pending" } }));
    let _caller = h.link.request(request);

    assert_eq!(h.cache.optimistic_layer_count(), 1);
    let root = h.cache.read(ROOT_MUTATION).unwrap().unwrap();
    assert!(root.fields.keys().any(|key| key.starts_with("addTodo")));

    h.gate.set_online(true);
    let drain = h.spawn_drain();
    h.issued.next().await.respond_ok();
    drain.await.unwrap().unwrap();

    assert_eq!(h.cache.optimistic_layer_count(), 0);
    assert!(h.cache.read(ROOT_MUTATION).unwrap().is_none());
}

#[tokio::test]
async fn test_persisted_optimistic_response_is_written_through() {
    let config = QueueLinkConfig {
        persist_optimistic_response: true,
        ..QueueLinkConfig::default()
    };
    let h = Harness::new(false, config);
    let request = mutation("m1")
        .with_optimistic_response(json!({ "addTodo": { "id": "m1", "title": "pending" } }));
    let _caller = h.link.request(request);

    assert_eq!(h.cache.optimistic_layer_count(), 0);
    assert!(h.cache.read(ROOT_MUTATION).unwrap().is_some());
    assert!(!h.cache.remove_optimistic(&RequestId::new("m1")).unwrap());
}

#[tokio::test]
async fn test_reconnect_triggers_drain_and_announces_states() {
    let mut h = Harness::new(false, QueueLinkConfig::default());
    let mut states = h.link.subscribe_states();
    let watcher = h.link.spawn_replay_on_reconnect();

    let _caller = h.link.request(mutation("m1"));
    h.gate.set_online(true);
    h.issued.next().await.respond_ok();

    let mut seen = Vec::new();
    while seen.last() != Some(&MutationState::Dequeued) {
        let StateChange { request_id, state } =
            tokio::time::timeout(Duration::from_secs(5), states.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(request_id.as_str(), "m1");
        seen.push(state);
    }
    assert_eq!(
        seen,
        vec![
            MutationState::Queued,
            MutationState::Replayed,
            MutationState::Dequeued
        ]
    );
    watcher.abort();
}

#[tokio::test]
async fn test_persisted_queue_is_restored() {
    let dir = TempDir::new().unwrap();
    {
        let (transport, _issued) = ScriptedLink::new();
        let queue = Arc::new(SledQueueStore::new(dir.path()).unwrap());
        let link = MutationQueueLink::new(
            Arc::new(transport),
            queue.clone(),
            Arc::new(InMemoryCacheStore::new()),
            Arc::new(ConnectivityGate::new(false)),
            QueueLinkConfig::default(),
        )
        .unwrap();
        let _m1 = link.request(mutation("m1"));
        let _m2 = link.request(mutation("m2"));
        queue.flush().unwrap();
    }

    let (transport, mut issued) = ScriptedLink::new();
    let link = MutationQueueLink::new(
        Arc::new(transport),
        Arc::new(SledQueueStore::new(dir.path()).unwrap()),
        Arc::new(InMemoryCacheStore::new()),
        Arc::new(ConnectivityGate::new(true)),
        QueueLinkConfig::default(),
    )
    .unwrap();
    assert_eq!(link.state(&RequestId::new("m1")), Some(MutationState::Queued));
    let ids: Vec<String> = link
        .pending()
        .unwrap()
        .into_iter()
        .map(|request| request.request_id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["m1", "m2"]);

    let drain = tokio::spawn({
        let link = link.clone();
        async move { link.drain().await }
    });
    for id in ["m1", "m2"] {
        let next = issued.next().await;
        assert_eq!(next.id(), id);
        next.respond_ok();
    }
    assert_eq!(drain.await.unwrap().unwrap().dequeued, 2);
    assert!(link.pending().unwrap().is_empty());
}
