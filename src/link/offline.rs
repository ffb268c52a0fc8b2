//! Offline Mutation Link
//!
//! Pipeline stage that defers mutations while offline and replays them, one at
//! a time and in persisted order, once connectivity returns.
//!
//! - Queries, subscriptions and online mutations pass straight to the next link.
//! - An offline mutation is persisted under its request id, optionally patched
//!   into the cache optimistically, and not forwarded. Its caller gets a stream
//!   that stays open until the mutation is replayed and accepted.
//! - A mutation response is judged on the way back: an accepted one deletes
//!   the queue entry for its request id, a rejected one surfaces as
//!   [`LinkError::Rejected`] and leaves the entry queued. Callers still waiting
//!   on a queued request id see every judged response for that id, whether it
//!   came from a drain or from the caller re-issuing the request.
//! - Settled requests leave the state table; their final transition is only
//!   visible through [`MutationQueueLink::subscribe_states`].

use crate::cache::{CacheStore, WriteOptions};
use crate::codec::{JsonCodec, RequestCodec};
use crate::config::QueueSettings;
use crate::connectivity::ConnectivityGate;
use crate::error::{LinkError, StorageError};
use crate::link::state::{MutationState, MutationStates, StateChange};
use crate::link::{Link, ResponseStream};
use crate::operation::{OperationRequest, OperationResponse};
use crate::queue::QueueStore;
use crate::types::{DataSource, RequestId};
use futures::channel::mpsc;
use futures::{future, stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Decides whether an errored response should still dequeue its mutation.
pub type DequeuePredicate = Arc<dyn Fn(&OperationResponse) -> bool + Send + Sync>;

/// Called for every errored mutation response before the dequeue decision.
pub type ExceptionHandler = Arc<dyn Fn(&OperationResponse, &mut ResponseSink) + Send + Sync>;

type ResponseItem = Result<OperationResponse, LinkError>;

/// Extra items an exception handler wants delivered ahead of the verdict.
#[derive(Default)]
pub struct ResponseSink {
    items: Vec<ResponseItem>,
}

impl ResponseSink {
    pub fn emit(&mut self, response: OperationResponse) {
        self.items.push(Ok(response));
    }

    pub fn emit_error(&mut self, error: LinkError) {
        self.items.push(Err(error));
    }

    fn into_items(self) -> Vec<ResponseItem> {
        self.items
    }
}

#[derive(Clone, Default)]
pub struct QueueLinkConfig {
    /// Write optimistic patches through as real data instead of a removable layer.
    pub persist_optimistic_response: bool,
    /// Dequeue mutations even when their response carries errors.
    pub dequeue_on_error: bool,
    pub should_dequeue_request: Option<DequeuePredicate>,
    pub exception_handler: Option<ExceptionHandler>,
    /// Give up on a drain pass when a replayed entry gets no network response in time.
    pub replay_timeout: Option<Duration>,
}

impl QueueLinkConfig {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            persist_optimistic_response: settings.persist_optimistic_response,
            dequeue_on_error: settings.dequeue_on_error,
            should_dequeue_request: None,
            exception_handler: None,
            replay_timeout: settings.replay_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn with_should_dequeue<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&OperationResponse) -> bool + Send + Sync + 'static,
    {
        self.should_dequeue_request = Some(Arc::new(predicate));
        self
    }

    pub fn with_exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&OperationResponse, &mut ResponseSink) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for QueueLinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueLinkConfig")
            .field("persist_optimistic_response", &self.persist_optimistic_response)
            .field("dequeue_on_error", &self.dequeue_on_error)
            .field("should_dequeue_request", &self.should_dequeue_request.is_some())
            .field("exception_handler", &self.exception_handler.is_some())
            .field("replay_timeout", &self.replay_timeout)
            .finish()
    }
}

/// Why a drain pass stopped before the end of its snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainAbort {
    WentOffline,
    Timeout(RequestId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub dequeued: usize,
    pub retained: usize,
    pub aborted: Option<DrainAbort>,
}

/// Items produced by judging one upstream item.
struct Judged {
    items: Vec<ResponseItem>,
    /// The request was accepted and its queue entry deleted.
    settled: bool,
}

impl Judged {
    fn passthrough(item: ResponseItem) -> Self {
        Self {
            items: vec![item],
            settled: false,
        }
    }
}

enum ReplayOutcome {
    Dequeued,
    Retained,
    TimedOut,
}

struct LinkInner {
    next: Arc<dyn Link>,
    queue: Arc<dyn QueueStore>,
    cache: Arc<dyn CacheStore>,
    codec: Arc<dyn RequestCodec>,
    gate: Arc<ConnectivityGate>,
    config: QueueLinkConfig,
    states: MutationStates,
    waiters: Mutex<HashMap<RequestId, Vec<mpsc::UnboundedSender<ResponseItem>>>>,
    drain_lock: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct MutationQueueLink {
    inner: Arc<LinkInner>,
}

impl MutationQueueLink {
    /// Build the link with the JSON request codec.
    pub fn new(
        next: Arc<dyn Link>,
        queue: Arc<dyn QueueStore>,
        cache: Arc<dyn CacheStore>,
        gate: Arc<ConnectivityGate>,
        config: QueueLinkConfig,
    ) -> Result<Self, StorageError> {
        Self::with_codec(next, queue, cache, gate, config, Arc::new(JsonCodec))
    }

    /// Build the link; entries already persisted are restored as `Queued`.
    pub fn with_codec(
        next: Arc<dyn Link>,
        queue: Arc<dyn QueueStore>,
        cache: Arc<dyn CacheStore>,
        gate: Arc<ConnectivityGate>,
        config: QueueLinkConfig,
        codec: Arc<dyn RequestCodec>,
    ) -> Result<Self, StorageError> {
        let states = MutationStates::new();
        let restored = queue.entries()?;
        for entry in &restored {
            states.set(&RequestId::new(entry.key.clone()), MutationState::Queued);
        }
        if !restored.is_empty() {
            info!(entries = restored.len(), "Restored pending mutations from queue");
        }

        Ok(Self {
            inner: Arc::new(LinkInner {
                next,
                queue,
                cache,
                codec,
                gate,
                config,
                states,
                waiters: Mutex::new(HashMap::new()),
                drain_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn gate(&self) -> &Arc<ConnectivityGate> {
        &self.inner.gate
    }

    pub fn state(&self, request_id: &RequestId) -> Option<MutationState> {
        self.inner.states.get(request_id)
    }

    pub fn subscribe_states(&self) -> broadcast::Receiver<StateChange> {
        self.inner.states.subscribe()
    }

    /// Number of requests currently in the state table.
    pub fn tracked_requests(&self) -> usize {
        self.inner.states.len()
    }

    /// Decoded requests currently in the queue, in persisted order.
    pub fn pending(&self) -> Result<Vec<OperationRequest>, StorageError> {
        self.inner
            .queue
            .entries()?
            .iter()
            .map(|entry| self.inner.codec.deserialize(&entry.value))
            .collect()
    }

    /// Replay a snapshot of the queue, one entry at a time.
    ///
    /// Each entry is forwarded and its first network response awaited before
    /// the next is issued. Entries queued after the snapshot wait for the next
    /// pass. The pass stops early if the gate goes offline or a replay times
    /// out; the queue stays the source of truth, so the next pass starts over
    /// from a fresh snapshot.
    pub async fn drain(&self) -> Result<DrainReport, LinkError> {
        let _running = self.inner.drain_lock.lock().await;
        let snapshot = self.inner.queue.entries()?;
        let mut report = DrainReport::default();
        if snapshot.is_empty() {
            return Ok(report);
        }
        info!(entries = snapshot.len(), "Draining offline mutation queue");

        for entry in snapshot {
            if !self.inner.gate.is_online() {
                warn!(remaining_key = %entry.key, "Connectivity lost mid-drain, stopping pass");
                report.aborted = Some(DrainAbort::WentOffline);
                break;
            }
            // Settled by another path since the snapshot was taken.
            if self.inner.queue.get(&entry.key)?.is_none() {
                continue;
            }
            let request = match self.inner.codec.deserialize(&entry.value) {
                Ok(request) => request,
                Err(err) => {
                    error!(key = %entry.key, error = %err, "Skipping undecodable queue entry");
                    continue;
                }
            };

            report.attempted += 1;
            let request_id = request.request_id.clone();
            self.inner.states.set(&request_id, MutationState::Replayed);
            match self.replay(request).await {
                ReplayOutcome::Dequeued => report.dequeued += 1,
                ReplayOutcome::Retained => report.retained += 1,
                ReplayOutcome::TimedOut => {
                    report.retained += 1;
                    report.aborted = Some(DrainAbort::Timeout(request_id));
                    break;
                }
            }
        }

        info!(
            attempted = report.attempted,
            dequeued = report.dequeued,
            retained = report.retained,
            aborted = ?report.aborted,
            "Drain finished"
        );
        Ok(report)
    }

    /// Run a drain on every offline -> online transition of the gate.
    pub fn spawn_replay_on_reconnect(&self) -> JoinHandle<()> {
        let link = self.clone();
        let mut changes = self.inner.gate.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(true) => link.drain_and_log().await,
                    Ok(false) => debug!("Went offline; mutations will queue"),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Missed connectivity changes");
                        if link.inner.gate.is_online() {
                            link.drain_and_log().await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn drain_and_log(&self) {
        if let Err(err) = self.drain().await {
            error!(error = %err, "Drain failed");
        }
    }

    async fn replay(&self, request: OperationRequest) -> ReplayOutcome {
        let request_id = request.request_id.clone();
        let mut responses = self.forward(request);
        let inner = &self.inner;

        let settle = async {
            while let Some(item) = responses.next().await {
                // Waiters were already served when the item was judged.
                let verdict = match &item {
                    Err(LinkError::Rejected(response)) if is_network_for(response, &request_id) => {
                        Some(ReplayOutcome::Retained)
                    }
                    Ok(response)
                        if is_network_for(response, &request_id)
                            && !inner.is_pending(&request_id) =>
                    {
                        Some(ReplayOutcome::Dequeued)
                    }
                    _ => None,
                };
                if let Some(outcome) = verdict {
                    return outcome;
                }
            }
            warn!(request_id = %request_id, "Replay ended without a network response");
            inner.requeue(&request_id);
            ReplayOutcome::Retained
        };

        match inner.config.replay_timeout {
            Some(limit) => match tokio::time::timeout(limit, settle).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(request_id = %request_id, timeout = ?limit, "Replay timed out");
                    inner.requeue(&request_id);
                    ReplayOutcome::TimedOut
                }
            },
            None => settle.await,
        }
    }

    fn forward(&self, request: OperationRequest) -> ResponseStream {
        let request_id = request.request_id.clone();
        let upstream = self.inner.next.request(request);
        let inner = Arc::clone(&self.inner);
        upstream
            .flat_map(move |item| {
                let judged = inner.handle_response(item);
                inner.notify_waiters(&request_id, &judged.items, judged.settled);
                stream::iter(judged.items)
            })
            .boxed()
    }

    fn enqueue(&self, request: OperationRequest) -> Result<ResponseStream, LinkError> {
        let inner = &self.inner;
        let request_id = request.request_id.clone();

        let bytes = inner.codec.serialize(&request)?;
        let previous = inner.queue.get(request_id.as_str())?;
        inner.queue.put(request_id.as_str(), bytes)?;

        if let Some(payload) = &request.optimistic_response {
            let options = WriteOptions {
                optimistic: !inner.config.persist_optimistic_response,
                request_id: Some(request_id.clone()),
            };
            if let Err(err) = inner.cache.write(&request, payload, &options) {
                // Undo the put so a failed enqueue is never replayed.
                let restored = match previous {
                    Some(entry) => inner.queue.put(request_id.as_str(), entry.value),
                    None => inner.queue.delete(request_id.as_str()).map(|_| ()),
                };
                if let Err(undo) = restored {
                    error!(request_id = %request_id, error = %undo, "Failed to roll back queue entry");
                }
                return Err(err.into());
            }
        }

        inner.states.set(&request_id, MutationState::Queued);
        info!(
            request_id = %request_id,
            operation = request.operation_name().unwrap_or("<anonymous>"),
            optimistic = request.optimistic_response.is_some(),
            "Mutation queued while offline"
        );

        let (tx, rx) = mpsc::unbounded();
        inner.waiters.lock().entry(request_id).or_default().push(tx);
        Ok(rx.boxed())
    }
}

impl Link for MutationQueueLink {
    fn request(&self, request: OperationRequest) -> ResponseStream {
        if !request.is_mutation() {
            return self.inner.next.request(request);
        }

        if self.inner.gate.is_online() {
            let request_id = &request.request_id;
            if !self.inner.is_pending(request_id) {
                self.inner.states.set(request_id, MutationState::Forwarded);
            }
            debug!(request_id = %request_id, "Forwarding mutation");
            return self.forward(request);
        }

        match self.enqueue(request) {
            Ok(responses) => responses,
            Err(err) => {
                error!(error = %err, "Failed to queue mutation");
                stream::once(future::ready(Err(err))).boxed()
            }
        }
    }
}

impl LinkInner {
    /// Judge one response on its way back to the caller.
    fn handle_response(&self, item: ResponseItem) -> Judged {
        let response = match item {
            Ok(response) => response,
            Err(err) => return Judged::passthrough(Err(err)),
        };
        if response.data_source == DataSource::Optimistic || !response.request.is_mutation() {
            return Judged::passthrough(Ok(response));
        }

        let mut sink = ResponseSink::default();
        let has_errors = response.has_errors();
        if has_errors {
            if let Some(handler) = &self.config.exception_handler {
                handler(&response, &mut sink);
            }
        }

        let accepted = !has_errors
            || self.config.dequeue_on_error
            || self
                .config
                .should_dequeue_request
                .as_ref()
                .is_some_and(|predicate| predicate(&response));
        let request_id = response.request_id().clone();
        let was_pending = self.is_pending(&request_id);

        if !accepted {
            warn!(
                request_id = %request_id,
                errors = response.errors.len(),
                "Mutation response rejected, keeping queue entry"
            );
            if was_pending {
                self.states.set(&request_id, MutationState::Queued);
            } else {
                self.states.forget(&request_id);
            }
            sink.emit_error(LinkError::Rejected(Box::new(response)));
            return Judged {
                items: sink.into_items(),
                settled: false,
            };
        }

        match self.queue.delete(request_id.as_str()) {
            Ok(removed) => debug!(request_id = %request_id, removed, "Mutation dequeued"),
            Err(err) => {
                error!(request_id = %request_id, error = %err, "Failed to delete queue entry");
                sink.emit_error(err.into());
            }
        }
        if let Err(err) = self.cache.remove_optimistic(&request_id) {
            error!(request_id = %request_id, error = %err, "Failed to drop optimistic layer");
        }
        if was_pending {
            self.states.retire(&request_id, MutationState::Dequeued);
        } else {
            self.states.forget(&request_id);
        }
        sink.emit(response);
        Judged {
            items: sink.into_items(),
            settled: true,
        }
    }

    /// Mark an unsettled replay as queued again, unless its entry is gone.
    fn requeue(&self, request_id: &RequestId) {
        match self.queue.get(request_id.as_str()) {
            Ok(Some(_)) => self.states.set(request_id, MutationState::Queued),
            Ok(None) => {
                self.states.forget(request_id);
            }
            Err(err) => {
                error!(request_id = %request_id, error = %err, "Failed to read queue entry");
                self.states.set(request_id, MutationState::Queued);
            }
        }
    }

    fn is_pending(&self, request_id: &RequestId) -> bool {
        self.states
            .get(request_id)
            .is_some_and(|state| state.is_pending())
    }

    /// Hand judged items to callers still waiting on a queued request.
    fn notify_waiters(&self, request_id: &RequestId, items: &[ResponseItem], settled: bool) {
        let mut waiters = self.waiters.lock();
        if settled {
            // Dropping the senders completes the callers' streams.
            for tx in waiters.remove(request_id).unwrap_or_default() {
                for item in items {
                    let _ = tx.unbounded_send(item.clone());
                }
            }
            return;
        }
        if let Some(senders) = waiters.get_mut(request_id) {
            senders.retain(|tx| {
                items
                    .iter()
                    .all(|item| tx.unbounded_send(item.clone()).is_ok())
            });
        }
    }
}

fn is_network_for(response: &OperationResponse, request_id: &RequestId) -> bool {
    response.data_source == DataSource::Network && response.request_id() == request_id
}
