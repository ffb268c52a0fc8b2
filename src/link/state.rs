//! Per-request mutation lifecycle.

use crate::types::RequestId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::trace;

const STATE_CHANNEL_CAPACITY: usize = 256;

/// Where a mutation stands in the offline pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Sent straight to the next link while online.
    Forwarded,
    /// Persisted in the queue, waiting for connectivity.
    Queued,
    /// Re-issued by a drain, waiting for its network response.
    Replayed,
    /// Accepted and removed from the queue.
    Dequeued,
}

impl MutationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, MutationState::Queued | MutationState::Replayed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub request_id: RequestId,
    pub state: MutationState,
}

/// State table plus a broadcast of every transition.
pub struct MutationStates {
    states: RwLock<HashMap<RequestId, MutationState>>,
    changes: broadcast::Sender<StateChange>,
}

impl MutationStates {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            states: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn get(&self, request_id: &RequestId) -> Option<MutationState> {
        self.states.read().get(request_id).copied()
    }

    /// Record `state`, announcing it if it differs from the current one.
    pub fn set(&self, request_id: &RequestId, state: MutationState) {
        let previous = self.states.write().insert(request_id.clone(), state);
        if previous == Some(state) {
            return;
        }
        trace!(request_id = %request_id, ?previous, ?state, "Mutation state changed");
        let _ = self.changes.send(StateChange {
            request_id: request_id.clone(),
            state,
        });
    }

    /// Drop a request from the table without announcing anything.
    pub fn forget(&self, request_id: &RequestId) -> Option<MutationState> {
        self.states.write().remove(request_id)
    }

    /// Announce a final `state` and drop the request from the table.
    ///
    /// Subscribers still see the transition; `get` returns `None` afterwards.
    pub fn retire(&self, request_id: &RequestId, state: MutationState) {
        let previous = self.states.write().remove(request_id);
        trace!(request_id = %request_id, ?previous, ?state, "Mutation settled");
        let _ = self.changes.send(StateChange {
            request_id: request_id.clone(),
            state,
        });
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}

impl Default for MutationStates {
    fn default() -> Self {
        Self::new()
    }
}
