use crate::coordinate::ReplicaTransport;
use cache::{Key, Value};
use membership::{FailureDetector, NodeId, NodeStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const DEFAULT_MAX_PER_NODE: usize = 1024;
const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// The operation a hint will replay.
#[derive(Clone, Debug, PartialEq)]
pub enum HintOp {
    Put(Value),
    Delete,
}

/// A write buffered for a replica which was unreachable when the
/// coordinator fanned out.
#[derive(Clone, Debug)]
pub struct Hint {
    pub key: Key,
    pub op: HintOp,
    queued_at: Instant,
}

impl Hint {
    fn new(key: Key, op: HintOp) -> Self {
        Self {
            key,
            op,
            queued_at: Instant::now(),
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.queued_at.elapsed() > ttl
    }
}

/// Bounded in-process hint buffer, keyed by target node. Per-node
/// queues preserve write order; at capacity the oldest hint is dropped.
pub struct HintStore {
    hints: Mutex<HashMap<NodeId, VecDeque<Hint>>>,
    max_per_node: usize,
    ttl: Duration,
}

impl Default for HintStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_NODE, DEFAULT_TTL)
    }
}

impl HintStore {
    pub fn new(max_per_node: usize, ttl: Duration) -> Self {
        Self {
            hints: Mutex::new(HashMap::new()),
            max_per_node,
            ttl,
        }
    }

    pub fn queue(&self, node: NodeId, key: Key, op: HintOp) {
        let mut hints = self.hints.lock().unwrap();
        let queue = hints.entry(node.clone()).or_default();
        if queue.len() >= self.max_per_node {
            queue.pop_front();
            tracing::warn!(node = %node, "hint queue full; dropped oldest hint");
        }
        queue.push_back(Hint::new(key, op));
    }

    /// Next replayable hint for `node`, discarding any that outlived
    /// the TTL.
    pub fn pop(&self, node: &NodeId) -> Option<Hint> {
        let mut hints = self.hints.lock().unwrap();
        let queue = hints.get_mut(node)?;
        while let Some(hint) = queue.pop_front() {
            if hint.expired(self.ttl) {
                tracing::debug!(node = %node, key = %hint.key, "discarding expired hint");
                continue;
            }
            return Some(hint);
        }
        hints.remove(node);
        None
    }

    /// Put a hint back at the front of its queue, after a failed replay.
    pub fn requeue_front(&self, node: &NodeId, hint: Hint) {
        let mut hints = self.hints.lock().unwrap();
        hints.entry(node.clone()).or_default().push_front(hint);
    }

    pub fn nodes_with_hints(&self) -> Vec<NodeId> {
        self.hints.lock().unwrap().keys().cloned().collect()
    }

    pub fn pending(&self, node: &NodeId) -> usize {
        self.hints
            .lock()
            .unwrap()
            .get(node)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}

/// Background worker which drains hints to nodes that have come back
/// ALIVE. A failed replay re-queues the hint and abandons that node's
/// drain until the next pass.
pub fn spawn_hint_replayer<T: ReplicaTransport>(
    store: Arc<HintStore>,
    detector: Arc<FailureDetector>,
    transport: Arc<T>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticks.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticks.tick() => {
                    replay_pass(&store, &detector, transport.as_ref()).await;
                }
            }
        }
        tracing::debug!("hint replayer stopped");
    })
}

async fn replay_pass<T: ReplicaTransport>(
    store: &HintStore,
    detector: &FailureDetector,
    transport: &T,
) {
    for node_id in store.nodes_with_hints() {
        if detector.status_of(&node_id) != Some(NodeStatus::Alive) {
            continue;
        }
        let Some(node) = detector
            .members()
            .into_iter()
            .find(|n| n.id == node_id)
        else {
            continue;
        };

        while let Some(hint) = store.pop(&node_id) {
            let outcome = match &hint.op {
                HintOp::Put(value) => {
                    transport.put(node.clone(), hint.key.clone(), value.clone()).await
                }
                HintOp::Delete => transport.delete(node.clone(), hint.key.clone()).await,
            };
            match outcome {
                Ok(()) => {
                    tracing::debug!(node = %node, key = %hint.key, "replayed hint");
                }
                Err(err) => {
                    tracing::debug!(node = %node, error = %err, "hint replay failed; will retry");
                    store.requeue_front(&node_id, hint);
                    break;
                }
            }
        }
    }
}
