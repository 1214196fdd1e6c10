use crate::hints::{HintOp, HintStore};
use crate::{ConsistencyLevel, Error, ReplicationConfig};
use cache::{ConflictResolver, Key, LastWriteWins, Value};
use membership::Node;
use ring::HashRing;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A replica-side failure, as seen by the coordinator. Timeouts and
/// transport errors are indistinguishable for quorum accounting.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct ReplicaError(pub String);

impl ReplicaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// How the coordinator reaches an individual replica. The cluster node
/// implements this over the cache RPC client (short-circuiting to the
/// local cache for itself); tests implement it over a map of in-process
/// caches.
#[async_trait::async_trait]
pub trait ReplicaTransport: Send + Sync + 'static {
    async fn put(&self, node: Node, key: Key, value: Value) -> Result<(), ReplicaError>;
    async fn get(&self, node: Node, key: Key) -> Result<Option<Value>, ReplicaError>;
    async fn delete(&self, node: Node, key: Key) -> Result<(), ReplicaError>;
}

/// Outcome of a replicated read.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    Hit(Value),
    Miss,
}

impl ReadOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            ReadOutcome::Hit(value) => Some(value),
            ReadOutcome::Miss => None,
        }
    }
}

/// Coordinates replicated operations: fans out to the ring's replica
/// set, counts completion-ordered responses against the consistency
/// requirement, and returns as soon as the requirement is met, proven
/// unmeetable, or the deadline passes. Stateless across requests; any
/// node may coordinate any request.
pub struct ReplicationCoordinator<T: ReplicaTransport> {
    config: ReplicationConfig,
    ring: Arc<HashRing>,
    transport: Arc<T>,
    resolver: LastWriteWins,
    hints: Option<Arc<HintStore>>,
}

impl<T: ReplicaTransport> ReplicationCoordinator<T> {
    pub fn new(
        config: ReplicationConfig,
        ring: Arc<HashRing>,
        transport: Arc<T>,
    ) -> crate::Result<Self> {
        config.validate()?;
        let hints = config
            .hinted_handoff_enabled
            .then(|| Arc::new(HintStore::default()));
        Ok(Self {
            config,
            ring,
            transport,
            resolver: LastWriteWins,
            hints,
        })
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// The hint buffer, when hinted handoff is enabled. The cluster
    /// node hands this to the replay worker.
    pub fn hint_store(&self) -> Option<Arc<HintStore>> {
        self.hints.clone()
    }

    pub async fn replicated_put(&self, key: &Key, value: Value) -> crate::Result<()> {
        self.replicated_put_with(
            key,
            value,
            self.config.write_consistency,
            self.config.operation_timeout,
        )
        .await
    }

    pub async fn replicated_put_with(
        &self,
        key: &Key,
        value: Value,
        level: ConsistencyLevel,
        timeout: Duration,
    ) -> crate::Result<()> {
        let replicas = self.replicas_for(key)?;
        let required = self.config.required_responses(level);
        let total = replicas.len();

        let (tx, rx) = mpsc::unbounded_channel();
        for node in replicas {
            let transport = self.transport.clone();
            let hints = self.hints.clone();
            let key = key.clone();
            let value = value.clone();
            let tx = tx.clone();
            // Each replica write runs to completion even if the
            // coordinator returns first.
            tokio::spawn(async move {
                let result =
                    tokio::time::timeout(timeout, transport.put(node.clone(), key.clone(), value.clone()))
                        .await;
                let ok = matches!(result, Ok(Ok(())));
                if !ok {
                    tracing::debug!(node = %node, key = %key, "replica write failed");
                    if let Some(hints) = hints {
                        hints.queue(node.id, key, HintOp::Put(value));
                    }
                }
                let _ = tx.send(ok);
            });
        }
        drop(tx);

        self.await_quorum(rx, total, required, timeout).await
    }

    pub async fn replicated_delete(&self, key: &Key) -> crate::Result<()> {
        self.replicated_delete_with(
            key,
            self.config.write_consistency,
            self.config.operation_timeout,
        )
        .await
    }

    pub async fn replicated_delete_with(
        &self,
        key: &Key,
        level: ConsistencyLevel,
        timeout: Duration,
    ) -> crate::Result<()> {
        let replicas = self.replicas_for(key)?;
        let required = self.config.required_responses(level);
        let total = replicas.len();

        let (tx, rx) = mpsc::unbounded_channel();
        for node in replicas {
            let transport = self.transport.clone();
            let hints = self.hints.clone();
            let key = key.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result =
                    tokio::time::timeout(timeout, transport.delete(node.clone(), key.clone())).await;
                let ok = matches!(result, Ok(Ok(())));
                if !ok {
                    tracing::debug!(node = %node, key = %key, "replica delete failed");
                    if let Some(hints) = hints {
                        hints.queue(node.id, key, HintOp::Delete);
                    }
                }
                let _ = tx.send(ok);
            });
        }
        drop(tx);

        self.await_quorum(rx, total, required, timeout).await
    }

    pub async fn replicated_get(&self, key: &Key) -> crate::Result<ReadOutcome> {
        self.replicated_get_with(
            key,
            self.config.read_consistency,
            self.config.operation_timeout,
        )
        .await
    }

    pub async fn replicated_get_with(
        &self,
        key: &Key,
        level: ConsistencyLevel,
        timeout: Duration,
    ) -> crate::Result<ReadOutcome> {
        let replicas = self.replicas_for(key)?;
        let required = self.config.required_responses(level);

        // ALL must hear every replica; otherwise only query the
        // required count, unless read repair wants full breadth to
        // observe divergence.
        let breadth = if level == ConsistencyLevel::All || self.config.read_repair_enabled {
            replicas.len()
        } else {
            required.min(replicas.len())
        };
        let targets: Vec<Node> = replicas.into_iter().take(breadth).collect();
        let total = targets.len();

        let (tx, mut rx) = mpsc::unbounded_channel();
        for node in targets {
            let transport = self.transport.clone();
            let key = key.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome =
                    match tokio::time::timeout(timeout, transport.get(node.clone(), key.clone())).await
                    {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => {
                            tracing::debug!(node = %node, key = %key, error = %err, "replica read failed");
                            Err(())
                        }
                        Err(_) => {
                            tracing::debug!(node = %node, key = %key, "replica read timed out");
                            Err(())
                        }
                    };
                let _ = tx.send((node, outcome));
            });
        }
        drop(tx);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut successes = 0usize;
        let mut failures = 0usize;
        let mut hits: Vec<(Node, Value)> = Vec::new();
        let mut misses: Vec<Node> = Vec::new();

        loop {
            if successes >= required {
                break;
            }
            if total.saturating_sub(failures) < required {
                break;
            }
            tokio::select! {
                _ = &mut deadline => break,
                received = rx.recv() => match received {
                    Some((node, Ok(Some(value)))) => {
                        successes += 1;
                        hits.push((node, value));
                    }
                    Some((node, Ok(None))) => {
                        successes += 1;
                        misses.push(node);
                    }
                    Some((_, Err(()))) => failures += 1,
                    None => break,
                }
            }
        }

        if successes < required {
            return Err(Error::Insufficient {
                successes,
                failures,
                required,
                replication_factor: self.config.replication_factor,
            });
        }
        if hits.is_empty() {
            return Ok(ReadOutcome::Miss);
        }

        let values: Vec<Value> = hits.iter().map(|(_, value)| value.clone()).collect();
        let winner = self
            .resolver
            .resolve(&values)
            .expect("hits is non-empty")
            .clone();

        if self.config.read_repair_enabled {
            let stale: Vec<Node> = hits
                .iter()
                .filter(|(_, value)| is_stale(value, &winner))
                .map(|(node, _)| node.clone())
                .chain(misses)
                .collect();
            self.spawn_read_repair(key.clone(), winner.clone(), stale, rx, timeout);
        }

        Ok(ReadOutcome::Hit(winner))
    }

    fn replicas_for(&self, key: &Key) -> crate::Result<Vec<Node>> {
        let replicas = self
            .ring
            .get_replica_nodes(key.as_str(), self.config.replication_factor);
        if replicas.is_empty() {
            tracing::warn!(key = %key, "no alive replicas for key");
            return Err(Error::NoReplicas {
                key: key.to_string(),
            });
        }
        Ok(replicas)
    }

    async fn await_quorum(
        &self,
        mut rx: mpsc::UnboundedReceiver<bool>,
        total: usize,
        required: usize,
        timeout: Duration,
    ) -> crate::Result<()> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut successes = 0usize;
        let mut failures = 0usize;

        loop {
            if successes >= required {
                return Ok(());
            }
            // Stop early once success is arithmetically impossible.
            if total.saturating_sub(failures) < required {
                break;
            }
            tokio::select! {
                _ = &mut deadline => break,
                received = rx.recv() => match received {
                    Some(true) => successes += 1,
                    Some(false) => failures += 1,
                    None => break,
                }
            }
        }
        Err(Error::Insufficient {
            successes,
            failures,
            required,
            replication_factor: self.config.replication_factor,
        })
    }

    /// Asynchronously write the winning value to replicas which
    /// returned a stale or missing copy, including stragglers that
    /// answer after the quorum was met. Repair failures never surface.
    fn spawn_read_repair(
        &self,
        key: Key,
        winner: Value,
        mut targets: Vec<Node>,
        mut rx: mpsc::UnboundedReceiver<(Node, Result<Option<Value>, ()>)>,
        timeout: Duration,
    ) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            while let Some((node, outcome)) = rx.recv().await {
                match outcome {
                    Ok(Some(value)) if is_stale(&value, &winner) => targets.push(node),
                    Ok(None) => targets.push(node),
                    _ => {}
                }
            }
            for node in targets {
                match tokio::time::timeout(
                    timeout,
                    transport.put(node.clone(), key.clone(), winner.clone()),
                )
                .await
                {
                    Ok(Ok(())) => tracing::debug!(node = %node, key = %key, "read repair applied"),
                    Ok(Err(err)) => {
                        tracing::debug!(node = %node, key = %key, error = %err, "read repair failed")
                    }
                    Err(_) => tracing::debug!(node = %node, key = %key, "read repair timed out"),
                }
            }
        });
    }
}

fn is_stale(value: &Value, winner: &Value) -> bool {
    value.version != winner.version || value.data != winner.data
}
