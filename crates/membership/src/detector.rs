use crate::{Error, Node, NodeId, NodeStatus};
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Consecutive missed probes before an ALIVE node becomes SUSPECTED.
    pub missed_heartbeat_threshold: u32,
    /// How long a node may stay SUSPECTED before it is declared DOWN.
    #[serde(with = "humantime_serde")]
    pub suspicion_timeout: Duration,
    /// Expected cadence of liveness probes against each node.
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            missed_heartbeat_threshold: 3,
            suspicion_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.missed_heartbeat_threshold == 0 {
            return Err(Error::InvalidConfig(
                "missed_heartbeat_threshold must be at least 1",
            ));
        }
        if self.suspicion_timeout.is_zero() {
            return Err(Error::InvalidConfig("suspicion_timeout must be positive"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::InvalidConfig("heartbeat_interval must be positive"));
        }
        Ok(())
    }
}

/// Why a membership update was discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The update carried a lower incarnation than we hold.
    StaleIncarnation,
    /// The status change is not admissible at equal incarnation.
    DisallowedTransition,
    /// The update matched what we already hold.
    NoChange,
    /// The node has never been observed.
    UnknownNode,
}

/// The observable outcome of a single detector mutation. Every
/// mutating call returns exactly one event (or, for the suspicion
/// sweep, one per affected node), ordered before any later observation
/// of detector state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorEvent {
    NewNode(Node),
    StatusChanged {
        node: Node,
        from: NodeStatus,
        to: NodeStatus,
    },
    HeartbeatRecorded(NodeId),
    MissedHeartbeat {
        id: NodeId,
        count: u32,
    },
    Ignored {
        id: NodeId,
        reason: IgnoreReason,
    },
}

struct NodeState {
    /// `node.status` is the authoritative status for this member.
    node: Node,
    incarnation: u64,
    missed_heartbeats: u32,
    last_update: Instant,
    suspected_at: Option<Instant>,
}

impl NodeState {
    fn new(node: Node, incarnation: u64) -> Self {
        let suspected_at = (node.status == NodeStatus::Suspected).then(Instant::now);
        Self {
            node,
            incarnation,
            missed_heartbeats: 0,
            last_update: Instant::now(),
            suspected_at,
        }
    }

    fn apply_status(&mut self, to: NodeStatus) {
        self.node.status = to;
        match to {
            NodeStatus::Suspected => self.suspected_at = Some(Instant::now()),
            NodeStatus::Alive => {
                self.suspected_at = None;
                self.missed_heartbeats = 0;
            }
            _ => self.suspected_at = None,
        }
    }
}

/// SWIM-style failure detector: one state machine per known node,
/// keyed by node id. Entries are serialized by the map's per-key locks;
/// distinct nodes never contend.
pub struct FailureDetector {
    config: DetectorConfig,
    states: DashMap<NodeId, NodeState>,
}

impl FailureDetector {
    pub fn new(config: DetectorConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            states: DashMap::new(),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Merge an observation of `node` at `incarnation`, typically from
    /// gossip. New nodes are admitted as-is; known nodes follow the
    /// incarnation rules: lower is discarded, higher overwrites
    /// unconditionally, equal must be an admissible transition.
    pub fn observe(&self, node: Node, incarnation: u64) -> DetectorEvent {
        use dashmap::mapref::entry::Entry;

        match self.states.entry(node.id.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(NodeState::new(node.clone(), incarnation));
                tracing::debug!(node = %node, incarnation, "discovered node");
                DetectorEvent::NewNode(node)
            }
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let from = state.node.status;
                let to = node.status;

                if incarnation < state.incarnation {
                    return DetectorEvent::Ignored {
                        id: node.id,
                        reason: IgnoreReason::StaleIncarnation,
                    };
                }
                if incarnation == state.incarnation {
                    if from == to {
                        state.node.addr = node.addr;
                        state.last_update = Instant::now();
                        return DetectorEvent::Ignored {
                            id: node.id,
                            reason: IgnoreReason::NoChange,
                        };
                    }
                    if !from.can_transition_to(to) {
                        return DetectorEvent::Ignored {
                            id: node.id,
                            reason: IgnoreReason::DisallowedTransition,
                        };
                    }
                }

                state.incarnation = incarnation;
                state.node.addr = node.addr;
                state.last_update = Instant::now();
                if from == to {
                    // Higher incarnation refreshing an unchanged status.
                    DetectorEvent::Ignored {
                        id: node.id,
                        reason: IgnoreReason::NoChange,
                    }
                } else {
                    state.apply_status(to);
                    let node = state.node.clone();
                    tracing::info!(node = %node, %from, %to, "node status changed");
                    DetectorEvent::StatusChanged { node, from, to }
                }
            }
        }
    }

    /// Record a successful probe of `id`. Resets the missed counter; a
    /// SUSPECTED node is refuted back to ALIVE under a bumped
    /// incarnation.
    pub fn record_heartbeat(&self, id: &NodeId) -> DetectorEvent {
        let Some(mut state) = self.states.get_mut(id) else {
            return DetectorEvent::Ignored {
                id: id.clone(),
                reason: IgnoreReason::UnknownNode,
            };
        };
        state.missed_heartbeats = 0;
        state.last_update = Instant::now();

        if state.node.status == NodeStatus::Suspected {
            state.incarnation += 1;
            state.apply_status(NodeStatus::Alive);
            let node = state.node.clone();
            tracing::info!(node = %node, "suspected node refuted by heartbeat");
            return DetectorEvent::StatusChanged {
                node,
                from: NodeStatus::Suspected,
                to: NodeStatus::Alive,
            };
        }
        DetectorEvent::HeartbeatRecorded(id.clone())
    }

    /// Record a failed probe of `id`. Crossing the threshold moves an
    /// ALIVE node to SUSPECTED.
    pub fn record_missed_heartbeat(&self, id: &NodeId) -> DetectorEvent {
        let Some(mut state) = self.states.get_mut(id) else {
            return DetectorEvent::Ignored {
                id: id.clone(),
                reason: IgnoreReason::UnknownNode,
            };
        };
        state.missed_heartbeats += 1;
        let count = state.missed_heartbeats;

        if count >= self.config.missed_heartbeat_threshold
            && state.node.status == NodeStatus::Alive
        {
            state.apply_status(NodeStatus::Suspected);
            let node = state.node.clone();
            tracing::info!(node = %node, count, "node suspected after missed heartbeats");
            return DetectorEvent::StatusChanged {
                node,
                from: NodeStatus::Alive,
                to: NodeStatus::Suspected,
            };
        }
        DetectorEvent::MissedHeartbeat {
            id: id.clone(),
            count,
        }
    }

    /// Declare DOWN every node which has stayed SUSPECTED longer than
    /// the suspicion timeout.
    pub fn check_suspicion_timeouts(&self) -> Vec<DetectorEvent> {
        let mut events = Vec::new();
        for mut entry in self.states.iter_mut() {
            let state = entry.value_mut();
            if state.node.status != NodeStatus::Suspected {
                continue;
            }
            let expired = state
                .suspected_at
                .map(|at| at.elapsed() > self.config.suspicion_timeout)
                .unwrap_or(false);
            if expired {
                state.apply_status(NodeStatus::Down);
                let node = state.node.clone();
                tracing::warn!(node = %node, "suspicion timeout elapsed; node is down");
                events.push(DetectorEvent::StatusChanged {
                    node,
                    from: NodeStatus::Suspected,
                    to: NodeStatus::Down,
                });
            }
        }
        events
    }

    pub fn status_of(&self, id: &NodeId) -> Option<NodeStatus> {
        self.states.get(id).map(|s| s.node.status)
    }

    pub fn incarnation_of(&self, id: &NodeId) -> Option<u64> {
        self.states.get(id).map(|s| s.incarnation)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.states.contains_key(id)
    }

    /// Snapshot of all known members.
    pub fn members(&self) -> Vec<Node> {
        self.states.iter().map(|s| s.node.clone()).collect()
    }

    /// Snapshot of all known members with their incarnations, for
    /// gossip dissemination.
    pub fn members_with_incarnation(&self) -> Vec<(Node, u64)> {
        self.states
            .iter()
            .map(|s| (s.node.clone(), s.incarnation))
            .collect()
    }

    pub fn alive_members(&self) -> Vec<Node> {
        self.states
            .iter()
            .filter(|s| s.node.status.is_alive())
            .map(|s| s.node.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Forget a node entirely. Subsequent observations re-admit it as new.
    pub fn remove(&self, id: &NodeId) {
        self.states.remove(id);
    }
}
