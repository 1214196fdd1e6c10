use crate::{Error, MeshRpcHandler, MeshTransport, NodeConfig};
use cache::Cache;
use coordinator::{spawn_hint_replayer, ReplicationCoordinator};
use gossip::GossipService;
use membership::{DetectorEvent, FailureDetector, Node, NodeId};
use ring::HashRing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

const HINT_REPLAY_INTERVAL: Duration = Duration::from_secs(10);
const CLIENT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One peer of the cluster: local cache, ring, failure detector,
/// gossip, replication coordinator and the RPC endpoint, wired
/// together and owned by this value. No global state; every component
/// is constructed here.
pub struct ClusterNode {
    config: NodeConfig,
    local: Node,
    cache: Arc<Cache>,
    ring: Arc<HashRing>,
    detector: Arc<FailureDetector>,
    gossip: GossipService,
    transport: Arc<MeshTransport>,
    coordinator: Arc<ReplicationCoordinator<MeshTransport>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl ClusterNode {
    pub fn new(config: NodeConfig) -> crate::Result<Self> {
        config.validate()?;

        let local = Node::new(config.node_id(), config.gossip_addr);
        let cache = Arc::new(Cache::new(config.cache.clone())?);
        let ring = Arc::new(HashRing::new(config.ring.clone())?);
        let detector = Arc::new(FailureDetector::new(config.detector.clone())?);
        let gossip = GossipService::new(local.clone(), detector.clone(), config.gossip.clone())?;
        let transport = Arc::new(MeshTransport::new(
            local.id.clone(),
            cache.clone(),
            config.replication.operation_timeout,
        ));
        let coordinator = Arc::new(ReplicationCoordinator::new(
            config.replication.clone(),
            ring.clone(),
            transport.clone(),
        )?);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            local,
            cache,
            ring,
            detector,
            gossip,
            transport,
            coordinator,
            shutdown_tx,
            started: AtomicBool::new(false),
        })
    }

    /// Bind both endpoints, start every background worker, and join the
    /// cluster through the configured seeds (or start isolated without
    /// any).
    pub async fn start(&self) -> crate::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let gossip_listener = TcpListener::bind(self.config.gossip_addr).await?;
        let rpc_listener = TcpListener::bind(self.config.rpc_addr()).await?;
        tracing::info!(
            node = %self.local,
            rpc = %self.config.rpc_addr(),
            "starting cluster node"
        );

        // This node always occupies the ring, and every membership
        // change the gossip layer observes flows into it.
        self.ring.add_node(self.local.clone());
        if let Some(events) = self.gossip.take_events() {
            tokio::spawn(pump_membership(
                events,
                self.ring.clone(),
                self.local.id.clone(),
            ));
        }

        self.gossip.start(gossip_listener);

        let handler = Arc::new(MeshRpcHandler::new(self.cache.clone(), self.gossip.clone()));
        tokio::spawn(net::serve_cache_rpc(
            rpc_listener,
            handler,
            self.shutdown_tx.subscribe(),
        ));

        self.cache.spawn_reaper();

        if let Some(hints) = self.coordinator.hint_store() {
            spawn_hint_replayer(
                hints,
                self.detector.clone(),
                self.transport.clone(),
                HINT_REPLAY_INTERVAL,
                self.shutdown_tx.subscribe(),
            );
        }
        tokio::spawn(run_sweep_loop(
            self.transport.clone(),
            self.shutdown_tx.subscribe(),
        ));

        if !self.config.seeds.is_empty() {
            self.gossip
                .join(&self.config.seeds, self.config.join_timeout)
                .await;
        }
        Ok(())
    }

    /// Graceful shutdown: run the leave protocol, stop the gossip and
    /// RPC servers, and release the cache's background worker. Entries
    /// stay in memory until the node is dropped.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(node = %self.local, "stopping cluster node");

        self.gossip.leave().await;
        self.gossip.stop();
        let _ = self.shutdown_tx.send(true);
        self.cache.shutdown().await;
    }

    pub fn local_node(&self) -> &Node {
        &self.local
    }

    pub fn members(&self) -> Vec<Node> {
        self.gossip.members()
    }

    pub fn alive_members(&self) -> Vec<Node> {
        self.gossip.alive_members()
    }

    /// Whether this node currently knows at least one other alive peer.
    pub fn is_in_cluster(&self) -> bool {
        self.alive_members()
            .iter()
            .any(|node| node.id != self.local.id)
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn ring(&self) -> &Arc<HashRing> {
        &self.ring
    }

    pub fn detector(&self) -> &Arc<FailureDetector> {
        &self.detector
    }

    pub fn coordinator(&self) -> &ReplicationCoordinator<MeshTransport> {
        &self.coordinator
    }
}

/// Mirror membership events onto the ring: new nodes take their
/// tokens, status changes steer replica selection. Nodes stay on the
/// ring when they go DOWN or LEFT so placement stays stable; replica
/// walks simply skip them.
async fn pump_membership(
    mut events: mpsc::UnboundedReceiver<DetectorEvent>,
    ring: Arc<HashRing>,
    local_id: NodeId,
) {
    while let Some(event) = events.recv().await {
        match event {
            DetectorEvent::NewNode(node) => {
                let status = node.status;
                tracing::debug!(node = %node, "ring learned node");
                ring.add_node(node.clone());
                ring.set_status(&node.id, status);
            }
            DetectorEvent::StatusChanged { node, to, .. } => {
                if node.id == local_id {
                    continue;
                }
                if !ring.contains(&node.id) {
                    ring.add_node(node.clone());
                }
                ring.set_status(&node.id, to);
            }
            _ => {}
        }
    }
}

async fn run_sweep_loop(transport: Arc<MeshTransport>, mut shutdown: watch::Receiver<bool>) {
    let mut ticks = tokio::time::interval(CLIENT_SWEEP_INTERVAL);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticks.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticks.tick() => transport.client().sweep(),
        }
    }
}
