use crate::convert::{info_to_node, node_to_info, status_from_wire};
use crate::GossipConfig;
use membership::{DetectorEvent, FailureDetector, Node, NodeStatus};
use net::GossipClient;
use proto_mesh::gossip::{GossipMessage, MessageType, NodeInfo};
use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

/// How often pooled connections are swept for idleness.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// The gossip service. Cheap to clone; every clone shares one state.
///
/// Drives the failure detector from the network: periodic probe rounds,
/// indirect probes through proxies, rumor dissemination, and the
/// join/leave/sync protocols. Status changes surface on the event
/// channel returned by [`GossipService::take_events`].
#[derive(Clone)]
pub struct GossipService {
    inner: Arc<Inner>,
}

struct Inner {
    local: Node,
    /// This node's own incarnation, bumped to refute suspicion and on
    /// graceful leave.
    incarnation: AtomicU64,
    detector: Arc<FailureDetector>,
    client: GossipClient,
    config: GossipConfig,
    seq: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<DetectorEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<DetectorEvent>>>,
}

impl GossipService {
    pub fn new(
        local: Node,
        detector: Arc<FailureDetector>,
        config: GossipConfig,
    ) -> crate::Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                local,
                incarnation: AtomicU64::new(1),
                detector,
                client: GossipClient::new(),
                config,
                seq: AtomicU64::new(0),
                shutdown_tx,
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        })
    }

    pub fn local(&self) -> &Node {
        &self.inner.local
    }

    pub fn detector(&self) -> &Arc<FailureDetector> {
        &self.inner.detector
    }

    pub fn config(&self) -> &GossipConfig {
        &self.inner.config
    }

    pub fn incarnation(&self) -> u64 {
        self.inner.incarnation.load(Ordering::Relaxed)
    }

    /// The stream of membership events (new nodes and status changes).
    /// Yields the receiver exactly once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DetectorEvent>> {
        self.inner.events_rx.lock().unwrap().take()
    }

    /// Register this node as a member and start the server and
    /// background loops on `listener`.
    pub fn start(&self, listener: TcpListener) {
        let inner = &self.inner;
        let event = inner
            .detector
            .observe(inner.local.clone(), self.incarnation());
        self.process_event(event);

        tokio::spawn(net::serve_gossip(
            listener,
            Arc::new(self.clone()),
            inner.shutdown_tx.subscribe(),
        ));
        tokio::spawn(run_probe_loop(self.clone()));
        tokio::spawn(run_suspicion_loop(self.clone()));
        tokio::spawn(run_sweep_loop(self.clone()));
        tracing::info!(node = %inner.local, "gossip service started");
    }

    /// Stop the server and background loops. Does not notify peers;
    /// call [`GossipService::leave`] first for a graceful departure.
    pub fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// Contact `seeds` in order until one answers with a membership
    /// snapshot. Returns false if no seed was reachable, in which case
    /// the node proceeds isolated and keeps gossiping.
    pub async fn join(&self, seeds: &[SocketAddr], timeout: Duration) -> bool {
        let inner = &self.inner;
        for seed in seeds {
            if *seed == inner.local.addr {
                continue;
            }
            let message = self.build(MessageType::Join, None);
            match inner.client.request(*seed, message, timeout).await {
                Ok(reply) if reply.r#type == MessageType::JoinResponse as i32 => {
                    self.merge_members(&reply.members);
                    tracing::info!(node = %inner.local, %seed, "joined cluster via seed");
                    return true;
                }
                Ok(reply) => {
                    tracing::warn!(%seed, message_type = reply.r#type, "unexpected join reply");
                }
                Err(err) => {
                    tracing::warn!(%seed, error = %err, "seed unreachable");
                }
            }
        }
        tracing::info!(node = %inner.local, "no reachable seed; starting isolated");
        false
    }

    /// Graceful departure: bump our incarnation, mark LEAVING, notify
    /// every alive peer within the leave timeout, then mark LEFT.
    pub async fn leave(&self) {
        let inner = &self.inner;
        let incarnation = inner.incarnation.fetch_add(1, Ordering::Relaxed) + 1;
        let leaving = inner.local.clone().with_status(NodeStatus::Leaving);
        let event = inner.detector.observe(leaving.clone(), incarnation);
        self.process_event(event);

        let info = node_to_info(&leaving, incarnation);
        let sends = self
            .other_alive_members()
            .into_iter()
            .map(|peer| {
                let message = GossipMessage {
                    r#type: MessageType::Leave as i32,
                    sender: Some(info.clone()),
                    subject: None,
                    members: self.piggyback(),
                    sequence_number: self.next_seq(),
                };
                let client = inner.client.clone();
                async move {
                    if let Err(err) = client.notify(peer.addr, message).await {
                        tracing::debug!(peer = %peer, error = %err, "leave notification failed");
                    }
                }
            })
            .collect::<Vec<_>>();

        if tokio::time::timeout(inner.config.leave_timeout, futures::future::join_all(sends))
            .await
            .is_err()
        {
            tracing::warn!("leave notifications did not complete in time");
        }

        let event = inner
            .detector
            .observe(inner.local.clone().with_status(NodeStatus::Left), incarnation);
        self.process_event(event);
        tracing::info!(node = %inner.local, "left the cluster");
    }

    /// Full-state exchange with one peer: both sides end up knowing the
    /// union of their member lists.
    pub async fn sync_with(&self, addr: SocketAddr, timeout: Duration) -> net::Result<()> {
        let message = GossipMessage {
            r#type: MessageType::Sync as i32,
            sender: Some(self.local_info()),
            subject: None,
            members: self.full_members(),
            sequence_number: self.next_seq(),
        };
        let reply = self.inner.client.request(addr, message, timeout).await?;
        self.merge_members(&reply.members);
        Ok(())
    }

    pub fn members(&self) -> Vec<Node> {
        self.inner.detector.members()
    }

    pub fn alive_members(&self) -> Vec<Node> {
        self.inner.detector.alive_members()
    }

    fn other_alive_members(&self) -> Vec<Node> {
        self.inner
            .detector
            .alive_members()
            .into_iter()
            .filter(|n| n.id != self.inner.local.id)
            .collect()
    }

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn local_info(&self) -> NodeInfo {
        let status = self
            .inner
            .detector
            .status_of(&self.inner.local.id)
            .unwrap_or(NodeStatus::Alive);
        node_to_info(
            &self.inner.local.clone().with_status(status),
            self.incarnation(),
        )
    }

    /// Up to `piggyback_size` random member entries.
    fn piggyback(&self) -> Vec<NodeInfo> {
        let members = self.inner.detector.members_with_incarnation();
        members
            .choose_multiple(&mut rand::thread_rng(), self.inner.config.piggyback_size)
            .map(|(node, incarnation)| node_to_info(node, *incarnation))
            .collect()
    }

    fn full_members(&self) -> Vec<NodeInfo> {
        self.inner
            .detector
            .members_with_incarnation()
            .iter()
            .map(|(node, incarnation)| node_to_info(node, *incarnation))
            .collect()
    }

    fn build(&self, kind: MessageType, subject: Option<NodeInfo>) -> GossipMessage {
        GossipMessage {
            r#type: kind as i32,
            sender: Some(self.local_info()),
            subject,
            members: self.piggyback(),
            sequence_number: self.next_seq(),
        }
    }

    fn reply(&self, kind: MessageType, seq: u64, members: Vec<NodeInfo>) -> GossipMessage {
        GossipMessage {
            r#type: kind as i32,
            sender: Some(self.local_info()),
            subject: None,
            members,
            sequence_number: seq,
        }
    }

    /// React to a detector event: spread rumors for peer status
    /// changes, and surface membership changes to the event channel.
    fn process_event(&self, event: DetectorEvent) {
        if let DetectorEvent::StatusChanged { node, to, .. } = &event {
            if node.id != self.inner.local.id {
                match to {
                    NodeStatus::Suspected => self.spread_rumor(MessageType::Suspect, node.clone()),
                    NodeStatus::Alive => self.spread_rumor(MessageType::Alive, node.clone()),
                    NodeStatus::Down => self.spread_rumor(MessageType::Confirm, node.clone()),
                    _ => {}
                }
            }
        }
        match &event {
            DetectorEvent::NewNode(_) | DetectorEvent::StatusChanged { .. } => {
                let _ = self.inner.events_tx.send(event);
            }
            _ => {}
        }
    }

    /// Fan a rumor about `subject` out to random alive peers.
    fn spread_rumor(&self, kind: MessageType, subject: Node) {
        let this = self.clone();
        tokio::spawn(async move {
            let inner = &this.inner;
            let incarnation = inner.detector.incarnation_of(&subject.id).unwrap_or(0);
            let subject_info = node_to_info(&subject, incarnation);

            let mut peers: Vec<Node> = this
                .other_alive_members()
                .into_iter()
                .filter(|n| n.id != subject.id)
                .collect();
            peers.shuffle(&mut rand::thread_rng());
            peers.truncate(inner.config.fanout);

            for peer in peers {
                let message = this.build(kind, Some(subject_info.clone()));
                if let Err(err) = inner.client.notify(peer.addr, message).await {
                    tracing::debug!(peer = %peer, error = %err, "rumor send failed");
                }
            }
        });
    }

    fn merge_members(&self, members: &[NodeInfo]) {
        for info in members {
            if info.id == self.inner.local.id.as_str() {
                // A claim about ourselves. Anything non-alive at our
                // incarnation or later must be refuted.
                let status = proto_mesh::gossip::NodeStatus::try_from(info.status)
                    .map(status_from_wire)
                    .unwrap_or(NodeStatus::Alive);
                if !status.is_alive() && info.incarnation >= self.incarnation() {
                    self.refute(info.incarnation);
                }
                continue;
            }
            match info_to_node(info) {
                Some((node, incarnation)) => {
                    let event = self.inner.detector.observe(node, incarnation);
                    self.process_event(event);
                }
                None => tracing::debug!(id = %info.id, "dropping member entry with bad address"),
            }
        }
    }

    /// Raise our incarnation above `claimed` and broadcast that we are
    /// alive.
    fn refute(&self, claimed: u64) {
        let inner = &self.inner;
        let next = claimed + 1;
        let mut current = inner.incarnation.load(Ordering::Relaxed);
        while current < next {
            match inner.incarnation.compare_exchange(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        let incarnation = self.incarnation();
        let event = inner
            .detector
            .observe(inner.local.clone().with_status(NodeStatus::Alive), incarnation);
        self.process_event(event);
        tracing::info!(incarnation, "refuting suspicion about this node");
        self.spread_rumor(MessageType::Alive, inner.local.clone());
    }

    fn handle_rumor(&self, kind: MessageType, message: &GossipMessage) {
        let Some(subject) = &message.subject else {
            return;
        };
        let claimed = match kind {
            MessageType::Suspect => NodeStatus::Suspected,
            MessageType::Alive => NodeStatus::Alive,
            MessageType::Confirm => NodeStatus::Down,
            _ => return,
        };

        if subject.id == self.inner.local.id.as_str() {
            if claimed != NodeStatus::Alive && subject.incarnation >= self.incarnation() {
                self.refute(subject.incarnation);
            }
            return;
        }
        if let Some((node, incarnation)) = info_to_node(subject) {
            let event = self
                .inner
                .detector
                .observe(node.with_status(claimed), incarnation);
            self.process_event(event);
        }
    }

    async fn handle_ping_req(&self, message: &GossipMessage) -> Option<GossipMessage> {
        let subject = message.subject.as_ref()?;
        let (target, _) = info_to_node(subject)?;

        // Probe the target on the requester's behalf; relay an ACK only
        // if the target answered us.
        let ping = self.build(MessageType::Ping, None);
        match self
            .inner
            .client
            .request(target.addr, ping, self.inner.config.ping_timeout)
            .await
        {
            Ok(ack) if ack.r#type == MessageType::Ack as i32 => {
                let event = self.inner.detector.record_heartbeat(&target.id);
                self.process_event(event);
                Some(self.reply(MessageType::Ack, message.sequence_number, self.piggyback()))
            }
            _ => {
                tracing::debug!(target = %target, "indirect probe found target unreachable");
                None
            }
        }
    }

    fn handle_leave(&self, message: &GossipMessage) {
        let Some(sender) = &message.sender else {
            return;
        };
        if sender.id == self.inner.local.id.as_str() {
            return;
        }
        if let Some((node, incarnation)) = info_to_node(sender) {
            let event = self
                .inner
                .detector
                .observe(node.clone().with_status(NodeStatus::Leaving), incarnation);
            self.process_event(event);
            let event = self
                .inner
                .detector
                .observe(node.with_status(NodeStatus::Left), incarnation);
            self.process_event(event);
            tracing::info!(node = %sender.id, "peer left the cluster");
        }
    }

    async fn probe_round(&self) {
        let inner = &self.inner;
        let peers = self.other_alive_members();
        let Some(target) = peers.choose(&mut rand::thread_rng()).cloned() else {
            return;
        };

        let ping = self.build(MessageType::Ping, None);
        match inner
            .client
            .request(target.addr, ping, inner.config.ping_timeout)
            .await
        {
            Ok(ack) => {
                self.merge_members(&ack.members);
                let event = inner.detector.record_heartbeat(&target.id);
                self.process_event(event);
            }
            Err(err) => {
                tracing::debug!(target = %target, error = %err, "direct probe failed");
                let event = inner.detector.record_missed_heartbeat(&target.id);
                self.process_event(event);
                self.indirect_probe(target, peers);
            }
        }
    }

    /// Ask up to `indirect_ping_nodes` proxies to probe `target`; any
    /// relayed ACK counts as a heartbeat.
    fn indirect_probe(&self, target: Node, peers: Vec<Node>) {
        let inner = &self.inner;
        let incarnation = inner.detector.incarnation_of(&target.id).unwrap_or(0);
        let subject = node_to_info(&target, incarnation);

        let mut proxies: Vec<Node> = peers.into_iter().filter(|n| n.id != target.id).collect();
        proxies.shuffle(&mut rand::thread_rng());
        proxies.truncate(inner.config.indirect_ping_nodes);

        for proxy in proxies {
            let this = self.clone();
            let subject = subject.clone();
            let target = target.clone();
            tokio::spawn(async move {
                let request = this.build(MessageType::PingReq, Some(subject));
                // The proxy needs a probe round-trip of its own.
                let timeout = this.inner.config.ping_timeout.saturating_mul(2);
                match this.inner.client.request(proxy.addr, request, timeout).await {
                    Ok(ack) if ack.r#type == MessageType::Ack as i32 => {
                        let event = this.inner.detector.record_heartbeat(&target.id);
                        this.process_event(event);
                    }
                    _ => {
                        tracing::debug!(proxy = %proxy, target = %target, "indirect probe failed");
                    }
                }
            });
        }
    }
}

#[async_trait::async_trait]
impl net::GossipMessageHandler for GossipService {
    async fn handle(&self, message: GossipMessage) -> Option<GossipMessage> {
        let kind = match MessageType::try_from(message.r#type) {
            Ok(kind) => kind,
            Err(_) => {
                tracing::warn!(message_type = message.r#type, "unknown gossip message type");
                return None;
            }
        };

        // Every message is evidence about its sender and carries
        // piggybacked members; merge both before dispatching.
        if let Some(sender) = &message.sender {
            if sender.id != self.inner.local.id.as_str() {
                if let Some((node, incarnation)) = info_to_node(sender) {
                    let event = self.inner.detector.observe(node, incarnation);
                    self.process_event(event);
                }
            }
        }
        self.merge_members(&message.members);

        match kind {
            MessageType::Ping => {
                Some(self.reply(MessageType::Ack, message.sequence_number, self.piggyback()))
            }
            MessageType::Ack => None, // Solicited ACKs are handled by the client side.
            MessageType::PingReq => self.handle_ping_req(&message).await,
            MessageType::Suspect | MessageType::Alive | MessageType::Confirm => {
                self.handle_rumor(kind, &message);
                None
            }
            MessageType::Join => {
                if let Some(sender) = &message.sender {
                    tracing::info!(joiner = %sender.id, "node joined via this node");
                }
                Some(self.reply(
                    MessageType::JoinResponse,
                    message.sequence_number,
                    self.full_members(),
                ))
            }
            MessageType::JoinResponse => None, // Members were merged above.
            MessageType::Leave => {
                self.handle_leave(&message);
                None
            }
            MessageType::Sync => Some(self.reply(
                MessageType::Sync,
                message.sequence_number,
                self.full_members(),
            )),
        }
    }
}

async fn run_probe_loop(service: GossipService) {
    let mut shutdown = service.inner.shutdown_tx.subscribe();
    let mut ticks = tokio::time::interval(service.inner.config.gossip_interval);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticks.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticks.tick() => service.probe_round().await,
        }
    }
    tracing::debug!("gossip probe loop stopped");
}

async fn run_suspicion_loop(service: GossipService) {
    let mut shutdown = service.inner.shutdown_tx.subscribe();
    let period = service.inner.detector.config().suspicion_timeout / 2;
    let mut ticks = tokio::time::interval(period.max(Duration::from_millis(10)));
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticks.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticks.tick() => {
                for event in service.inner.detector.check_suspicion_timeouts() {
                    service.process_event(event);
                }
            }
        }
    }
    tracing::debug!("gossip suspicion loop stopped");
}

async fn run_sweep_loop(service: GossipService) {
    let mut shutdown = service.inner.shutdown_tx.subscribe();
    let mut ticks = tokio::time::interval(SWEEP_PERIOD);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticks.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticks.tick() => service.inner.client.sweep(),
        }
    }
}
