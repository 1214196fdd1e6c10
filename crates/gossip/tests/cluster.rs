//! Multi-node gossip flows over real loopback sockets.

use gossip::{GossipConfig, GossipService};
use membership::{DetectorConfig, FailureDetector, Node, NodeId, NodeStatus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn fast_detector_config() -> DetectorConfig {
    DetectorConfig {
        missed_heartbeat_threshold: 3,
        suspicion_timeout: Duration::from_millis(300),
        heartbeat_interval: Duration::from_millis(200),
    }
}

fn fast_gossip_config() -> GossipConfig {
    GossipConfig {
        gossip_interval: Duration::from_millis(200),
        ping_timeout: Duration::from_millis(100),
        leave_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

async fn start_node(id: &str) -> (GossipService, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let node = Node::new(id, addr);
    let detector = Arc::new(FailureDetector::new(fast_detector_config()).unwrap());
    let service = GossipService::new(node, detector, fast_gossip_config()).unwrap();
    service.start(listener);
    (service, addr)
}

async fn await_status(
    service: &GossipService,
    id: &NodeId,
    status: NodeStatus,
    deadline: Duration,
) {
    let give_up = tokio::time::Instant::now() + deadline;
    loop {
        if service.detector().status_of(id) == Some(status) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < give_up,
            "{id} never reached {status}; currently {:?}",
            service.detector().status_of(id)
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn join_via_seed_exchanges_membership() {
    let (a, a_addr) = start_node("a").await;
    let (b, _) = start_node("b").await;

    assert!(b.join(&[a_addr], Duration::from_secs(1)).await);

    for (service, other) in [(&a, "b"), (&b, "a")] {
        let members = service.members();
        assert_eq!(members.len(), 2, "{members:?}");
        let other = members.iter().find(|n| n.id == other.into()).unwrap();
        assert_eq!(other.status, NodeStatus::Alive);
    }

    // Probe rounds keep both sides alive.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(b.detector().status_of(&"a".into()), Some(NodeStatus::Alive));
    assert_eq!(a.detector().status_of(&"b".into()), Some(NodeStatus::Alive));

    a.stop();
    b.stop();
}

#[tokio::test]
async fn join_with_no_reachable_seed_starts_isolated() {
    let (a, _) = start_node("a").await;
    let unreachable: SocketAddr = "127.0.0.1:1".parse().unwrap();

    assert!(!a.join(&[unreachable], Duration::from_millis(300)).await);
    assert_eq!(a.members().len(), 1);

    a.stop();
}

#[tokio::test]
async fn graceful_leave_is_observed_by_peers() {
    let (a, a_addr) = start_node("a").await;
    let (b, _) = start_node("b").await;
    assert!(b.join(&[a_addr], Duration::from_secs(1)).await);

    b.leave().await;
    b.stop();

    await_status(&a, &"b".into(), NodeStatus::Left, Duration::from_secs(2)).await;
    assert_eq!(b.detector().status_of(&"b".into()), Some(NodeStatus::Left));

    a.stop();
}

#[tokio::test]
async fn a_dead_peer_is_suspected_then_declared_down() {
    let (a, a_addr) = start_node("a").await;
    let (b, _) = start_node("b").await;
    assert!(b.join(&[a_addr], Duration::from_secs(1)).await);

    // Kill b without the leave protocol.
    b.stop();

    await_status(&a, &"b".into(), NodeStatus::Down, Duration::from_secs(5)).await;

    a.stop();
}

#[tokio::test]
async fn sync_exchanges_full_state_both_ways() {
    let (a, a_addr) = start_node("a").await;
    let (b, _) = start_node("b").await;

    b.sync_with(a_addr, Duration::from_secs(1)).await.unwrap();

    assert_eq!(a.members().len(), 2);
    assert_eq!(b.members().len(), 2);

    a.stop();
    b.stop();
}
