//! End-to-end cluster scenarios over real loopback sockets.

use cache::{Key, Value, Version};
use cachemesh::{ClusterNode, NodeConfig};
use coordinator::{ConsistencyLevel, ReadOutcome};
use membership::NodeStatus;
use net::{CacheClient, CacheRequest, CacheResponse};
use proto_mesh::cache as wire;
use std::net::SocketAddr;
use std::time::Duration;

/// A gossip port whose adjacent RPC port is also free.
fn free_gossip_port() -> u16 {
    loop {
        let port = portpicker::pick_unused_port().expect("no free ports");
        if port < u16::MAX - 1 && portpicker::is_free_tcp(port + 1) {
            return port;
        }
    }
}

fn node_config(id: &str, port: u16, seeds: Vec<SocketAddr>, rf: usize) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.id = Some(id.to_string());
    config.gossip_addr = format!("127.0.0.1:{port}").parse().unwrap();
    config.seeds = seeds;
    config.join_timeout = Duration::from_secs(1);
    config.gossip.gossip_interval = Duration::from_millis(200);
    config.gossip.ping_timeout = Duration::from_millis(100);
    config.gossip.leave_timeout = Duration::from_secs(1);
    config.detector.heartbeat_interval = Duration::from_millis(200);
    config.detector.suspicion_timeout = Duration::from_millis(500);
    config.replication.replication_factor = rf;
    config
}

async fn start_node(config: NodeConfig) -> ClusterNode {
    let node = ClusterNode::new(config).unwrap();
    node.start().await.unwrap();
    node
}

async fn await_member_count(node: &ClusterNode, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if node.members().len() == count {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} sees {:?}, wanted {count} members",
            node.local_node(),
            node.members()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn key(s: &str) -> Key {
    Key::new(s).unwrap()
}

#[tokio::test]
async fn single_node_put_get_delete() {
    let port = free_gossip_port();
    let node = start_node(node_config("n1", port, Vec::new(), 1)).await;

    let value = Value::new("Alice").with_version(Version::now("n1"));
    node.coordinator()
        .replicated_put(&key("user:123"), value)
        .await
        .unwrap();

    match node.coordinator().replicated_get(&key("user:123")).await {
        Ok(ReadOutcome::Hit(value)) => assert_eq!(value.data, bytes::Bytes::from("Alice")),
        other => panic!("unexpected outcome {other:?}"),
    }

    node.coordinator()
        .replicated_delete(&key("user:123"))
        .await
        .unwrap();
    assert_eq!(
        node.coordinator()
            .replicated_get(&key("user:123"))
            .await
            .unwrap(),
        ReadOutcome::Miss
    );

    let stats = node.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.puts, 1);
    assert_eq!(stats.deletes, 1);

    node.stop().await;
}

#[tokio::test]
async fn joining_through_a_seed_forms_a_cluster() {
    let port_a = free_gossip_port();
    let a = start_node(node_config("a", port_a, Vec::new(), 1)).await;
    assert!(!a.is_in_cluster());

    let port_b = free_gossip_port();
    let b = start_node(node_config(
        "b",
        port_b,
        vec![format!("127.0.0.1:{port_a}").parse().unwrap()],
        1,
    ))
    .await;

    await_member_count(&a, 2).await;
    await_member_count(&b, 2).await;

    for (node, other) in [(&a, "b"), (&b, "a")] {
        let members = node.members();
        let other = members.iter().find(|n| n.id == other.into()).unwrap();
        assert_eq!(other.status, NodeStatus::Alive);
        assert!(node.is_in_cluster());
    }

    b.stop().await;
    a.stop().await;
}

#[tokio::test]
async fn three_nodes_replicate_at_quorum() {
    let port_1 = free_gossip_port();
    let seed: SocketAddr = format!("127.0.0.1:{port_1}").parse().unwrap();
    let n1 = start_node(node_config("n1", port_1, Vec::new(), 3)).await;
    let n2 = start_node(node_config("n2", free_gossip_port(), vec![seed], 3)).await;
    let n3 = start_node(node_config("n3", free_gossip_port(), vec![seed], 3)).await;

    for node in [&n1, &n2, &n3] {
        await_member_count(node, 3).await;
    }

    // Write through one coordinator, read through another.
    let value = Value::new("v").with_version(Version::new(1_000, "n1"));
    n3.coordinator()
        .replicated_put(&key("test-key"), value.clone())
        .await
        .unwrap();

    match n1.coordinator().replicated_get(&key("test-key")).await {
        Ok(ReadOutcome::Hit(read)) => {
            assert_eq!(read.data, value.data);
            assert_eq!(read.version, value.version);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // At least a quorum of local caches hold the value.
    let holders = [&n1, &n2, &n3]
        .iter()
        .filter(|node| node.cache().get(&key("test-key")).is_hit())
        .count();
    assert!(holders >= 2, "only {holders} replicas hold the value");

    // Delete through a third coordinator and wait for the last
    // replica's in-flight delete to settle.
    n2.coordinator()
        .replicated_delete(&key("test-key"))
        .await
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let all_gone = [&n1, &n2, &n3]
            .iter()
            .all(|node| !node.cache().get(&key("test-key")).is_hit());
        if all_gone {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "delete never reached every replica"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(
        n3.coordinator()
            .replicated_get_with(&key("test-key"), ConsistencyLevel::All, Duration::from_secs(1))
            .await
            .unwrap(),
        ReadOutcome::Miss
    );

    for node in [n3, n2, n1] {
        node.stop().await;
    }
}

#[tokio::test]
async fn the_rpc_endpoint_serves_wire_clients() {
    let port = free_gossip_port();
    let node = start_node(node_config("n1", port, Vec::new(), 1)).await;
    let rpc_addr = NodeConfig::peer_rpc_addr(node.local_node().addr);

    let client = CacheClient::new();
    let timeout = Duration::from_secs(1);

    let put = CacheRequest::Put(wire::PutRequest {
        key: "user:123".to_string(),
        entry: Some(wire::CacheEntry {
            data: b"Alice".to_vec(),
            created_at: 1,
            expires_at: 0,
            version: Some(wire::Version {
                timestamp: 1_000,
                node_id: "n1".to_string(),
            }),
        }),
    });
    match client.request(rpc_addr, put, timeout).await.unwrap() {
        CacheResponse::Put(response) => {
            assert_eq!(response.status, wire::put_response::Status::Success as i32);
        }
        other => panic!("unexpected response {other:?}"),
    }

    let get = CacheRequest::Get(wire::GetRequest {
        key: "user:123".to_string(),
    });
    match client.request(rpc_addr, get, timeout).await.unwrap() {
        CacheResponse::Get(response) => {
            assert_eq!(response.status, wire::get_response::Status::Hit as i32);
            let entry = response.entry.unwrap();
            assert_eq!(entry.data, b"Alice");
            assert_eq!(entry.version.unwrap().timestamp, 1_000);
        }
        other => panic!("unexpected response {other:?}"),
    }

    node.stop().await;
}
