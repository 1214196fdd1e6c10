//! Mapping between the in-memory membership model and its wire shape.

use membership::{Node, NodeStatus};
use proto_mesh::gossip as wire;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn status_to_wire(status: NodeStatus) -> wire::NodeStatus {
    match status {
        NodeStatus::Alive => wire::NodeStatus::Alive,
        NodeStatus::Suspected => wire::NodeStatus::Suspected,
        NodeStatus::Down => wire::NodeStatus::Down,
        NodeStatus::Leaving => wire::NodeStatus::Leaving,
        NodeStatus::Left => wire::NodeStatus::Left,
    }
}

pub fn status_from_wire(status: wire::NodeStatus) -> NodeStatus {
    match status {
        wire::NodeStatus::Alive => NodeStatus::Alive,
        wire::NodeStatus::Suspected => NodeStatus::Suspected,
        wire::NodeStatus::Down => NodeStatus::Down,
        wire::NodeStatus::Leaving => NodeStatus::Leaving,
        wire::NodeStatus::Left => NodeStatus::Left,
    }
}

pub fn node_to_info(node: &Node, incarnation: u64) -> wire::NodeInfo {
    wire::NodeInfo {
        id: node.id.to_string(),
        address: node.addr.ip().to_string(),
        port: node.addr.port() as u32,
        status: status_to_wire(node.status) as i32,
        incarnation,
        timestamp: now_millis(),
    }
}

/// Decode a wire member entry. Returns `None` for entries whose
/// address does not parse; such entries cannot be probed or routed to
/// and are dropped rather than poisoning the member map.
pub fn info_to_node(info: &wire::NodeInfo) -> Option<(Node, u64)> {
    let addr = format!("{}:{}", info.address, info.port).parse().ok()?;
    let status = wire::NodeStatus::try_from(info.status)
        .map(status_from_wire)
        .unwrap_or(NodeStatus::Alive);
    let node = Node::new(info.id.as_str(), addr).with_status(status);
    Some((node, info.incarnation))
}
