use std::net::SocketAddr;

/// A cluster member identifier. Node ids are opaque strings, unique
/// within a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Liveness state of a cluster member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Alive,
    Suspected,
    Down,
    Leaving,
    Left,
}

impl NodeStatus {
    /// Whether a status change is admissible at equal incarnation.
    /// A higher incarnation overrides this matrix entirely.
    pub fn can_transition_to(self, to: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, to),
            (Alive, Suspected)
                | (Alive, Leaving)
                | (Suspected, Alive)
                | (Suspected, Down)
                | (Suspected, Leaving)
                | (Down, Alive)
                | (Leaving, Left)
                | (Left, Alive)
        )
    }

    pub fn is_alive(self) -> bool {
        self == NodeStatus::Alive
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Alive => "ALIVE",
            NodeStatus::Suspected => "SUSPECTED",
            NodeStatus::Down => "DOWN",
            NodeStatus::Leaving => "LEAVING",
            NodeStatus::Left => "LEFT",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster member: identity, gossip address, and last known status.
///
/// Equality and hashing consider the id alone; address and status are
/// metadata about the node, not part of its identity.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddr,
    pub status: NodeStatus,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, addr: SocketAddr) -> Self {
        Self {
            id: id.into(),
            addr,
            status: NodeStatus::Alive,
        }
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn node_identity_is_the_id() {
        let a = Node::new("n1", addr(8081));
        let b = Node::new("n1", addr(9999)).with_status(NodeStatus::Down);
        let c = Node::new("n2", addr(8081));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: std::collections::HashSet<Node> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn transition_matrix_matches_the_protocol() {
        use NodeStatus::*;

        let allowed = [
            (Alive, Suspected),
            (Alive, Leaving),
            (Suspected, Alive),
            (Suspected, Down),
            (Suspected, Leaving),
            (Down, Alive),
            (Leaving, Left),
            (Left, Alive),
        ];
        let all = [Alive, Suspected, Down, Leaving, Left];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }
}
