//! The cluster node: wires the local cache, consistent-hash ring,
//! failure detector, gossip service and replication coordinator into a
//! single peer, and serves the cache RPC endpoint.

mod config;
mod handler;
mod node;
mod transport;

pub use config::NodeConfig;
pub use handler::MeshRpcHandler;
pub use node::ClusterNode;
pub use transport::MeshTransport;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] cache::Error),
    #[error(transparent)]
    Membership(#[from] membership::Error),
    #[error(transparent)]
    Ring(#[from] ring::Error),
    #[error(transparent)]
    Gossip(#[from] gossip::Error),
    #[error(transparent)]
    Coordinator(#[from] coordinator::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),
    #[error("the node is already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
