//! The gossip service: periodic liveness probes, indirect probing via
//! proxies, rumor dissemination of status changes, and the
//! join/leave/sync membership protocols. Membership truth lives in the
//! failure detector; this crate moves it around the cluster.

mod config;
mod convert;
mod service;

pub use config::GossipConfig;
pub use convert::{info_to_node, node_to_info, status_from_wire, status_to_wire};
pub use service::GossipService;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid gossip configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
