//! Cluster membership model: node identity and the SWIM-style failure
//! detector which tracks each peer's liveness state machine.

mod detector;
mod node;

pub use detector::{DetectorConfig, DetectorEvent, FailureDetector, IgnoreReason};
pub use node::{Node, NodeId, NodeStatus};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid failure detector configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
