//! The replication coordinator: fans cache operations out to the
//! replica set chosen by the ring, applies the tunable-consistency
//! quorum rule over completion-ordered responses, reconciles divergent
//! reads by last-writer-wins, and feeds hinted handoff and read repair.

mod config;
mod coordinate;
mod hints;

pub use config::{ConsistencyLevel, ReplicationConfig};
pub use coordinate::{ReadOutcome, ReplicaError, ReplicaTransport, ReplicationCoordinator};
pub use hints::{spawn_hint_replayer, Hint, HintOp, HintStore};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid replication configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("no replicas available for key '{key}'")]
    NoReplicas { key: String },
    #[error(
        "insufficient replicas responded: {successes} succeeded, {failures} failed, \
         {required} required at rf={replication_factor}"
    )]
    Insufficient {
        successes: usize,
        failures: usize,
        required: usize,
        replication_factor: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
