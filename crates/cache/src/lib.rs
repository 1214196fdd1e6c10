//! The local cache engine: a concurrent, optionally bounded map of
//! [`Key`] to versioned [`Value`], with pluggable eviction, lazy TTL
//! expiry, a background reaper and atomic statistics.
//!
//! This crate is purely node-local. Replication, membership, and the
//! wire protocol build on top of it without reaching into its internals.

mod config;
mod key;
mod reaper;
mod resolve;
mod stats;
mod store;
mod value;

pub use config::{CacheConfig, EvictionPolicy};
pub use key::Key;
pub use resolve::{ConflictResolver, LastWriteWins};
pub use stats::StatsSnapshot;
pub use store::{Cache, GetOutcome};
pub use value::{now_millis, Value, Version};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cache keys must be non-empty")]
    EmptyKey,
    #[error("cannot resolve an empty set of values")]
    EmptyResolveInput,
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
