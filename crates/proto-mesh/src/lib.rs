//! Wire message types of the cachemesh protocols.
//!
//! `cache` holds the client-facing cache RPC messages, and `gossip` the
//! membership protocol messages. Both are plain prost messages; framing
//! is the concern of the `net` crate.

pub mod cache;
pub mod gossip;
