//! TCP transport for the cache RPC and gossip protocols: framing
//! codecs, pooled peer clients, and the accept-loop plumbing servers
//! build on.
//!
//! Cache RPC connections are pipelined: requests are answered in order,
//! so responses correlate by position. Gossip connections are
//! multiplexed: responses correlate by sequence number. Both share the
//! same 10 MiB frame bound.

mod cache_client;
mod convert;
mod frame;
mod gossip_client;
mod rpc;
mod server;

pub use cache_client::CacheClient;
pub use convert::{entry_to_value, value_to_entry, version_from_wire, version_to_wire};
pub use frame::{CacheFrame, CacheFrameCodec, CacheMessageKind, GossipFrameCodec, MAX_FRAME_LEN};
pub use gossip_client::GossipClient;
pub use rpc::{CacheRequest, CacheResponse};
pub use server::{serve_cache_rpc, serve_gossip, CacheRpcHandler, GossipMessageHandler};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
    #[error("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge { len: usize },
    #[error("unknown cache message kind {0}")]
    UnknownMessageKind(u8),
    #[error("peer sent a {got} frame where a {want} was expected")]
    UnexpectedFrame {
        want: &'static str,
        got: &'static str,
    },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("request timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;
