use crate::Error;
use cache::CacheConfig;
use coordinator::ReplicationConfig;
use gossip::GossipConfig;
use membership::{DetectorConfig, NodeId};
use ring::RingConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Full configuration of one cluster node.
///
/// A node advertises its gossip address to peers; its cache RPC
/// endpoint always listens on the next port, so peers can derive it
/// without a separate exchange.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node id, unique within the cluster. Defaults to the gossip
    /// address rendered as a string.
    pub id: Option<String>,
    /// Address the gossip service binds and advertises.
    pub gossip_addr: SocketAddr,
    /// Seed addresses contacted at startup, in order.
    pub seeds: Vec<SocketAddr>,
    /// Per-seed deadline while joining.
    #[serde(with = "humantime_serde")]
    pub join_timeout: Duration,
    pub cache: CacheConfig,
    pub ring: RingConfig,
    pub detector: DetectorConfig,
    pub gossip: GossipConfig,
    pub replication: ReplicationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            gossip_addr: "127.0.0.1:7946".parse().unwrap(),
            seeds: Vec::new(),
            join_timeout: Duration::from_secs(5),
            cache: CacheConfig::default(),
            ring: RingConfig::default(),
            detector: DetectorConfig::default(),
            gossip: GossipConfig::default(),
            replication: ReplicationConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load a JSON config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn node_id(&self) -> NodeId {
        match &self.id {
            Some(id) => NodeId::new(id.clone()),
            None => NodeId::new(self.gossip_addr.to_string()),
        }
    }

    /// The cache RPC endpoint: one port above the gossip endpoint.
    pub fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.gossip_addr.ip(), self.gossip_addr.port() + 1)
    }

    /// Derive a peer's cache RPC endpoint from its advertised gossip
    /// address.
    pub fn peer_rpc_addr(gossip_addr: SocketAddr) -> SocketAddr {
        SocketAddr::new(gossip_addr.ip(), gossip_addr.port() + 1)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.gossip_addr.port() == 0 || self.gossip_addr.port() == u16::MAX {
            return Err(Error::InvalidConfig(format!(
                "gossip port {} leaves no room for the adjacent rpc port",
                self.gossip_addr.port()
            )));
        }
        if self.join_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "join_timeout must be positive".to_string(),
            ));
        }
        self.cache.validate()?;
        self.ring.validate()?;
        self.detector.validate()?;
        self.gossip.validate()?;
        self.replication.validate()?;
        Ok(())
    }
}
