use crate::Error;
use std::time::Duration;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Cadence of probe rounds; each round pings one random alive peer.
    #[serde(with = "humantime_serde")]
    pub gossip_interval: Duration,
    /// How long to await an ACK. Must be strictly shorter than the
    /// gossip interval so rounds never overlap their own probes.
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,
    /// Proxies asked to probe on our behalf when a direct ping fails.
    pub indirect_ping_nodes: usize,
    /// Random peers a rumor is spread to.
    pub fanout: usize,
    /// Maximum membership entries piggybacked on outgoing messages.
    pub piggyback_size: usize,
    /// Grace period for LEAVE notifications during graceful shutdown.
    #[serde(with = "humantime_serde")]
    pub leave_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_millis(500),
            indirect_ping_nodes: 3,
            fanout: 3,
            piggyback_size: 5,
            leave_timeout: Duration::from_secs(5),
        }
    }
}

impl GossipConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.gossip_interval.is_zero() {
            return Err(Error::InvalidConfig("gossip_interval must be positive"));
        }
        if self.ping_timeout.is_zero() {
            return Err(Error::InvalidConfig("ping_timeout must be positive"));
        }
        if self.ping_timeout >= self.gossip_interval {
            return Err(Error::InvalidConfig(
                "ping_timeout must be strictly less than gossip_interval",
            ));
        }
        if self.indirect_ping_nodes == 0 {
            return Err(Error::InvalidConfig(
                "indirect_ping_nodes must be at least 1",
            ));
        }
        if self.fanout == 0 {
            return Err(Error::InvalidConfig("fanout must be at least 1"));
        }
        if self.piggyback_size == 0 {
            return Err(Error::InvalidConfig("piggyback_size must be at least 1"));
        }
        if self.leave_timeout.is_zero() {
            return Err(Error::InvalidConfig("leave_timeout must be positive"));
        }
        Ok(())
    }
}
