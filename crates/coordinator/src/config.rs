use crate::Error;
use std::time::Duration;

/// Per-operation requirement on how many replicas must respond.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsistencyLevel {
    One,
    Quorum,
    All,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Number of replicas each key is written to.
    pub replication_factor: usize,
    pub read_consistency: ConsistencyLevel,
    pub write_consistency: ConsistencyLevel,
    pub hinted_handoff_enabled: bool,
    pub read_repair_enabled: bool,
    /// Default deadline for a coordinated operation.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replication_factor: 3,
            read_consistency: ConsistencyLevel::Quorum,
            write_consistency: ConsistencyLevel::Quorum,
            hinted_handoff_enabled: true,
            read_repair_enabled: true,
            operation_timeout: Duration::from_secs(1),
        }
    }
}

impl ReplicationConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.replication_factor == 0 {
            return Err(Error::InvalidConfig(
                "replication_factor must be at least 1",
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::InvalidConfig("operation_timeout must be positive"));
        }
        Ok(())
    }

    /// Majority of the replica set.
    pub fn quorum(&self) -> usize {
        self.replication_factor / 2 + 1
    }

    /// How many successful responses `level` demands.
    pub fn required_responses(&self, level: ConsistencyLevel) -> usize {
        match level {
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Quorum => self.quorum(),
            ConsistencyLevel::All => self.replication_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_arithmetic() {
        let config = ReplicationConfig {
            replication_factor: 3,
            ..Default::default()
        };
        assert_eq!(config.required_responses(ConsistencyLevel::One), 1);
        assert_eq!(config.required_responses(ConsistencyLevel::Quorum), 2);
        assert_eq!(config.required_responses(ConsistencyLevel::All), 3);

        for (rf, quorum) in [(1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (7, 4)] {
            let config = ReplicationConfig {
                replication_factor: rf,
                ..Default::default()
            };
            assert_eq!(config.quorum(), quorum, "rf={rf}");
        }
    }

    #[test]
    fn zero_replication_factor_is_rejected() {
        let config = ReplicationConfig {
            replication_factor: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
