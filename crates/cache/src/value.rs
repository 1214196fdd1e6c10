use bytes::Bytes;
use std::cmp::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A distributed write version: wall-clock milliseconds paired with the
/// originating node id. Versions are totally ordered, with the node id
/// breaking timestamp ties, which makes last-writer-wins deterministic
/// across the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    pub timestamp_ms: i64,
    pub node_id: String,
}

impl Version {
    pub fn new(timestamp_ms: i64, node_id: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            node_id: node_id.into(),
        }
    }

    /// A version stamped with the current wall clock at `node_id`.
    pub fn now(node_id: impl Into<String>) -> Self {
        Self::new(now_millis(), node_id)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp_ms
            .cmp(&other.timestamp_ms)
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.timestamp_ms, self.node_id)
    }
}

/// A stored value: an opaque byte payload plus bookkeeping metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub data: Bytes,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Absolute expiry in milliseconds since the Unix epoch, if any.
    pub expires_at: Option<i64>,
    /// Version of the originating write, if the write was versioned.
    pub version: Option<Version>,
}

impl Value {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            created_at: now_millis(),
            expires_at: None,
            version: None,
        }
    }

    /// A fresh value carrying `data` and `version`, created now.
    pub fn with_data(&self, data: impl Into<Bytes>, version: Option<Version>) -> Self {
        Self {
            data: data.into(),
            created_at: now_millis(),
            expires_at: self.expires_at,
            version,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Expire this value `ttl` from now.
    pub fn with_ttl(self, ttl: Duration) -> Self {
        let expires_at = now_millis() + ttl.as_millis() as i64;
        self.with_expiry(expires_at)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.map(|e| now_ms > e).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_order_is_total_and_tie_broken_by_node() {
        let a = Version::new(1000, "n1");
        let b = Version::new(1000, "n2");
        let c = Version::new(2000, "n1");

        assert!(a < b);
        assert!(b < c);
        assert!(a < c); // transitive
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse()); // antisymmetric
        assert_eq!(a, Version::new(1000, "n1"));
    }

    #[test]
    fn expiry_is_relative_to_the_given_clock() {
        let value = Value::new("v").with_expiry(1_000);
        assert!(!value.is_expired(999));
        assert!(!value.is_expired(1_000));
        assert!(value.is_expired(1_001));

        assert!(!Value::new("v").is_expired(i64::MAX));
    }

    #[test]
    fn with_data_refreshes_creation_time() {
        let mut old = Value::new("old").with_version(Version::new(1, "n1"));
        old.created_at = 0;

        let new = old.with_data("new", Some(Version::new(2, "n1")));
        assert_eq!(new.data, Bytes::from("new"));
        assert!(new.created_at > old.created_at);
        assert_eq!(new.version, Some(Version::new(2, "n1")));
    }
}
