//! Conversions between the in-memory value model and its wire shape.
//! A zero `expires_at` on the wire means "no expiry".

use cache::{Value, Version};
use proto_mesh::cache as wire;

pub fn version_to_wire(version: &Version) -> wire::Version {
    wire::Version {
        timestamp: version.timestamp_ms,
        node_id: version.node_id.clone(),
    }
}

pub fn version_from_wire(version: wire::Version) -> Version {
    Version::new(version.timestamp, version.node_id)
}

pub fn value_to_entry(value: &Value) -> wire::CacheEntry {
    wire::CacheEntry {
        data: value.data.to_vec(),
        created_at: value.created_at,
        expires_at: value.expires_at.unwrap_or(0),
        version: value.version.as_ref().map(version_to_wire),
    }
}

pub fn entry_to_value(entry: wire::CacheEntry) -> Value {
    Value {
        data: entry.data.into(),
        created_at: entry.created_at,
        expires_at: (entry.expires_at != 0).then_some(entry.expires_at),
        version: entry.version.map(version_from_wire),
    }
}
