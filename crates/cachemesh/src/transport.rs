use crate::NodeConfig;
use cache::{Cache, GetOutcome, Key, Value};
use coordinator::{ReplicaError, ReplicaTransport};
use membership::{Node, NodeId};
use net::{entry_to_value, value_to_entry, CacheClient, CacheRequest, CacheResponse};
use proto_mesh::cache as wire;
use std::sync::Arc;
use std::time::Duration;

/// The coordinator's view of replicas: operations against this node
/// short-circuit to the local cache, everything else goes over the
/// pooled cache RPC client to the peer's derived RPC address.
pub struct MeshTransport {
    local_id: NodeId,
    local_cache: Arc<Cache>,
    client: CacheClient,
    rpc_timeout: Duration,
}

impl MeshTransport {
    pub fn new(local_id: NodeId, local_cache: Arc<Cache>, rpc_timeout: Duration) -> Self {
        Self {
            local_id,
            local_cache,
            client: CacheClient::new(),
            rpc_timeout,
        }
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    async fn remote(&self, node: &Node, request: CacheRequest) -> Result<CacheResponse, ReplicaError> {
        let addr = NodeConfig::peer_rpc_addr(node.addr);
        self.client
            .request(addr, request, self.rpc_timeout)
            .await
            .map_err(|err| ReplicaError::new(format!("{}: {err}", node.id)))
    }
}

#[async_trait::async_trait]
impl ReplicaTransport for MeshTransport {
    async fn put(&self, node: Node, key: Key, value: Value) -> Result<(), ReplicaError> {
        if node.id == self.local_id {
            return self
                .local_cache
                .put(key, value)
                .map_err(|err| ReplicaError::new(err.to_string()));
        }

        let request = CacheRequest::Put(wire::PutRequest {
            key: key.to_string(),
            entry: Some(value_to_entry(&value)),
        });
        match self.remote(&node, request).await? {
            CacheResponse::Put(response)
                if response.status == wire::put_response::Status::Success as i32 =>
            {
                Ok(())
            }
            CacheResponse::Put(response) => Err(ReplicaError::new(response.error_message)),
            other => Err(ReplicaError::new(format!(
                "unexpected reply to put: {other:?}"
            ))),
        }
    }

    async fn get(&self, node: Node, key: Key) -> Result<Option<Value>, ReplicaError> {
        if node.id == self.local_id {
            return Ok(match self.local_cache.get(&key) {
                GetOutcome::Hit(value) => Some(value),
                GetOutcome::Miss => None,
            });
        }

        let request = CacheRequest::Get(wire::GetRequest {
            key: key.to_string(),
        });
        match self.remote(&node, request).await? {
            CacheResponse::Get(response) => {
                match wire::get_response::Status::try_from(response.status) {
                    Ok(wire::get_response::Status::Hit) => {
                        let entry = response.entry.ok_or_else(|| {
                            ReplicaError::new("hit response carries no entry")
                        })?;
                        Ok(Some(entry_to_value(entry)))
                    }
                    Ok(wire::get_response::Status::Miss) => Ok(None),
                    _ => Err(ReplicaError::new(response.error_message)),
                }
            }
            other => Err(ReplicaError::new(format!(
                "unexpected reply to get: {other:?}"
            ))),
        }
    }

    async fn delete(&self, node: Node, key: Key) -> Result<(), ReplicaError> {
        if node.id == self.local_id {
            return self
                .local_cache
                .delete(&key)
                .map_err(|err| ReplicaError::new(err.to_string()));
        }

        let request = CacheRequest::Delete(wire::DeleteRequest {
            key: key.to_string(),
        });
        match self.remote(&node, request).await? {
            CacheResponse::Delete(response)
                if response.status == wire::delete_response::Status::Success as i32 =>
            {
                Ok(())
            }
            CacheResponse::Delete(response) => Err(ReplicaError::new(response.error_message)),
            other => Err(ReplicaError::new(format!(
                "unexpected reply to delete: {other:?}"
            ))),
        }
    }
}
