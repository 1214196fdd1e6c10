use cache::{Cache, GetOutcome, Key};
use gossip::GossipService;
use net::{entry_to_value, value_to_entry, CacheRequest, CacheResponse, GossipMessageHandler};
use proto_mesh::cache as wire;
use proto_mesh::gossip::{GossipMessage, MessageType};
use std::sync::Arc;

/// Serves the cache RPC surface of one node: get/put/delete against the
/// local cache, plus gossip messages arriving over the RPC endpoint.
/// Local cache failures become ERROR statuses, never dropped
/// connections.
pub struct MeshRpcHandler {
    cache: Arc<Cache>,
    gossip: GossipService,
}

impl MeshRpcHandler {
    pub fn new(cache: Arc<Cache>, gossip: GossipService) -> Self {
        Self { cache, gossip }
    }

    fn handle_get(&self, request: wire::GetRequest) -> wire::GetResponse {
        let key = match Key::new(request.key) {
            Ok(key) => key,
            Err(err) => {
                return wire::GetResponse {
                    status: wire::get_response::Status::Error as i32,
                    entry: None,
                    error_message: err.to_string(),
                }
            }
        };
        match self.cache.get(&key) {
            GetOutcome::Hit(value) => wire::GetResponse {
                status: wire::get_response::Status::Hit as i32,
                entry: Some(value_to_entry(&value)),
                error_message: String::new(),
            },
            GetOutcome::Miss => wire::GetResponse {
                status: wire::get_response::Status::Miss as i32,
                entry: None,
                error_message: String::new(),
            },
        }
    }

    fn handle_put(&self, request: wire::PutRequest) -> wire::PutResponse {
        let error = |message: String| wire::PutResponse {
            status: wire::put_response::Status::Error as i32,
            error_message: message,
        };

        let key = match Key::new(request.key) {
            Ok(key) => key,
            Err(err) => return error(err.to_string()),
        };
        let Some(entry) = request.entry else {
            return error("put request carries no entry".to_string());
        };
        match self.cache.put(key, entry_to_value(entry)) {
            Ok(()) => wire::PutResponse {
                status: wire::put_response::Status::Success as i32,
                error_message: String::new(),
            },
            Err(err) => error(err.to_string()),
        }
    }

    fn handle_delete(&self, request: wire::DeleteRequest) -> wire::DeleteResponse {
        let error = |message: String| wire::DeleteResponse {
            status: wire::delete_response::Status::Error as i32,
            error_message: message,
        };

        let key = match Key::new(request.key) {
            Ok(key) => key,
            Err(err) => return error(err.to_string()),
        };
        match self.cache.delete(&key) {
            Ok(()) => wire::DeleteResponse {
                status: wire::delete_response::Status::Success as i32,
                error_message: String::new(),
            },
            Err(err) => error(err.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl net::CacheRpcHandler for MeshRpcHandler {
    async fn handle(&self, request: CacheRequest) -> CacheResponse {
        match request {
            CacheRequest::Get(request) => CacheResponse::Get(self.handle_get(request)),
            CacheRequest::Put(request) => CacheResponse::Put(self.handle_put(request)),
            CacheRequest::Delete(request) => CacheResponse::Delete(self.handle_delete(request)),
            CacheRequest::Gossip(message) => {
                // Pipelining requires exactly one reply per request, so
                // fire-and-forget gossip messages are answered with a
                // bare ACK.
                let seq = message.sequence_number;
                let reply = self.gossip.handle(message).await.unwrap_or(GossipMessage {
                    r#type: MessageType::Ack as i32,
                    sequence_number: seq,
                    ..Default::default()
                });
                CacheResponse::Gossip(reply)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::CacheConfig;
    use membership::{DetectorConfig, FailureDetector, Node};
    use net::CacheRpcHandler as _;

    fn handler() -> MeshRpcHandler {
        let cache = Arc::new(
            Cache::new(CacheConfig {
                enable_auto_cleanup: false,
                ..Default::default()
            })
            .unwrap(),
        );
        let detector = Arc::new(FailureDetector::new(DetectorConfig::default()).unwrap());
        let gossip = GossipService::new(
            Node::new("n1", "127.0.0.1:7946".parse().unwrap()),
            detector,
            gossip::GossipConfig::default(),
        )
        .unwrap();
        MeshRpcHandler::new(cache, gossip)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_the_handler() {
        let handler = handler();

        let put = CacheRequest::Put(wire::PutRequest {
            key: "user:123".to_string(),
            entry: Some(wire::CacheEntry {
                data: b"Alice".to_vec(),
                created_at: 1,
                expires_at: 0,
                version: None,
            }),
        });
        match handler.handle(put).await {
            CacheResponse::Put(response) => {
                assert_eq!(response.status, wire::put_response::Status::Success as i32);
            }
            other => panic!("unexpected response {other:?}"),
        }

        let get = CacheRequest::Get(wire::GetRequest {
            key: "user:123".to_string(),
        });
        match handler.handle(get).await {
            CacheResponse::Get(response) => {
                assert_eq!(response.status, wire::get_response::Status::Hit as i32);
                assert_eq!(response.entry.unwrap().data, b"Alice");
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_keys_surface_as_error_statuses() {
        let handler = handler();

        let get = CacheRequest::Get(wire::GetRequest { key: String::new() });
        match handler.handle(get).await {
            CacheResponse::Get(response) => {
                assert_eq!(response.status, wire::get_response::Status::Error as i32);
                assert!(!response.error_message.is_empty());
            }
            other => panic!("unexpected response {other:?}"),
        }

        let put = CacheRequest::Put(wire::PutRequest {
            key: String::new(),
            entry: None,
        });
        match handler.handle(put).await {
            CacheResponse::Put(response) => {
                assert_eq!(response.status, wire::put_response::Status::Error as i32);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn gossip_over_the_rpc_endpoint_is_answered() {
        let handler = handler();

        let ping = CacheRequest::Gossip(GossipMessage {
            r#type: MessageType::Ping as i32,
            sequence_number: 42,
            ..Default::default()
        });
        match handler.handle(ping).await {
            CacheResponse::Gossip(reply) => {
                assert_eq!(reply.r#type, MessageType::Ack as i32);
                assert_eq!(reply.sequence_number, 42);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
}
