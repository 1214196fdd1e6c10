use crate::frame::{CacheFrameCodec, GossipFrameCodec};
use crate::rpc::{CacheRequest, CacheResponse};
use futures::{SinkExt, StreamExt};
use proto_mesh::gossip::GossipMessage;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::{FramedRead, FramedWrite};

/// Serves decoded cache RPC requests. One call per request; requests
/// on a single connection are handled sequentially, so replies follow
/// request order.
#[async_trait::async_trait]
pub trait CacheRpcHandler: Send + Sync + 'static {
    async fn handle(&self, request: CacheRequest) -> CacheResponse;
}

/// Serves inbound gossip messages. Returning `Some` writes the reply
/// back on the same connection; the handler is responsible for echoing
/// the request's sequence number.
#[async_trait::async_trait]
pub trait GossipMessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: GossipMessage) -> Option<GossipMessage>;
}

/// Accept loop for the cache RPC endpoint. Runs until `shutdown`
/// flips; per-connection tasks stop with it.
pub async fn serve_cache_rpc(
    listener: TcpListener,
    handler: Arc<dyn CacheRpcHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted cache rpc connection");
                    tokio::spawn(serve_cache_conn(stream, handler.clone(), shutdown.clone()));
                }
                Err(err) => tracing::warn!(error = %err, "cache rpc accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("cache rpc server stopped");
}

async fn serve_cache_conn(
    stream: TcpStream,
    handler: Arc<dyn CacheRpcHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(error = %err, "set_nodelay failed");
    }
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, CacheFrameCodec);
    let mut writer = FramedWrite::new(write_half, CacheFrameCodec);

    loop {
        let frame = tokio::select! {
            frame = reader.next() => frame,
            _ = shutdown.changed() => break,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "dropping cache rpc connection");
                break;
            }
            None => break,
        };
        let request = match CacheRequest::from_frame(frame) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "dropping cache rpc connection");
                break;
            }
        };
        let response = handler.handle(request).await;
        if let Err(err) = writer.send(response.into_frame()).await {
            tracing::debug!(error = %err, "cache rpc reply failed");
            break;
        }
    }
}

/// Accept loop for the gossip endpoint.
pub async fn serve_gossip(
    listener: TcpListener,
    handler: Arc<dyn GossipMessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted gossip connection");
                    tokio::spawn(serve_gossip_conn(stream, handler.clone(), shutdown.clone()));
                }
                Err(err) => tracing::warn!(error = %err, "gossip accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("gossip server stopped");
}

async fn serve_gossip_conn(
    stream: TcpStream,
    handler: Arc<dyn GossipMessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(error = %err, "set_nodelay failed");
    }
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, GossipFrameCodec);
    let mut writer = FramedWrite::new(write_half, GossipFrameCodec);

    loop {
        let message = tokio::select! {
            message = reader.next() => message,
            _ = shutdown.changed() => break,
        };
        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "dropping gossip connection");
                break;
            }
            None => break,
        };
        if let Some(reply) = handler.handle(message).await {
            if let Err(err) = writer.send(reply).await {
                tracing::debug!(error = %err, "gossip reply failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheClient, GossipClient};
    use proto_mesh::cache as wire;
    use proto_mesh::gossip::MessageType;
    use std::time::Duration;

    struct EchoKeyHandler;

    #[async_trait::async_trait]
    impl CacheRpcHandler for EchoKeyHandler {
        async fn handle(&self, request: CacheRequest) -> CacheResponse {
            match request {
                CacheRequest::Get(get) => CacheResponse::Get(wire::GetResponse {
                    status: wire::get_response::Status::Hit as i32,
                    entry: Some(wire::CacheEntry {
                        data: get.key.into_bytes(),
                        created_at: 1,
                        expires_at: 0,
                        version: None,
                    }),
                    error_message: String::new(),
                }),
                CacheRequest::Put(_) => CacheResponse::Put(wire::PutResponse {
                    status: wire::put_response::Status::Success as i32,
                    error_message: String::new(),
                }),
                CacheRequest::Delete(_) => CacheResponse::Delete(wire::DeleteResponse {
                    status: wire::delete_response::Status::Success as i32,
                    error_message: String::new(),
                }),
                CacheRequest::Gossip(message) => CacheResponse::Gossip(message),
            }
        }
    }

    struct AckHandler;

    #[async_trait::async_trait]
    impl GossipMessageHandler for AckHandler {
        async fn handle(&self, message: GossipMessage) -> Option<GossipMessage> {
            (message.r#type == MessageType::Ping as i32).then(|| GossipMessage {
                r#type: MessageType::Ack as i32,
                sequence_number: message.sequence_number,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn cache_rpc_requests_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve_cache_rpc(
            listener,
            Arc::new(EchoKeyHandler),
            shutdown_rx,
        ));

        let client = CacheClient::new();
        let timeout = Duration::from_secs(1);

        // Pipelined requests answered in order.
        let first = client.request(
            addr,
            CacheRequest::Get(wire::GetRequest {
                key: "alpha".to_string(),
            }),
            timeout,
        );
        let second = client.request(
            addr,
            CacheRequest::Get(wire::GetRequest {
                key: "beta".to_string(),
            }),
            timeout,
        );
        let (first, second) = tokio::join!(first, second);

        for (response, key) in [(first, "alpha"), (second, "beta")] {
            match response.unwrap() {
                CacheResponse::Get(get) => {
                    assert_eq!(get.entry.unwrap().data, key.as_bytes());
                }
                other => panic!("unexpected response {other:?}"),
            }
        }

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn gossip_requests_correlate_by_sequence_number() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve_gossip(listener, Arc::new(AckHandler), shutdown_rx));

        let client = GossipClient::new();
        let ping = |seq| GossipMessage {
            r#type: MessageType::Ping as i32,
            sequence_number: seq,
            ..Default::default()
        };

        let reply = client
            .request(addr, ping(7), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.r#type, MessageType::Ack as i32);
        assert_eq!(reply.sequence_number, 7);

        // Messages with no reply expected.
        client
            .notify(
                addr,
                GossipMessage {
                    r#type: MessageType::Leave as i32,
                    sequence_number: 8,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // The connection is still usable afterwards.
        let reply = client
            .request(addr, ping(9), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.sequence_number, 9);

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn requests_against_a_dead_peer_fail() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CacheClient::new();
        let result = client
            .request(
                addr,
                CacheRequest::Get(wire::GetRequest {
                    key: "k".to_string(),
                }),
                Duration::from_millis(500),
            )
            .await;
        assert!(result.is_err());
    }
}
