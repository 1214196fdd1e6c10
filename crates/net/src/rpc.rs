use crate::{CacheFrame, CacheMessageKind, Error};
use prost::Message;
use proto_mesh::cache as wire;
use proto_mesh::gossip::GossipMessage;

/// A typed cache RPC request, one variant per request frame kind.
/// `Gossip` lets membership traffic ride the cache RPC endpoint.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheRequest {
    Get(wire::GetRequest),
    Put(wire::PutRequest),
    Delete(wire::DeleteRequest),
    Gossip(GossipMessage),
}

/// A typed cache RPC response, one variant per response frame kind.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheResponse {
    Get(wire::GetResponse),
    Put(wire::PutResponse),
    Delete(wire::DeleteResponse),
    Gossip(GossipMessage),
}

impl CacheRequest {
    pub fn kind(&self) -> CacheMessageKind {
        match self {
            CacheRequest::Get(_) => CacheMessageKind::GetRequest,
            CacheRequest::Put(_) => CacheMessageKind::PutRequest,
            CacheRequest::Delete(_) => CacheMessageKind::DeleteRequest,
            CacheRequest::Gossip(_) => CacheMessageKind::Gossip,
        }
    }

    pub fn into_frame(self) -> CacheFrame {
        let kind = self.kind();
        let payload = match self {
            CacheRequest::Get(m) => m.encode_to_vec(),
            CacheRequest::Put(m) => m.encode_to_vec(),
            CacheRequest::Delete(m) => m.encode_to_vec(),
            CacheRequest::Gossip(m) => m.encode_to_vec(),
        };
        CacheFrame {
            kind,
            payload: payload.into(),
        }
    }

    pub fn from_frame(frame: CacheFrame) -> crate::Result<Self> {
        Ok(match frame.kind {
            CacheMessageKind::GetRequest => {
                CacheRequest::Get(wire::GetRequest::decode(frame.payload)?)
            }
            CacheMessageKind::PutRequest => {
                CacheRequest::Put(wire::PutRequest::decode(frame.payload)?)
            }
            CacheMessageKind::DeleteRequest => {
                CacheRequest::Delete(wire::DeleteRequest::decode(frame.payload)?)
            }
            CacheMessageKind::Gossip => {
                CacheRequest::Gossip(GossipMessage::decode(frame.payload)?)
            }
            other => {
                return Err(Error::UnexpectedFrame {
                    want: "request",
                    got: other.as_str(),
                })
            }
        })
    }
}

impl CacheResponse {
    pub fn kind(&self) -> CacheMessageKind {
        match self {
            CacheResponse::Get(_) => CacheMessageKind::GetResponse,
            CacheResponse::Put(_) => CacheMessageKind::PutResponse,
            CacheResponse::Delete(_) => CacheMessageKind::DeleteResponse,
            CacheResponse::Gossip(_) => CacheMessageKind::Gossip,
        }
    }

    pub fn into_frame(self) -> CacheFrame {
        let kind = self.kind();
        let payload = match self {
            CacheResponse::Get(m) => m.encode_to_vec(),
            CacheResponse::Put(m) => m.encode_to_vec(),
            CacheResponse::Delete(m) => m.encode_to_vec(),
            CacheResponse::Gossip(m) => m.encode_to_vec(),
        };
        CacheFrame {
            kind,
            payload: payload.into(),
        }
    }

    pub fn from_frame(frame: CacheFrame) -> crate::Result<Self> {
        Ok(match frame.kind {
            CacheMessageKind::GetResponse => {
                CacheResponse::Get(wire::GetResponse::decode(frame.payload)?)
            }
            CacheMessageKind::PutResponse => {
                CacheResponse::Put(wire::PutResponse::decode(frame.payload)?)
            }
            CacheMessageKind::DeleteResponse => {
                CacheResponse::Delete(wire::DeleteResponse::decode(frame.payload)?)
            }
            CacheMessageKind::Gossip => {
                CacheResponse::Gossip(GossipMessage::decode(frame.payload)?)
            }
            other => {
                return Err(Error::UnexpectedFrame {
                    want: "response",
                    got: other.as_str(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_round_trip_through_frames() {
        let requests = [
            CacheRequest::Get(wire::GetRequest {
                key: "k".to_string(),
            }),
            CacheRequest::Put(wire::PutRequest {
                key: "k".to_string(),
                entry: Some(wire::CacheEntry {
                    data: b"v".to_vec(),
                    created_at: 1,
                    expires_at: 0,
                    version: None,
                }),
            }),
            CacheRequest::Delete(wire::DeleteRequest {
                key: "k".to_string(),
            }),
        ];
        for request in requests {
            let frame = request.clone().into_frame();
            assert_eq!(CacheRequest::from_frame(frame).unwrap(), request);
        }
    }

    #[test]
    fn a_response_frame_is_not_a_request() {
        let frame = CacheResponse::Put(wire::PutResponse {
            status: wire::put_response::Status::Success as i32,
            error_message: String::new(),
        })
        .into_frame();

        assert!(matches!(
            CacheRequest::from_frame(frame),
            Err(Error::UnexpectedFrame { .. })
        ));
    }
}
