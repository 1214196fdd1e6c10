use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use proto_mesh::gossip::GossipMessage;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on any single frame payload. A peer announcing a larger
/// frame is faulty or hostile; decoding fails and the connection is
/// dropped.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

/// Cache RPC frame header: one type byte, then a big-endian u32 payload
/// length.
const CACHE_HEADER_LEN: usize = 5;

/// Gossip frame header: a big-endian u32 payload length.
const GOSSIP_HEADER_LEN: usize = 4;

/// The type tag of a cache RPC frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CacheMessageKind {
    GetRequest = 0,
    GetResponse = 1,
    PutRequest = 2,
    PutResponse = 3,
    DeleteRequest = 4,
    DeleteResponse = 5,
    Gossip = 6,
}

impl CacheMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMessageKind::GetRequest => "GetRequest",
            CacheMessageKind::GetResponse => "GetResponse",
            CacheMessageKind::PutRequest => "PutRequest",
            CacheMessageKind::PutResponse => "PutResponse",
            CacheMessageKind::DeleteRequest => "DeleteRequest",
            CacheMessageKind::DeleteResponse => "DeleteResponse",
            CacheMessageKind::Gossip => "Gossip",
        }
    }
}

impl TryFrom<u8> for CacheMessageKind {
    type Error = Error;

    fn try_from(tag: u8) -> crate::Result<Self> {
        Ok(match tag {
            0 => CacheMessageKind::GetRequest,
            1 => CacheMessageKind::GetResponse,
            2 => CacheMessageKind::PutRequest,
            3 => CacheMessageKind::PutResponse,
            4 => CacheMessageKind::DeleteRequest,
            5 => CacheMessageKind::DeleteResponse,
            6 => CacheMessageKind::Gossip,
            other => return Err(Error::UnknownMessageKind(other)),
        })
    }
}

/// A decoded cache RPC frame: its type tag and undecoded payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheFrame {
    pub kind: CacheMessageKind,
    pub payload: Bytes,
}

/// Codec for `[u8 type][u32 length][payload]` cache RPC frames.
///
/// Decoding never consumes bytes until a complete frame has arrived,
/// so arbitrarily fragmented reads reassemble correctly.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheFrameCodec;

impl Decoder for CacheFrameCodec {
    type Item = CacheFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> crate::Result<Option<CacheFrame>> {
        if src.len() < CACHE_HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge { len });
        }
        if src.len() < CACHE_HEADER_LEN + len {
            src.reserve(CACHE_HEADER_LEN + len - src.len());
            return Ok(None);
        }
        let kind = CacheMessageKind::try_from(src[0])?;
        src.advance(CACHE_HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(CacheFrame { kind, payload }))
    }
}

impl Encoder<CacheFrame> for CacheFrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: CacheFrame, dst: &mut BytesMut) -> crate::Result<()> {
        if frame.payload.len() > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge {
                len: frame.payload.len(),
            });
        }
        dst.reserve(CACHE_HEADER_LEN + frame.payload.len());
        dst.put_u8(frame.kind as u8);
        dst.put_u32(frame.payload.len() as u32);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

/// Codec for `[u32 length][payload]` gossip frames, decoding straight
/// to [`GossipMessage`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GossipFrameCodec;

impl Decoder for GossipFrameCodec {
    type Item = GossipMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> crate::Result<Option<GossipMessage>> {
        if src.len() < GOSSIP_HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge { len });
        }
        if src.len() < GOSSIP_HEADER_LEN + len {
            src.reserve(GOSSIP_HEADER_LEN + len - src.len());
            return Ok(None);
        }
        src.advance(GOSSIP_HEADER_LEN);
        let payload = src.split_to(len);
        Ok(Some(GossipMessage::decode(payload.freeze())?))
    }
}

impl Encoder<GossipMessage> for GossipFrameCodec {
    type Error = Error;

    fn encode(&mut self, message: GossipMessage, dst: &mut BytesMut) -> crate::Result<()> {
        let len = message.encoded_len();
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge { len });
        }
        dst.reserve(GOSSIP_HEADER_LEN + len);
        dst.put_u32(len as u32);
        message
            .encode(dst)
            .expect("BytesMut reserve guarantees capacity");
        Ok(())
    }
}
