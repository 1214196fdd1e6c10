use crate::frame::GossipFrameCodec;
use crate::Error;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use proto_mesh::gossip::GossipMessage;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::codec::{FramedRead, FramedWrite};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct Conn {
    writer: AsyncMutex<FramedWrite<OwnedWriteHalf, GossipFrameCodec>>,
    /// In-flight requests keyed by sequence number. Replies may arrive
    /// in any order; the reader routes each to its waiter.
    pending: DashMap<u64, oneshot::Sender<GossipMessage>>,
    closed: AtomicBool,
    uses: AtomicUsize,
}

impl Conn {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the senders wakes every waiter with a closed error.
        self.pending.clear();
    }
}

/// A pooled gossip client. One connection per peer address, shared and
/// multiplexed by sequence number, replaced lazily when broken.
#[derive(Clone, Default)]
pub struct GossipClient {
    conns: Arc<DashMap<SocketAddr, Arc<Conn>>>,
}

impl GossipClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `message` and await the reply carrying the same sequence
    /// number, up to `timeout`.
    pub async fn request(
        &self,
        addr: SocketAddr,
        message: GossipMessage,
        timeout: Duration,
    ) -> crate::Result<GossipMessage> {
        let conn = self.connection(addr).await?;
        let seq = message.sequence_number;
        let (tx, rx) = oneshot::channel();
        conn.pending.insert(seq, tx);

        {
            let mut writer = conn.writer.lock().await;
            if conn.closed.load(Ordering::Acquire) {
                conn.pending.remove(&seq);
                return Err(Error::ConnectionClosed);
            }
            if let Err(err) = writer.send(message).await {
                conn.pending.remove(&seq);
                conn.close();
                return Err(err);
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                conn.pending.remove(&seq);
                Err(Error::Timeout)
            }
        }
    }

    /// Send `message` without expecting a reply.
    pub async fn notify(&self, addr: SocketAddr, message: GossipMessage) -> crate::Result<()> {
        let conn = self.connection(addr).await?;
        let mut writer = conn.writer.lock().await;
        if conn.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        if let Err(err) = writer.send(message).await {
            conn.close();
            return Err(err);
        }
        Ok(())
    }

    async fn connection(&self, addr: SocketAddr) -> crate::Result<Arc<Conn>> {
        if let Some(conn) = self.conns.get(&addr) {
            if !conn.closed.load(Ordering::Acquire) {
                conn.uses.fetch_add(1, Ordering::Relaxed);
                return Ok(conn.clone());
            }
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout)??;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let conn = Arc::new(Conn {
            writer: AsyncMutex::new(FramedWrite::new(write_half, GossipFrameCodec)),
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
            uses: AtomicUsize::new(1),
        });
        tokio::spawn(read_loop(
            conn.clone(),
            FramedRead::new(read_half, GossipFrameCodec),
        ));
        self.conns.insert(addr, conn.clone());
        tracing::debug!(%addr, "dialed gossip connection");
        Ok(conn)
    }

    /// Drop connections unused since the previous sweep, along with any
    /// that have failed. Call periodically.
    pub fn sweep(&self) {
        self.conns.retain(|addr, conn| {
            if conn.closed.load(Ordering::Acquire) {
                return false;
            }
            if conn.uses.swap(0, Ordering::Relaxed) == 0 {
                tracing::debug!(%addr, "dropping idle gossip connection");
                conn.close();
                return false;
            }
            true
        });
    }
}

async fn read_loop(conn: Arc<Conn>, mut reader: FramedRead<OwnedReadHalf, GossipFrameCodec>) {
    loop {
        let message = match reader.next().await {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "gossip connection read failed");
                break;
            }
            None => break,
        };
        match conn.pending.remove(&message.sequence_number) {
            Some((_, tx)) => {
                let _ = tx.send(message);
            }
            None => {
                // Reply to a request we stopped waiting for.
                tracing::debug!(
                    seq = message.sequence_number,
                    "dropping gossip reply with no waiter"
                );
            }
        }
    }
    conn.close();
}
