use crate::frame::CacheFrameCodec;
use crate::rpc::{CacheRequest, CacheResponse};
use crate::Error;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::codec::{FramedRead, FramedWrite};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct Conn {
    writer: AsyncMutex<FramedWrite<OwnedWriteHalf, CacheFrameCodec>>,
    /// Senders for in-flight requests, in write order. The connection
    /// is pipelined and replies arrive in request order, so each
    /// response completes the front of this queue.
    pending: Mutex<VecDeque<oneshot::Sender<crate::Result<CacheResponse>>>>,
    closed: AtomicBool,
    /// Requests since the last sweep.
    uses: AtomicUsize,
}

impl Conn {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for tx in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }
    }
}

/// A pooled cache RPC client. One connection is kept per peer address,
/// shared by concurrent requests through pipelining, and replaced
/// lazily after a failure.
#[derive(Clone, Default)]
pub struct CacheClient {
    conns: Arc<DashMap<SocketAddr, Arc<Conn>>>,
}

impl CacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue `request` against `addr`, waiting up to `timeout` for the
    /// reply. A timeout abandons the wait but not the request: the
    /// peer may still apply it.
    pub async fn request(
        &self,
        addr: SocketAddr,
        request: CacheRequest,
        timeout: Duration,
    ) -> crate::Result<CacheResponse> {
        let conn = self.connection(addr).await?;
        let (tx, rx) = oneshot::channel();
        {
            let mut writer = conn.writer.lock().await;
            if conn.closed.load(Ordering::Acquire) {
                return Err(Error::ConnectionClosed);
            }
            // Enqueue before writing so the queue matches write order.
            conn.pending.lock().unwrap().push_back(tx);
            if let Err(err) = writer.send(request.into_frame()).await {
                conn.close();
                return Err(err);
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout),
        }
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
            writer: AsyncMutex::new(FramedWrite::new(write_half, CacheFrameCodec)),
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            uses: AtomicUsize::new(1),
        });
        tokio::spawn(read_loop(
            conn.clone(),
            FramedRead::new(read_half, CacheFrameCodec),
        ));
        self.conns.insert(addr, conn.clone());
        tracing::debug!(%addr, "dialed cache rpc connection");
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
                tracing::debug!(%addr, "dropping idle cache rpc connection");
                conn.close();
                return false;
            }
            true
        });
    }
}

async fn read_loop(conn: Arc<Conn>, mut reader: FramedRead<OwnedReadHalf, CacheFrameCodec>) {
    loop {
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "cache rpc connection read failed");
                break;
            }
            None => break,
        };
        let tx = conn.pending.lock().unwrap().pop_front();
        let Some(tx) = tx else {
            tracing::warn!("peer sent an unsolicited cache rpc response; closing");
            break;
        };
        match CacheResponse::from_frame(frame) {
            Ok(response) => {
                let _ = tx.send(Ok(response));
            }
            Err(err) => {
                // The stream is no longer trustworthy once one frame
                // fails to decode.
                let _ = tx.send(Err(err));
                break;
            }
        }
    }
    conn.close();
}
