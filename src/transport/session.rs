//! # Session
//!
//! One TCP connection driven by three cooperating tasks:
//!
//! ```text
//! socket ──read──▶ receive ──chunks──▶ reassembly ──parse_msg──▶ strategy
//! socket ◀─write── send ◀──queue── send()/async_send()
//! ```
//!
//! The receive loop reads into pooled buffers whose size adapts to the traffic
//! and forwards each read unsplit. The reassembly task keeps the unparsed
//! remainder and calls the [`MsgParse`] strategy. The send task writes queued
//! messages in submission order.
//!
//! ## Shutdown
//! A read error, write error, framing violation or [`Session::close`] cancels
//! the session: unparsed input and unsent messages are dropped. A clean EOF
//! from the peer does not cancel it. Reassembly then parses every byte already
//! received and the send task drains its queue before the socket is shut down,
//! so replies to a half-closed peer still go out.
//!
//! Either way [`SessionEvent::Close`] is delivered after the last parse and the
//! owner's on-close callback fires exactly once per run. A session closed
//! before [`run`](Session::run) starts never opens; its callback still fires.
//!
//! A session belonging to a [`Connector`](super::Connector) is run again on
//! every reconnect and keeps its id. The connector re-arms it with a fresh
//! cancellation token before each dial.

use super::{MsgParse, NetContext, SessionEvent};
use crate::error::{ProtocolError, Result};
use crate::utils::PooledBuffer;
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Called once per run after the pipeline has fully stopped, with the read
/// error that ended it (if any).
pub type OnClose = Box<dyn Fn(&Arc<Session>, Option<io::Error>) + Send + Sync>;

pub struct Session {
    id: u64,
    ctx: NetContext,
    parser: Arc<dyn MsgParse>,
    closed: AtomicBool,
    writer: Mutex<Option<mpsc::Sender<Bytes>>>,
    cancel: Mutex<CancellationToken>,
    running: watch::Sender<bool>,
    peer: Mutex<Option<SocketAddr>>,
    on_close: Option<OnClose>,
}

impl Session {
    pub(crate) fn new(
        ctx: NetContext,
        parser: Arc<dyn MsgParse>,
        on_close: Option<OnClose>,
    ) -> Arc<Self> {
        let (running, _) = watch::channel(false);
        Arc::new(Self {
            id: ctx.next_session_id(),
            ctx,
            parser,
            closed: AtomicBool::new(true),
            writer: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            running,
            peer: Mutex::new(None),
            on_close,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &NetContext {
        &self.ctx
    }

    /// Address of the remote end of the current (or last) connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer.lock().ok().and_then(|peer| *peer)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue `data` for sending, waiting up to the configured send timeout for
    /// queue space.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let writer = self.writer()?;
        let timeout = self.ctx.config().session.send_timeout;
        match writer.send_timeout(data.into(), timeout).await {
            Ok(()) => {
                self.ctx.metrics().message_sent();
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.ctx.metrics().send_timeout();
                Err(ProtocolError::SendTimeout(timeout))
            }
            Err(SendTimeoutError::Closed(_)) => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Queue `data` for sending without waiting; fails if the queue is full.
    pub fn async_send(&self, data: impl Into<Bytes>) -> Result<()> {
        let writer = self.writer()?;
        match writer.try_send(data.into()) {
            Ok(()) => {
                self.ctx.metrics().message_sent();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.ctx.metrics().send_queue_full();
                Err(ProtocolError::SendQueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Start closing the session. Idempotent and non-blocking.
    ///
    /// Also applies to a run that has not started yet.
    pub fn close(&self) {
        if let Ok(cancel) = self.cancel.lock() {
            cancel.cancel();
        }
    }

    /// Close the session and wait until its pipeline has stopped and the
    /// on-close callback has run.
    pub async fn shutdown(&self) {
        self.close();
        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !running).await;
    }

    /// Install a fresh cancellation token for the next run, tied to `parent`.
    pub(crate) fn rearm(&self, parent: &CancellationToken) {
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = parent.child_token();
        }
    }

    fn current_token(&self) -> Option<CancellationToken> {
        self.cancel.lock().ok().map(|token| token.clone())
    }

    fn writer(&self) -> Result<mpsc::Sender<Bytes>> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.writer
            .lock()
            .ok()
            .and_then(|writer| writer.clone())
            .ok_or(ProtocolError::ConnectionClosed)
    }

    /// Drive the session over `stream` until it closes.
    #[instrument(skip(self, stream), fields(session_id = self.id))]
    pub(crate) async fn run(self: Arc<Self>, stream: TcpStream) {
        let config = self.ctx.config().session.clone();
        let peer = stream.peer_addr().ok();
        let _ = stream.set_nodelay(true);

        let cancel = match self.current_token() {
            Some(token) if !token.is_cancelled() => token,
            _ => {
                debug!(peer = ?peer, "Session closed before it started");
                if let Some(on_close) = &self.on_close {
                    on_close(&self, None);
                }
                return;
            }
        };
        let (write_tx, write_rx) = mpsc::channel(config.send_queue);
        let (chunk_tx, chunk_rx) = mpsc::channel::<PooledBuffer>(config.recv_queue);
        if let Ok(mut slot) = self.writer.lock() {
            *slot = Some(write_tx);
        }
        if let Ok(mut slot) = self.peer.lock() {
            *slot = peer;
        }
        self.running.send_replace(true);
        self.closed.store(false, Ordering::Release);
        self.ctx.metrics().session_opened();
        debug!(peer = ?peer, "Session opened");

        self.parser.session_event(&self, SessionEvent::Open).await;

        let (mut reader, writer) = stream.into_split();
        let sender = tokio::spawn(send_loop(writer, write_rx, cancel.clone(), self.ctx.clone()));
        let reassembler = tokio::spawn(self.clone().reassemble(chunk_rx, cancel.clone()));

        let pool = self.ctx.pool().clone();
        let mut size = config.read_buffer;
        let error = loop {
            let mut buf = pool.acquire(size);
            let n = tokio::select! {
                _ = cancel.cancelled() => break None,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break None,
                    Ok(n) => n,
                    Err(e) => break Some(e),
                },
            };
            self.ctx.metrics().bytes_read(n);
            size = next_read_size(size, n, config.read_buffer, config.max_read_buffer);

            buf.truncate(n);
            tokio::select! {
                _ = cancel.cancelled() => break None,
                sent = chunk_tx.send(buf) => if sent.is_err() {
                    break None;
                },
            }
        };

        match &error {
            Some(e) => {
                self.ctx.metrics().connection_error();
                debug!(error = %e, "Session read failed");
            }
            None => debug!("Session read loop finished"),
        }

        drop(chunk_tx);
        if let Err(e) = reassembler.await {
            warn!(error = %e, "Reassembly task failed");
        }
        self.closed.store(true, Ordering::Release);
        self.parser.session_event(&self, SessionEvent::Close).await;

        // dropping the last sender lets the send task drain and exit
        if let Ok(mut slot) = self.writer.lock() {
            slot.take();
        }
        if let Err(e) = sender.await {
            warn!(error = %e, "Send task failed");
        }
        cancel.cancel();

        self.ctx.metrics().session_closed();
        if let Some(on_close) = &self.on_close {
            on_close(&self, error);
        }
        self.running.send_replace(false);
        debug!("Session closed");
    }

    async fn reassemble(
        self: Arc<Self>,
        mut chunks: mpsc::Receiver<PooledBuffer>,
        cancel: CancellationToken,
    ) {
        let max_pending = self.ctx.config().session.max_pending_bytes;
        let mut pending = BytesMut::new();

        while let Some(chunk) = chunks.recv().await {
            if cancel.is_cancelled() {
                break;
            }
            if pending.is_empty() {
                // fast path: parse straight out of the pooled buffer
                let used = self.parse_all(&chunk, &cancel).await;
                if used < chunk.len() {
                    pending.extend_from_slice(&chunk[used..]);
                }
            } else {
                pending.extend_from_slice(&chunk);
                drop(chunk);
                let used = self.parse_all(&pending, &cancel).await;
                pending.advance(used);
            }

            if pending.len() > max_pending {
                warn!(
                    session_id = self.id,
                    pending = pending.len(),
                    "Unparsed data exceeds limit, closing session"
                );
                self.ctx.metrics().protocol_error();
                cancel.cancel();
                break;
            }
        }
    }

    /// Feed `buf` to the strategy until it asks for more data. Returns the
    /// number of bytes consumed.
    async fn parse_all(self: &Arc<Self>, buf: &[u8], cancel: &CancellationToken) -> usize {
        let mut offset = 0;
        while offset < buf.len() {
            let used = self.parser.parse_msg(self, &buf[offset..]).await;
            if used == 0 {
                break;
            }
            offset += used.min(buf.len() - offset);
            if cancel.is_cancelled() {
                // closed mid-buffer; the rest is never parsed
                return buf.len();
            }
        }
        offset
    }
}

async fn send_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    ctx: NetContext,
) {
    loop {
        let data = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            data = queue.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            written = writer.write_all(&data) => written,
        };
        if let Err(e) = written {
            debug!(error = %e, "Session write failed");
            ctx.metrics().connection_error();
            cancel.cancel();
            break;
        }
        ctx.metrics().bytes_written(data.len());
    }
    let _ = writer.shutdown().await;
}

/// Grow the read buffer after a read that filled it, shrink it after one that
/// used less than half. Stays within `min..=max`.
fn next_read_size(size: usize, read: usize, min: usize, max: usize) -> usize {
    if read == size && size < max {
        (size * 2).min(max)
    } else if read < size / 2 && size > min {
        (size / 2).max(min)
    } else {
        size
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer_addr())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct Discard;

    impl MsgParse for Discard {
        fn parse_msg<'a>(&'a self, _session: &'a Arc<Session>, buf: &'a [u8]) -> BoxFuture<'a, usize> {
            Box::pin(async move { buf.len() })
        }

        fn session_event<'a>(
            &'a self,
            _session: &'a Arc<Session>,
            _event: SessionEvent,
        ) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }
    }

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    #[test]
    fn test_read_size_adapts_within_bounds() {
        // full reads double up to the cap
        assert_eq!(next_read_size(1024, 1024, 1024, 4096), 2048);
        assert_eq!(next_read_size(2048, 2048, 1024, 4096), 4096);
        assert_eq!(next_read_size(4096, 4096, 1024, 4096), 4096);
        // sparse reads halve down to the floor
        assert_eq!(next_read_size(4096, 100, 1024, 4096), 2048);
        assert_eq!(next_read_size(2048, 100, 1024, 4096), 1024);
        assert_eq!(next_read_size(1024, 1, 1024, 4096), 1024);
        // anything in between keeps the size
        assert_eq!(next_read_size(2048, 1500, 1024, 4096), 2048);
    }

    #[tokio::test]
    async fn test_close_before_run_is_not_lost() {
        let (server, mut client) = socket_pair().await;
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = closes.clone();
        let on_close: OnClose = Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let session = Session::new(NetContext::default(), Arc::new(Discard), Some(on_close));

        session.close();
        let run = tokio::spawn(session.clone().run(server));
        tokio::time::timeout(Duration::from_millis(500), run)
            .await
            .unwrap()
            .unwrap();

        assert!(session.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.context().metrics().snapshot().sessions_total, 0);

        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rearmed_session_runs_again() {
        let parent = CancellationToken::new();
        let session = Session::new(NetContext::default(), Arc::new(Discard), None);

        session.close();
        session.rearm(&parent);
        let (server, _client) = socket_pair().await;
        let run = tokio::spawn(session.clone().run(server));
        let started = tokio::time::timeout(Duration::from_millis(500), async {
            while session.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(started.is_ok());

        // cancelling the parent stops the run
        parent.cancel();
        tokio::time::timeout(Duration::from_millis(500), run)
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_closed());
    }
}
