//! # Listener
//!
//! Accepts inbound TCP connections and runs one [`Session`] per connection.
//!
//! Sessions are tracked by id in a read/write-locked map. A session is
//! registered (and its task spawned) while the write lock is held, and removes
//! itself from its on-close callback.
//!
//! ## Shutdown
//! [`Listener::close`] stops accepting, closes every tracked session and waits
//! until each one has finished its shutdown sequence. A session closed before
//! its task got to run never opens and exits right away.

use super::session::{OnClose, Session};
use super::{MsgParse, NetContext};
use crate::error::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

type SessionMap = RwLock<HashMap<u64, Arc<Session>>>;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct Listener {
    local_addr: SocketAddr,
    sessions: Arc<SessionMap>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Listener {
    /// Bind `addr` and start accepting connections handled by `parser`.
    #[instrument(skip(addr, ctx, parser))]
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        ctx: NetContext,
        parser: Arc<dyn MsgParse>,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "Listening");

        let sessions: Arc<SessionMap> = Arc::new(RwLock::new(HashMap::new()));
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::downgrade(&sessions),
            tracker.clone(),
            cancel.clone(),
            ctx,
            parser,
        ));

        Ok(Arc::new(Self {
            local_addr,
            sessions,
            tracker,
            cancel,
            accept_task: Mutex::new(Some(accept_task)),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Look up a live session by id.
    pub fn session(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.read().ok()?.get(&id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Call `f` for each tracked session under the read lock, stopping early
    /// when it returns `false`.
    ///
    /// `f` must not close the listener.
    pub fn iterate_sessions<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Session>) -> bool,
    {
        if let Ok(sessions) = self.sessions.read() {
            for session in sessions.values() {
                if !f(session) {
                    break;
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting, close every session and wait for all of them to finish.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        let accept_task = self.accept_task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = accept_task {
            if let Err(e) = task.await {
                warn!(error = %e, "Accept task failed");
            }
        }

        self.iterate_sessions(|session| {
            session.close();
            true
        });
        self.tracker.close();
        self.tracker.wait().await;
        info!(address = %self.local_addr, "Listener closed");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    sessions: Weak<SessionMap>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    ctx: NetContext,
    parser: Arc<dyn MsgParse>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                    ctx.metrics().connection_error();
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let Some(map) = sessions.upgrade() else {
            break;
        };
        let on_close: OnClose = {
            let sessions = sessions.clone();
            Box::new(move |session, error| {
                if let Some(map) = sessions.upgrade() {
                    if let Ok(mut map) = map.write() {
                        map.remove(&session.id());
                    };
                }
                debug!(session_id = session.id(), error = ?error, "Session removed");
            })
        };
        let session = Session::new(ctx.clone(), parser.clone(), Some(on_close));
        debug!(session_id = session.id(), peer = %peer, "Accepted connection");

        match map.write() {
            Ok(mut map) => {
                map.insert(session.id(), session.clone());
                tracker.spawn(session.run(stream));
            }
            Err(_) => {
                error!("Session map poisoned, dropping connection");
            }
        };
    }
    debug!("Accept loop finished");
}
