//! # Connector
//!
//! Keeps one outbound [`Session`] connected to a fixed address.
//!
//! The reconnect loop dials, runs the session until it closes and then waits
//! `reconnect_interval` before dialing again. A failed dial waits the same
//! interval. With a zero interval the loop gives up after the first failure or
//! disconnect. The session object (and its id) is reused for every connection.
//!
//! [`Connector::stop`] pauses the loop without discarding its configuration,
//! [`Connector::start`] resumes it, and [`Connector::close`] ends it for good.
//! Each run of the session is cancelled by the connector's own token, so a
//! close issued between a dial and the start of the run still takes effect.

use super::session::Session;
use super::{MsgParse, NetContext};
use crate::error::{ProtocolError, Result};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub struct Connector {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    addr: String,
    session: Arc<Session>,
    open: AtomicBool,
    wake: Notify,
    cancel: CancellationToken,
    reconnect_interval: Duration,
    connect_timeout: Duration,
    ctx: NetContext,
}

impl Connector {
    /// Create a connector for `addr`. Nothing is dialed until [`start`](Self::start).
    pub fn new(
        addr: impl Into<String>,
        reconnect_interval: Duration,
        ctx: NetContext,
        parser: Arc<dyn MsgParse>,
    ) -> Self {
        let connect_timeout = ctx.config().connector.connect_timeout;
        Self {
            inner: Arc::new(Inner {
                addr: addr.into(),
                session: Session::new(ctx.clone(), parser, None),
                open: AtomicBool::new(false),
                wake: Notify::new(),
                cancel: CancellationToken::new(),
                reconnect_interval,
                connect_timeout,
                ctx,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// The session used for every connection this connector makes.
    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.session.is_closed()
    }

    /// Whether the reconnect loop is enabled.
    pub fn is_started(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Enable connecting. Spawns the reconnect loop if it is not running.
    pub fn start(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.open.store(true, Ordering::Release);
        if let Ok(mut task) = self.task.lock() {
            let running = task.as_ref().is_some_and(|t| !t.is_finished());
            if running {
                self.inner.wake.notify_one();
            } else {
                *task = Some(tokio::spawn(reconnect_loop(self.inner.clone())));
            }
        }
    }

    /// Pause connecting and drop the current connection.
    pub fn stop(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.session.close();
    }

    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        self.inner.session.send(data).await
    }

    pub fn async_send(&self, data: impl Into<Bytes>) -> Result<()> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        self.inner.session.async_send(data)
    }

    /// Disable reconnection, close the session and wait for the reconnect loop
    /// to exit. No background activity remains afterwards.
    pub async fn close(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.cancel.cancel();
        self.inner.session.close();
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(addr = %self.inner.addr, error = %e, "Reconnect task failed");
            }
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
        self.inner.session.close();
    }
}

#[instrument(skip(inner), fields(addr = %inner.addr, session_id = inner.session.id()))]
async fn reconnect_loop(inner: Arc<Inner>) {
    loop {
        while !inner.open.load(Ordering::Acquire) {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = inner.wake.notified() => {}
            }
        }

        // a stop() racing this point either cancels the new token or is seen
        // by the open check after the dial
        inner.session.rearm(&inner.cancel);
        let dial = tokio::time::timeout(inner.connect_timeout, TcpStream::connect(&inner.addr));
        let dialed = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            dialed = dial => dialed,
        };

        match dialed {
            Ok(Ok(_)) if !inner.open.load(Ordering::Acquire) => {
                debug!("Stopped while dialing");
                continue;
            }
            Ok(Ok(stream)) => {
                info!("Connected");
                inner.session.clone().run(stream).await;
                info!("Disconnected");
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Dial failed");
                inner.ctx.metrics().connection_error();
            }
            Err(_) => {
                debug!(timeout = ?inner.connect_timeout, "Dial timed out");
                inner.ctx.metrics().connection_error();
            }
        }

        if inner.reconnect_interval.is_zero() {
            debug!("Reconnect disabled, connector loop exiting");
            inner.open.store(false, Ordering::Release);
            return;
        }
        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            _ = tokio::time::sleep(inner.reconnect_interval) => {}
        }
    }
}
