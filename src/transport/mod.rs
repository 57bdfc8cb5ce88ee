//! # Transport Layer
//!
//! TCP sessions and the components that own them.
//!
//! ## Components
//! - **Session**: one connection with concurrent receive, reassembly and send tasks
//! - **Listener**: accepts inbound connections and tracks their sessions by id
//! - **Connector**: keeps one outbound session alive with optional reconnection
//!
//! Framing is delegated to a [`MsgParse`] strategy. Shared state (session-id
//! generator, buffer pool, metrics, configuration) travels in an explicitly
//! constructed [`NetContext`].

pub mod connector;
pub mod listener;
pub mod session;

pub use connector::Connector;
pub use listener::Listener;
pub use session::Session;

use crate::config::NetworkConfig;
use crate::utils::{BufferPool, Metrics};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Idle read buffers kept per context
const POOLED_BUFFERS: usize = 256;

/// Lifecycle notifications delivered to a [`MsgParse`] strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection is up; delivered before the first parse.
    Open,
    /// The connection is gone; delivered after the last parse.
    Close,
}

/// Message strategy a [`Session`] delegates framing and dispatch to.
///
/// `parse_msg` receives every unconsumed inbound byte and returns how many of
/// them it used: `0` waits for more data, any value `>= buf.len()` consumes the
/// whole buffer, and anything in between keeps the remainder and parses again
/// right away.
pub trait MsgParse: Send + Sync + 'static {
    fn parse_msg<'a>(&'a self, session: &'a Arc<Session>, buf: &'a [u8]) -> BoxFuture<'a, usize>;

    fn session_event<'a>(
        &'a self,
        session: &'a Arc<Session>,
        event: SessionEvent,
    ) -> BoxFuture<'a, ()>;
}

/// Shared state for every session created by one application.
#[derive(Clone, Debug)]
pub struct NetContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    next_id: AtomicU64,
    pool: BufferPool,
    metrics: Metrics,
    config: NetworkConfig,
}

impl NetContext {
    pub fn new(config: NetworkConfig) -> Self {
        let pool = BufferPool::new(POOLED_BUFFERS, config.session.max_read_buffer);
        Self {
            inner: Arc::new(ContextInner {
                next_id: AtomicU64::new(1),
                pool,
                metrics: Metrics::new(),
                config,
            }),
        }
    }

    /// Allocate a session id. Ids start at 1 and are never reused.
    pub fn next_session_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.inner.pool
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }
}

impl Default for NetContext {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}
