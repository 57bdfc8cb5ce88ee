//! # Services and Scheduling
//!
//! Services (one listener each) and Connects (one connector each) decouple
//! socket I/O from application callbacks: session tasks only unmarshal bytes
//! and queue events, and the [`Server`] scheduler drains those queues on one
//! task per shard key, so callbacks of components sharing a key never run
//! concurrently.
//!
//! Applications plug in through the traits below:
//! - [`ServiceImp`] for listening services
//! - [`ConnectImp`] for outbound connections
//! - [`NullServiceImp`] for socket-less periodic work

pub mod connect;
pub mod null;
pub mod server;
#[allow(clippy::module_inception)]
pub mod service;

pub use crate::core::frame::Unmarshaled;
pub use crate::protocol::dispatcher::{Dispatcher, Handler};
pub use connect::Connect;
pub use null::NullService;
pub use server::Server;
pub use service::Service;

use crate::error::{ProtocolError, Result};
use crate::transport::Session;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::warn;

/// Application side of a listening [`Service`].
pub trait ServiceImp: Send + Sync + Sized + 'static {
    type Message: Send + 'static;

    /// Called once by [`Server::start`]; an error aborts the start.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Called every scheduler tick after the event queue was drained.
    fn on_loop(&self) {}

    /// Called once by [`Server::stop`].
    fn destroy(&self) {}

    /// Register message handlers; runs during [`Server::start`].
    fn register_messages(&self, handlers: &Dispatcher<Self, Self::Message>) -> Result<()> {
        let _ = handlers;
        Ok(())
    }

    /// Cut the next message off `data`. Runs on the session's reassembly task.
    fn unmarshal(&self, session: &Arc<Session>, data: &[u8]) -> Unmarshaled<Self::Message>;

    fn session_open(&self, _session: &Arc<Session>) {}

    fn session_close(&self, _session: &Arc<Session>) {}

    fn handle_error(&self, session: &Arc<Session>, error: ProtocolError) {
        warn!(session_id = session.id(), error = %error, "Service error");
    }
}

/// Application side of an outbound [`Connect`].
pub trait ConnectImp: Send + Sync + Sized + 'static {
    type Message: Send + 'static;

    fn register_messages(&self, handlers: &Dispatcher<Self, Self::Message>) -> Result<()> {
        let _ = handlers;
        Ok(())
    }

    fn unmarshal(&self, session: &Arc<Session>, data: &[u8]) -> Unmarshaled<Self::Message>;

    fn connected(&self, _session: &Arc<Session>) {}

    fn disconnected(&self, _session: &Arc<Session>) {}

    fn handle_error(&self, session: &Arc<Session>, error: ProtocolError) {
        warn!(session_id = session.id(), error = %error, "Connect error");
    }
}

/// Periodic work driven by the scheduler without any socket.
pub trait NullServiceImp: Send + Sync + 'static {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn on_loop(&self);

    fn destroy(&self) {}
}

/// A unit the scheduler drives on its shard task.
pub(crate) trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self) -> Result<()>;

    /// Register message handlers. Nothing is frozen or started yet.
    fn register(&self) -> Result<()>;

    /// Freeze the handler tables and start connecting.
    fn activate(&self);

    /// One drain pass. Never blocks on I/O.
    fn tick(&self);

    fn destroy(&self) -> BoxFuture<'_, ()>;
}
