//! Echo strategy: every inbound chunk is written back unchanged.
//!
//! The echo happens on the session's reassembly task, so no message ever
//! reaches the event queue; only open/close events do.

use crate::error::ProtocolError;
use crate::service::{ConnectImp, ServiceImp, Unmarshaled};
use crate::transport::Session;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

fn echo(session: &Arc<Session>, data: &[u8]) -> Unmarshaled<()> {
    if let Err(e) = session.async_send(Bytes::copy_from_slice(data)) {
        warn!(session_id = session.id(), error = %e, "Echo dropped");
    }
    Unmarshaled::Consumed(data.len())
}

/// Listening side of the echo strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoService;

impl ServiceImp for EchoService {
    type Message = ();

    fn unmarshal(&self, session: &Arc<Session>, data: &[u8]) -> Unmarshaled<()> {
        echo(session, data)
    }

    fn session_open(&self, session: &Arc<Session>) {
        debug!(session_id = session.id(), peer = ?session.peer_addr(), "Echo session open");
    }

    fn session_close(&self, session: &Arc<Session>) {
        debug!(session_id = session.id(), "Echo session closed");
    }
}

/// Connecting side of the echo strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoConnect;

impl ConnectImp for EchoConnect {
    type Message = ();

    fn unmarshal(&self, session: &Arc<Session>, data: &[u8]) -> Unmarshaled<()> {
        echo(session, data)
    }

    fn handle_error(&self, session: &Arc<Session>, error: ProtocolError) {
        warn!(session_id = session.id(), error = %error, "Echo connect error");
    }
}
