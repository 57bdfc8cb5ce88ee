//! Helpers shared by the integration tests

#![allow(dead_code, clippy::unwrap_used)]

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use stnet::core::frame::{split_record, Unmarshaled};
use stnet::sdp_record;
use stnet::transport::{MsgParse, Session, SessionEvent};

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Ping {
        pub kind: u32,
        pub seq: u64,
        pub body: String,
    }
}

pub fn ping(kind: u32, seq: u64, body: &str) -> Ping {
    Ping {
        kind,
        seq,
        body: body.to_string(),
    }
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Message strategy that records framed `Ping`s and lifecycle events.
#[derive(Default)]
pub struct Collector {
    frames: Mutex<Vec<Ping>>,
    events: Mutex<Vec<SessionEvent>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<Ping> {
        self.frames.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: SessionEvent) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }
}

impl MsgParse for Collector {
    fn parse_msg<'a>(&'a self, session: &'a Arc<Session>, buf: &'a [u8]) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            match split_record::<Ping>(buf, 1 << 20) {
                Unmarshaled::Incomplete => 0,
                Unmarshaled::Consumed(n) => n,
                Unmarshaled::Message { len, msg, .. } => {
                    self.frames.lock().unwrap().push(msg);
                    len
                }
                Unmarshaled::Malformed { len, .. } => len,
                Unmarshaled::Violation(_) => {
                    session.close();
                    buf.len()
                }
            }
        })
    }

    fn session_event<'a>(
        &'a self,
        _session: &'a Arc<Session>,
        event: SessionEvent,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.events.lock().unwrap().push(event);
        })
    }
}
