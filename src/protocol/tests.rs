// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::frame::{encode_frame, split_record, Unmarshaled};
use crate::error::ProtocolError;
use crate::protocol::dispatcher::{Dispatcher, Event};
use crate::protocol::rpc::{RequestPacket, RpcServer};
use crate::transport::{MsgParse, NetContext, Session, SessionEvent};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

struct Ignore;

impl MsgParse for Ignore {
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

fn idle_session() -> Arc<Session> {
    Session::new(NetContext::default(), Arc::new(Ignore), None)
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Recorder {
    fn record(&self, entry: String) {
        self.seen.lock().unwrap().push(entry);
    }

    fn on_ping(&self, _session: &Arc<Session>, msg: u32) {
        self.record(format!("ping {msg}"));
    }

    fn entries(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn drain(dispatcher: &Dispatcher<Recorder, u32>, recorder: &Recorder) -> usize {
    dispatcher.drain(
        recorder,
        |imp, event| match event {
            Event::Open(_) => imp.record("open".into()),
            Event::Close(_) => imp.record("close".into()),
            _ => {}
        },
        |imp, _session, error| imp.record(format!("error {error}")),
    )
}

#[tokio::test]
async fn test_events_dispatch_in_order() {
    let dispatcher: Dispatcher<Recorder, u32> = Dispatcher::new(16, 100);
    dispatcher.register_message(1, Recorder::on_ping).unwrap();
    dispatcher.freeze();

    let session = idle_session();
    dispatcher.lifecycle(&session, SessionEvent::Open).await;
    dispatcher
        .push(Event::Message {
            session: session.clone(),
            id: 1,
            msg: 42,
        })
        .await;
    dispatcher
        .push(Event::Message {
            session: session.clone(),
            id: 9,
            msg: 0,
        })
        .await;
    dispatcher.lifecycle(&session, SessionEvent::Close).await;

    let recorder = Recorder::default();
    assert_eq!(drain(&dispatcher, &recorder), 4);
    assert_eq!(
        recorder.entries(),
        vec![
            "open".to_string(),
            "ping 42".to_string(),
            "error Message handler not found for message id 9".to_string(),
            "close".to_string(),
        ]
    );
    // the queue is empty now and drain returns right away
    assert_eq!(drain(&dispatcher, &recorder), 0);
}

#[tokio::test]
async fn test_drain_respects_batch_size() {
    let dispatcher: Dispatcher<Recorder, u32> = Dispatcher::new(16, 3);
    dispatcher.register_message(1, Recorder::on_ping).unwrap();
    dispatcher.freeze();

    let session = idle_session();
    for msg in 0..5 {
        dispatcher
            .push(Event::Message {
                session: session.clone(),
                id: 1,
                msg,
            })
            .await;
    }

    let recorder = Recorder::default();
    assert_eq!(drain(&dispatcher, &recorder), 3);
    assert_eq!(drain(&dispatcher, &recorder), 2);
    assert_eq!(recorder.entries().len(), 5);
}

#[test]
fn test_registration_rules() {
    let dispatcher: Dispatcher<Recorder, u32> = Dispatcher::new(4, 10);
    dispatcher.register_message(1, Recorder::on_ping).unwrap();

    let duplicate = dispatcher.register_message(1, Recorder::on_ping);
    assert!(matches!(duplicate, Err(ProtocolError::ConfigError(_))));

    dispatcher.freeze();
    assert!(dispatcher.is_frozen());
    let late = dispatcher.register_message(2, Recorder::on_ping);
    assert!(matches!(late, Err(ProtocolError::ConfigError(_))));
}

#[tokio::test]
async fn test_push_after_close_is_dropped() {
    let dispatcher: Dispatcher<Recorder, u32> = Dispatcher::new(1, 10);
    dispatcher.freeze();
    let session = idle_session();

    dispatcher.lifecycle(&session, SessionEvent::Open).await;
    dispatcher.close();
    // would wait forever on a full open queue
    dispatcher.lifecycle(&session, SessionEvent::Close).await;

    let recorder = Recorder::default();
    assert_eq!(drain(&dispatcher, &recorder), 1);
    assert_eq!(recorder.entries(), vec!["open".to_string()]);
}

#[tokio::test]
async fn test_accept_maps_unmarshal_outcomes() {
    let dispatcher: Dispatcher<Recorder, u32> = Dispatcher::new(16, 100);
    dispatcher.freeze();
    let session = idle_session();
    let buf = [0u8; 32];

    assert_eq!(dispatcher.accept(&session, &buf, Unmarshaled::Incomplete).await, 0);
    assert_eq!(dispatcher.accept(&session, &buf, Unmarshaled::Consumed(5)).await, 5);
    let message = Unmarshaled::Message {
        len: 12,
        id: 7,
        msg: 1,
    };
    assert_eq!(dispatcher.accept(&session, &buf, message).await, 12);
    let malformed = Unmarshaled::Malformed {
        len: 8,
        error: ProtocolError::InvalidFrame("bad"),
    };
    assert_eq!(dispatcher.accept(&session, &buf, malformed).await, 8);

    let violation = Unmarshaled::Violation(ProtocolError::OversizedFrame(1 << 30));
    assert_eq!(dispatcher.accept(&session, &buf, violation).await, buf.len());

    let recorder = Recorder::default();
    assert_eq!(drain(&dispatcher, &recorder), 3);
    let snapshot = session.context().metrics().snapshot();
    assert_eq!(snapshot.messages_received, 1);
    assert_eq!(snapshot.protocol_errors, 2);
}

#[test]
fn test_rpc_function_names_are_unique() {
    let mut rpc = RpcServer::new("calc");
    rpc.register("add", |(a, b): (i32, i32)| (a + b,)).unwrap();
    rpc.register("ping", |(): ()| ()).unwrap();

    let again = rpc.register("add", |(a,): (i32,)| (a,));
    assert!(matches!(again, Err(ProtocolError::ConfigError(_))));
    assert!(rpc.has_function("ping"));
    assert!(!rpc.has_function("sub"));
    assert_eq!(rpc.service_name(), "calc");
}

#[test]
fn test_request_frame_splits_and_keeps_context() {
    let mut request = RequestPacket {
        request_id: 3,
        service_name: "calc".into(),
        func_name: "add".into(),
        ..RequestPacket::default()
    };
    request.context.insert("trace".into(), "abc".into());

    let frame = encode_frame(&request);
    let mut buf = frame.to_vec();
    buf.extend_from_slice(&frame[..3]);

    match split_record::<RequestPacket>(&buf, 1 << 20) {
        Unmarshaled::Message { len, id, msg } => {
            assert_eq!(len, frame.len());
            assert_eq!(id, 0);
            assert_eq!(msg, request);
        }
        other => panic!("expected a message, got {other:?}"),
    }
}
