use crate::core::frame::Unmarshaled;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::{Session, SessionEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

/// Message handler bound to an implementation object `I`.
///
/// Plain methods fit directly: `Self::handle_login` with signature
/// `fn(&self, &Arc<Session>, Login)`.
pub type Handler<I, M> = Box<dyn Fn(&I, &Arc<Session>, M) + Send + Sync + 'static>;

/// Something that happened on a session, queued for the scheduler task.
#[derive(Debug)]
pub enum Event<M> {
    Open(Arc<Session>),
    Close(Arc<Session>),
    Message {
        session: Arc<Session>,
        id: u32,
        msg: M,
    },
    Error {
        session: Arc<Session>,
        error: ProtocolError,
    },
}

/// Bounded event queue plus a message-id keyed handler table.
///
/// Socket tasks [`push`](Self::push) events; one scheduler task
/// [`drain`](Self::drain)s them and runs the handlers. Handlers are registered
/// before [`freeze`](Self::freeze) and the table is read-only afterwards.
pub struct Dispatcher<I, M> {
    staging: Mutex<HashMap<u32, Handler<I, M>>>,
    handlers: OnceLock<HashMap<u32, Handler<I, M>>>,
    tx: mpsc::Sender<Event<M>>,
    rx: Mutex<mpsc::Receiver<Event<M>>>,
    batch: usize,
}

impl<I, M> Dispatcher<I, M> {
    pub fn new(queue_len: usize, batch: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_len);
        Self {
            staging: Mutex::new(HashMap::new()),
            handlers: OnceLock::new(),
            tx,
            rx: Mutex::new(rx),
            batch,
        }
    }

    /// Bind `handler` to message id `id`.
    ///
    /// Fails once the table is frozen or if `id` already has a handler.
    pub fn register_message<F>(&self, id: u32, handler: F) -> Result<()>
    where
        F: Fn(&I, &Arc<Session>, M) + Send + Sync + 'static,
    {
        if self.is_frozen() {
            return Err(ProtocolError::ConfigError(
                constants::ERR_HANDLERS_FROZEN.to_string(),
            ));
        }
        let mut staging = self
            .staging
            .lock()
            .map_err(|_| ProtocolError::ConfigError(constants::ERR_LOCK_POISONED.to_string()))?;
        if staging.contains_key(&id) {
            return Err(ProtocolError::ConfigError(format!(
                "{}: {id}",
                constants::ERR_HANDLER_EXISTS
            )));
        }
        staging.insert(id, Box::new(handler));
        Ok(())
    }

    /// Make the handler table immutable. Later calls are no-ops.
    pub fn freeze(&self) {
        let table = self
            .staging
            .lock()
            .map(|mut staging| std::mem::take(&mut *staging))
            .unwrap_or_default();
        let _ = self.handlers.set(table);
    }

    pub fn is_frozen(&self) -> bool {
        self.handlers.get().is_some()
    }

    /// Queue an event, waiting while the queue is full.
    ///
    /// Events pushed after [`close`](Self::close) are dropped.
    pub async fn push(&self, event: Event<M>) {
        let _ = self.tx.send(event).await;
    }

    /// Queue the outcome of unmarshaling the front of `buf` and return how many
    /// bytes the session should consume.
    pub async fn accept(
        &self,
        session: &Arc<Session>,
        buf: &[u8],
        outcome: Unmarshaled<M>,
    ) -> usize {
        let metrics = session.context().metrics();
        let session = session.clone();
        match outcome {
            Unmarshaled::Incomplete => 0,
            Unmarshaled::Consumed(n) => n,
            Unmarshaled::Message { len, id, msg } => {
                metrics.message_received();
                self.push(Event::Message { session, id, msg }).await;
                len
            }
            Unmarshaled::Malformed { len, error } => {
                metrics.protocol_error();
                self.push(Event::Error { session, error }).await;
                len
            }
            Unmarshaled::Violation(error) => {
                metrics.protocol_error();
                debug!(session_id = session.id(), error = %error, "Framing violation");
                session.close();
                self.push(Event::Error { session, error }).await;
                buf.len()
            }
        }
    }

    /// Queue a session lifecycle event.
    pub async fn lifecycle(&self, session: &Arc<Session>, event: SessionEvent) {
        let session = session.clone();
        let event = match event {
            SessionEvent::Open => Event::Open(session),
            SessionEvent::Close => Event::Close(session),
        };
        self.push(event).await;
    }

    /// Handle up to one batch of queued events without waiting.
    ///
    /// `lifecycle` receives open/close events; message and error events go to
    /// the handler table and `on_error`. Returns the number of events handled.
    pub fn drain<L, E>(&self, imp: &I, mut lifecycle: L, mut on_error: E) -> usize
    where
        L: FnMut(&I, Event<M>),
        E: FnMut(&I, &Arc<Session>, ProtocolError),
    {
        let Ok(mut rx) = self.rx.lock() else {
            return 0;
        };
        let handlers = self.handlers.get();
        let mut handled = 0;
        while handled < self.batch {
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            handled += 1;
            match event {
                Event::Message { session, id, msg } => {
                    match handlers.and_then(|table| table.get(&id)) {
                        Some(handler) => handler(imp, &session, msg),
                        None => on_error(imp, &session, ProtocolError::HandlerNotFound(id)),
                    }
                }
                Event::Error { session, error } => on_error(imp, &session, error),
                lifecycle_event => lifecycle(imp, lifecycle_event),
            }
        }
        handled
    }

    /// Stop accepting events; blocked and future pushes return immediately.
    pub fn close(&self) {
        if let Ok(mut rx) = self.rx.lock() {
            rx.close();
        }
    }
}
