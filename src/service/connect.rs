use super::{Component, ConnectImp, Dispatcher};
use crate::error::Result;
use crate::protocol::dispatcher::Event;
use crate::transport::{Connector, MsgParse, NetContext, Session, SessionEvent};
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// An outbound connection whose session feeds one event queue.
///
/// The connector only starts dialing once the server starts (unless created
/// with `add_connect_no_start`, which leaves it to [`Connect::start`]).
pub struct Connect<I: ConnectImp> {
    name: String,
    core: Arc<Core<I>>,
    connector: Connector,
    autostart: AtomicBool,
}

struct Core<I: ConnectImp> {
    imp: Arc<I>,
    dispatcher: Dispatcher<I, I::Message>,
}

impl<I: ConnectImp> Connect<I> {
    pub fn new(
        name: impl Into<String>,
        addr: impl Into<String>,
        reconnect_interval: Duration,
        imp: I,
        ctx: NetContext,
        autostart: bool,
    ) -> Self {
        let config = &ctx.config().service;
        let core = Arc::new(Core {
            imp: Arc::new(imp),
            dispatcher: Dispatcher::new(config.queue_len, config.batch_size),
        });
        let connector = Connector::new(addr, reconnect_interval, ctx.clone(), core.clone());
        Self {
            name: name.into(),
            core,
            connector,
            autostart: AtomicBool::new(autostart),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn imp(&self) -> &Arc<I> {
        &self.core.imp
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn session(&self) -> &Arc<Session> {
        self.connector.session()
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    pub fn start(&self) {
        self.connector.start();
    }

    pub fn stop(&self) {
        self.connector.stop();
    }

    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.connector.send(data).await
    }

    pub fn async_send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.connector.async_send(data)
    }

    /// Bind `handler` to message id `id`. Only allowed before the server starts.
    pub fn register_message<F>(&self, id: u32, handler: F) -> Result<()>
    where
        F: Fn(&I, &Arc<Session>, I::Message) + Send + Sync + 'static,
    {
        self.core.dispatcher.register_message(id, handler)
    }

    /// Handle up to one batch of queued events.
    pub fn run_loop(&self) -> usize {
        self.core.dispatcher.drain(
            &*self.core.imp,
            |imp, event| match event {
                Event::Open(session) => imp.connected(&session),
                Event::Close(session) => imp.disconnected(&session),
                _ => {}
            },
            |imp, session, error| imp.handle_error(session, error),
        )
    }
}

impl<I: ConnectImp> MsgParse for Core<I> {
    fn parse_msg<'a>(&'a self, session: &'a Arc<Session>, buf: &'a [u8]) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            let outcome = self.imp.unmarshal(session, buf);
            self.dispatcher.accept(session, buf, outcome).await
        })
    }

    fn session_event<'a>(
        &'a self,
        session: &'a Arc<Session>,
        event: SessionEvent,
    ) -> BoxFuture<'a, ()> {
        self.dispatcher.lifecycle(session, event).boxed()
    }
}

impl<I: ConnectImp> Component for Connect<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn register(&self) -> Result<()> {
        self.core.imp.register_messages(&self.core.dispatcher)
    }

    fn activate(&self) {
        self.core.dispatcher.freeze();
        if self.autostart.load(Ordering::Acquire) {
            self.connector.start();
        }
    }

    fn tick(&self) {
        self.run_loop();
    }

    fn destroy(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.autostart.store(false, Ordering::Release);
            self.core.dispatcher.close();
            self.connector.close().await;
            info!(connect = %self.name, "Connect destroyed");
        })
    }
}
