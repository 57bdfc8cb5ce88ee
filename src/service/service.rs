use super::{Component, Dispatcher, ServiceImp};
use crate::error::Result;
use crate::protocol::dispatcher::Event;
use crate::transport::{Listener, MsgParse, NetContext, Session, SessionEvent};
use futures::future::{BoxFuture, FutureExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// A listening endpoint whose sessions feed one event queue.
pub struct Service<I: ServiceImp> {
    name: String,
    core: Arc<Core<I>>,
    listener: Arc<Listener>,
}

pub(crate) struct Core<I: ServiceImp> {
    pub(crate) imp: Arc<I>,
    pub(crate) dispatcher: Dispatcher<I, I::Message>,
}

impl<I: ServiceImp> Service<I> {
    /// Bind `addr`; connections are accepted right away and their events wait
    /// in the queue until the scheduler starts draining it.
    pub async fn bind(name: impl Into<String>, addr: &str, imp: I, ctx: NetContext) -> Result<Self> {
        let name = name.into();
        let config = &ctx.config().service;
        let core = Arc::new(Core {
            imp: Arc::new(imp),
            dispatcher: Dispatcher::new(config.queue_len, config.batch_size),
        });
        let listener = Listener::bind(addr, ctx.clone(), core.clone()).await?;
        info!(service = %name, address = %listener.local_addr(), "Service bound");
        Ok(Self {
            name,
            core,
            listener,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn imp(&self) -> &Arc<I> {
        &self.core.imp
    }

    pub fn listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Bind `handler` to message id `id`. Only allowed before the server starts.
    pub fn register_message<F>(&self, id: u32, handler: F) -> Result<()>
    where
        F: Fn(&I, &Arc<Session>, I::Message) + Send + Sync + 'static,
    {
        self.core.dispatcher.register_message(id, handler)
    }

    /// Handle up to one batch of queued events, then run the `on_loop` hook.
    pub fn run_loop(&self) -> usize {
        let imp = &*self.core.imp;
        let handled = self.core.dispatcher.drain(
            imp,
            |imp, event| match event {
                Event::Open(session) => imp.session_open(&session),
                Event::Close(session) => imp.session_close(&session),
                _ => {}
            },
            |imp, session, error| imp.handle_error(session, error),
        );
        imp.on_loop();
        handled
    }
}

impl<I: ServiceImp> MsgParse for Core<I> {
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

impl<I: ServiceImp> Component for Service<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<()> {
        self.core.imp.init()
    }

    fn register(&self) -> Result<()> {
        self.core.imp.register_messages(&self.core.dispatcher)
    }

    fn activate(&self) {
        self.core.dispatcher.freeze();
    }

    fn tick(&self) {
        self.run_loop();
    }

    fn destroy(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.core.imp.destroy();
            self.core.dispatcher.close();
            self.listener.close().await;
            info!(service = %self.name, "Service destroyed");
        })
    }
}
