use super::{Component, Connect, ConnectImp, NullService, NullServiceImp, Service, ServiceImp};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::rpc::{RpcClient, RpcServer};
use crate::transport::NetContext;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument};

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;
/// Handler registration failed part-way; only `stop` is useful now.
const STATE_FAILED: u8 = 3;

type Shards = BTreeMap<i32, Vec<Arc<dyn Component>>>;

/// Scheduler owning every service, connect and null service of a process.
///
/// Components are grouped by a caller-chosen shard key. [`start`](Self::start)
/// spawns one task per key; that task ticks each of its components in turn and
/// sleeps for `tick` between passes, so callbacks of components sharing a key
/// never run concurrently while different keys proceed in parallel.
///
/// Components can only be added before `start`.
pub struct Server {
    name: String,
    tick: Duration,
    ctx: NetContext,
    shards: Mutex<Shards>,
    state: AtomicU8,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    pub fn new(name: impl Into<String>, tick: Duration, ctx: NetContext) -> Self {
        Self {
            name: name.into(),
            tick,
            ctx,
            shards: Mutex::new(BTreeMap::new()),
            state: AtomicU8::new(STATE_IDLE),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Create a server whose tick comes from the context's scheduler config.
    pub fn with_context(name: impl Into<String>, ctx: NetContext) -> Self {
        let tick = ctx.config().scheduler.tick;
        Self::new(name, tick, ctx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &NetContext {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    /// Number of distinct shard keys, i.e. scheduler tasks once started.
    pub fn shard_count(&self) -> usize {
        self.shards.lock().map(|shards| shards.len()).unwrap_or(0)
    }

    /// Bind a listening service. Connections are accepted immediately; their
    /// events are handled once the server starts.
    pub async fn add_service<I: ServiceImp>(
        &self,
        name: impl Into<String>,
        addr: &str,
        imp: I,
        shard: i32,
    ) -> Result<Arc<Service<I>>> {
        self.ensure_idle()?;
        let service = Arc::new(Service::bind(name, addr, imp, self.ctx.clone()).await?);
        let component: Arc<dyn Component> = service.clone();
        self.insert(shard, vec![component])?;
        Ok(service)
    }

    /// Add an outbound connection that starts dialing when the server starts.
    pub fn add_connect<I: ConnectImp>(
        &self,
        name: impl Into<String>,
        addr: impl Into<String>,
        reconnect_interval: Duration,
        imp: I,
        shard: i32,
    ) -> Result<Arc<Connect<I>>> {
        self.connect(name, addr, reconnect_interval, imp, shard, true)
    }

    /// Add an outbound connection that only dials after [`Connect::start`].
    pub fn add_connect_no_start<I: ConnectImp>(
        &self,
        name: impl Into<String>,
        addr: impl Into<String>,
        reconnect_interval: Duration,
        imp: I,
        shard: i32,
    ) -> Result<Arc<Connect<I>>> {
        self.connect(name, addr, reconnect_interval, imp, shard, false)
    }

    fn connect<I: ConnectImp>(
        &self,
        name: impl Into<String>,
        addr: impl Into<String>,
        reconnect_interval: Duration,
        imp: I,
        shard: i32,
        autostart: bool,
    ) -> Result<Arc<Connect<I>>> {
        self.ensure_idle()?;
        let connect = Arc::new(Connect::new(
            name,
            addr,
            reconnect_interval,
            imp,
            self.ctx.clone(),
            autostart,
        ));
        let component: Arc<dyn Component> = connect.clone();
        self.insert(shard, vec![component])?;
        Ok(connect)
    }

    /// Add a socket-less component whose hooks run on the shard's task.
    pub fn add_null_service<I: NullServiceImp>(
        &self,
        name: impl Into<String>,
        imp: Arc<I>,
        shard: i32,
    ) -> Result<Arc<NullService<I>>> {
        let service = Arc::new(NullService::new(name, imp));
        let component: Arc<dyn Component> = service.clone();
        self.insert(shard, vec![component])?;
        Ok(service)
    }

    /// Bind an RPC endpoint named after `rpc`'s service name.
    pub async fn add_rpc_service(
        &self,
        addr: &str,
        rpc: RpcServer,
        shard: i32,
    ) -> Result<Arc<Service<RpcServer>>> {
        let name = rpc.service_name().to_string();
        self.add_service(name, addr, rpc, shard).await
    }

    /// Add an RPC client calling `service_name` at `addr`.
    ///
    /// The client's connection and its timeout sweep share `shard`, so replies
    /// and expirations never race.
    pub fn add_rpc_client(
        &self,
        name: impl Into<String>,
        service_name: impl Into<String>,
        addr: impl Into<String>,
        shard: i32,
    ) -> Result<Arc<RpcClient>> {
        self.ensure_idle()?;
        let name = name.into();
        let client = Arc::new(RpcClient::new(
            name.clone(),
            service_name,
            addr,
            self.ctx.clone(),
        ));
        let connect: Arc<dyn Component> = client.connect().clone();
        let sweep: Arc<dyn Component> = Arc::new(NullService::new(
            format!("{name}.sweep"),
            client.pending().clone(),
        ));
        self.insert(shard, vec![connect, sweep])?;
        Ok(client)
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_IDLE => Ok(()),
            STATE_RUNNING => Err(ProtocolError::ConfigError(
                constants::ERR_ALREADY_STARTED.to_string(),
            )),
            STATE_FAILED => Err(ProtocolError::ConfigError(
                constants::ERR_START_FAILED.to_string(),
            )),
            _ => Err(ProtocolError::ConfigError(
                constants::ERR_SERVER_STOPPED.to_string(),
            )),
        }
    }

    fn lock_shards(&self) -> Result<std::sync::MutexGuard<'_, Shards>> {
        self.shards
            .lock()
            .map_err(|_| ProtocolError::ConfigError(constants::ERR_LOCK_POISONED.to_string()))
    }

    // The state check happens under the shard lock so nothing slips in after
    // `start` has taken its snapshot.
    fn insert(&self, shard: i32, components: Vec<Arc<dyn Component>>) -> Result<()> {
        let mut shards = self.lock_shards()?;
        self.ensure_idle()?;
        for component in components {
            debug!(server = %self.name, component = component.name(), shard, "Component added");
            shards.entry(shard).or_default().push(component);
        }
        Ok(())
    }

    /// Initialize every component, register and freeze the handler tables,
    /// start the connects and spawn one scheduler task per shard key.
    ///
    /// A failing `init` aborts the start with [`ProtocolError::InitFailed`]
    /// naming the component and leaves the server idle. A failing handler
    /// registration leaves it failed: nothing was frozen or dialed, and only
    /// [`stop`](Self::stop) remains, which tears the components down.
    #[instrument(skip(self), fields(server = %self.name))]
    pub fn start(&self) -> Result<()> {
        let shards = self.lock_shards()?;
        if let Err(state) = self.state.compare_exchange(
            STATE_IDLE,
            STATE_RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            let reason = match state {
                STATE_RUNNING => constants::ERR_ALREADY_STARTED,
                STATE_FAILED => constants::ERR_START_FAILED,
                _ => constants::ERR_SERVER_STOPPED,
            };
            return Err(ProtocolError::ConfigError(reason.to_string()));
        }

        let components: Vec<&Arc<dyn Component>> = shards.values().flatten().collect();
        for component in &components {
            if let Err(e) = component.init() {
                error!(component = component.name(), error = %e, "Component init failed");
                self.state.store(STATE_IDLE, Ordering::Release);
                return Err(ProtocolError::InitFailed(component.name().to_string()));
            }
        }
        for component in &components {
            if let Err(e) = component.register() {
                error!(component = component.name(), error = %e, "Handler registration failed");
                self.state.store(STATE_FAILED, Ordering::Release);
                return Err(e);
            }
        }
        for component in &components {
            component.activate();
        }

        for (&shard, group) in shards.iter() {
            let group = group.clone();
            let tick = self.tick;
            let cancel = self.cancel.clone();
            self.tracker.spawn(run_shard(shard, group, tick, cancel));
        }
        info!(shards = shards.len(), tick_ms = self.tick.as_millis() as u64, "Server started");
        Ok(())
    }

    /// Stop the scheduler tasks, wait for them to exit, then tear every
    /// component down exactly once. Later calls return immediately.
    ///
    /// A server that never started also tears its components down, which
    /// closes listeners bound by `add_service`.
    pub async fn stop(&self) {
        let previous = self.state.swap(STATE_STOPPED, Ordering::AcqRel);
        if previous == STATE_STOPPED {
            return;
        }
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let components: Vec<Arc<dyn Component>> = match self.shards.lock() {
            Ok(mut shards) => std::mem::take(&mut *shards).into_values().flatten().collect(),
            Err(_) => Vec::new(),
        };
        for component in &components {
            component.destroy().await;
        }
        self.ctx.metrics().log_metrics();
        info!(server = %self.name, "Server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_shard(
    shard: i32,
    components: Vec<Arc<dyn Component>>,
    tick: Duration,
    cancel: CancellationToken,
) {
    debug!(shard, components = components.len(), "Shard loop started");
    loop {
        for component in &components {
            component.tick();
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(tick) => {}
        }
    }
    debug!(shard, "Shard loop stopped");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::service::{Dispatcher, Unmarshaled};
    use crate::transport::Session;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        inits: AtomicUsize,
        loops: AtomicUsize,
        destroys: AtomicUsize,
        fail_init: bool,
    }

    impl NullServiceImp for Counter {
        fn init(&self) -> Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(ProtocolError::ConfigError("refused".into()));
            }
            Ok(())
        }

        fn on_loop(&self) {
            self.loops.fetch_add(1, Ordering::SeqCst);
        }

        fn destroy(&self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_run_once() {
        let server = Server::new("test", Duration::from_millis(5), NetContext::default());
        let counter = Arc::new(Counter::default());
        server.add_null_service("counter", counter.clone(), 0).unwrap();

        server.start().unwrap();
        assert!(server.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());
        assert_eq!(counter.inits.load(Ordering::SeqCst), 1);
        assert_eq!(counter.destroys.load(Ordering::SeqCst), 1);
        assert!(counter.loops.load(Ordering::SeqCst) > 0);

        // no ticks after stop returned
        let loops = counter.loops.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.loops.load(Ordering::SeqCst), loops);
    }

    #[tokio::test]
    async fn test_init_failure_names_component() {
        let server = Server::new("test", Duration::from_millis(5), NetContext::default());
        let bad = Arc::new(Counter {
            fail_init: true,
            ..Counter::default()
        });
        server.add_null_service("broken", bad, 3).unwrap();

        match server.start() {
            Err(ProtocolError::InitFailed(name)) => assert_eq!(name, "broken"),
            other => panic!("unexpected start result: {other:?}"),
        }
        assert!(!server.is_running());
        server.stop().await;
    }

    #[tokio::test]
    async fn test_add_after_start_is_rejected() {
        let server = Server::new("test", Duration::from_millis(5), NetContext::default());
        server.start().unwrap();

        let late = server.add_null_service("late", Arc::new(Counter::default()), 0);
        assert!(matches!(late, Err(ProtocolError::ConfigError(_))));
        assert!(server.start().is_err());

        server.stop().await;
        assert!(server.start().is_err());
    }

    /// Outbound side used to check what a failed start leaves behind.
    struct Link {
        duplicate: bool,
    }

    impl Link {
        fn on_message(&self, _session: &Arc<Session>, _msg: ()) {}
    }

    impl ConnectImp for Link {
        type Message = ();

        fn register_messages(&self, handlers: &Dispatcher<Self, ()>) -> Result<()> {
            handlers.register_message(1, Self::on_message)?;
            if self.duplicate {
                handlers.register_message(1, Self::on_message)?;
            }
            Ok(())
        }

        fn unmarshal(&self, _session: &Arc<Session>, data: &[u8]) -> Unmarshaled<()> {
            Unmarshaled::Consumed(data.len())
        }
    }

    #[tokio::test]
    async fn test_failed_registration_leaves_server_stopped() {
        let server = Server::new("test", Duration::from_millis(5), NetContext::default());
        let healthy = server
            .add_connect("healthy", "127.0.0.1:1", Duration::ZERO, Link { duplicate: false }, 0)
            .unwrap();
        server
            .add_connect("broken", "127.0.0.1:1", Duration::ZERO, Link { duplicate: true }, 1)
            .unwrap();
        let counter = Arc::new(Counter::default());
        server.add_null_service("counter", counter.clone(), 2).unwrap();

        assert!(matches!(server.start(), Err(ProtocolError::ConfigError(_))));
        assert!(!server.is_running());
        // nothing dialed before every table registered
        assert!(!healthy.connector().is_started());

        // a retry reports the failed start instead of a frozen table
        match server.start() {
            Err(ProtocolError::ConfigError(reason)) => {
                assert_eq!(reason, constants::ERR_START_FAILED)
            }
            other => panic!("unexpected start result: {other:?}"),
        }
        let late = server.add_null_service("late", Arc::new(Counter::default()), 0);
        assert!(matches!(late, Err(ProtocolError::ConfigError(_))));

        server.stop().await;
        assert_eq!(counter.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(counter.loops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shards_are_grouped_by_key() {
        let server = Server::new("test", Duration::from_millis(5), NetContext::default());
        for (name, shard) in [("a", 1), ("b", 1), ("c", 2)] {
            server
                .add_null_service(name, Arc::new(Counter::default()), shard)
                .unwrap();
        }
        assert_eq!(server.shard_count(), 2);
        server.stop().await;
    }
}
