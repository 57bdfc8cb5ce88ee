use super::{status, RequestPacket, ResponsePacket, RpcArgs, RPC_MESSAGE_ID};
use crate::core::frame::{encode_frame, split_record};
use crate::core::sdp::SdpError;
use crate::error::{ProtocolError, Result};
use crate::service::{Connect, ConnectImp, Dispatcher, NullServiceImp, Unmarshaled};
use crate::transport::{NetContext, Session};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How a pending call ended.
enum Reply<'a> {
    /// Success; the packed return values.
    Payload(&'a [u8]),
    /// A non-zero status from the server, or a local timeout.
    Status(i32),
}

/// Runs once per call. An error means the reply payload did not decode.
type Completion = Box<dyn FnOnce(Reply<'_>) -> std::result::Result<(), SdpError> + Send>;

struct PendingCall {
    deadline: Instant,
    completion: Option<Completion>,
}

/// Calls waiting for their reply, keyed by request id.
pub(crate) struct PendingCalls {
    calls: Mutex<HashMap<u32, PendingCall>>,
    ctx: NetContext,
}

impl PendingCalls {
    fn new(ctx: NetContext) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            ctx,
        }
    }

    fn insert(&self, request_id: u32, call: PendingCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.insert(request_id, call);
        }
    }

    fn remove(&self, request_id: u32) -> Option<PendingCall> {
        self.calls.lock().ok()?.remove(&request_id)
    }

    fn len(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    fn contains(&self, request_id: u32) -> bool {
        self.calls
            .lock()
            .map(|calls| calls.contains_key(&request_id))
            .unwrap_or(false)
    }

    /// Fail every call whose deadline is before `now`. Returns how many expired.
    fn sweep(&self, now: Instant) -> usize {
        self.expire(|call| call.deadline < now)
    }

    /// Fail every outstanding call. Returns how many there were.
    fn fail_all(&self) -> usize {
        self.expire(|_| true)
    }

    fn expire<F: Fn(&PendingCall) -> bool>(&self, is_expired: F) -> usize {
        let expired: Vec<(u32, PendingCall)> = match self.calls.lock() {
            Ok(mut calls) => {
                let ids: Vec<u32> = calls
                    .iter()
                    .filter(|(_, call)| is_expired(call))
                    .map(|(&id, _)| id)
                    .collect();
                ids.into_iter()
                    .filter_map(|id| calls.remove(&id).map(|call| (id, call)))
                    .collect()
            }
            Err(_) => return 0,
        };
        // completions run without the lock held
        let count = expired.len();
        for (request_id, call) in expired {
            debug!(request_id, "RPC call timed out");
            self.ctx.metrics().rpc_timeout();
            if let Some(completion) = call.completion {
                let _ = completion(Reply::Status(status::ASYNC_CALL_TIMEOUT));
            }
        }
        count
    }
}

impl NullServiceImp for PendingCalls {
    fn on_loop(&self) {
        self.sweep(Instant::now());
    }

    // no sweep runs after the server stops, so nothing may stay behind
    fn destroy(&self) {
        let failed = self.fail_all();
        if failed > 0 {
            debug!(failed, "Failed pending RPC calls on shutdown");
        }
    }
}

/// Connection-side strategy of an [`RpcClient`]: decodes reply frames and
/// completes the matching pending call.
pub struct ReplyHandler {
    pending: Arc<PendingCalls>,
}

impl ReplyHandler {
    fn handle_reply(&self, session: &Arc<Session>, rsp: ResponsePacket) {
        let Some(call) = self.pending.remove(rsp.request_id) else {
            self.pending.ctx.metrics().rpc_late_response();
            self.handle_error(session, ProtocolError::LateResponse(rsp.request_id));
            return;
        };
        let Some(completion) = call.completion else {
            return;
        };
        let reply = if rsp.mfw_ret == status::SUCCESS {
            Reply::Payload(&rsp.rsp_payload)
        } else {
            debug!(
                request_id = rsp.request_id,
                status = rsp.mfw_ret,
                reason = status::describe(rsp.mfw_ret),
                "RPC call failed"
            );
            Reply::Status(rsp.mfw_ret)
        };
        if let Err(e) = completion(reply) {
            self.handle_error(session, e.into());
        }
    }
}

impl ConnectImp for ReplyHandler {
    type Message = ResponsePacket;

    fn register_messages(&self, handlers: &Dispatcher<Self, ResponsePacket>) -> Result<()> {
        handlers.register_message(RPC_MESSAGE_ID, Self::handle_reply)
    }

    fn unmarshal(&self, session: &Arc<Session>, data: &[u8]) -> Unmarshaled<ResponsePacket> {
        split_record(data, session.context().config().service.max_frame_size)
    }

    fn handle_error(&self, session: &Arc<Session>, error: ProtocolError) {
        warn!(session_id = session.id(), error = %error, "RPC reply error");
    }
}

/// Client side of RPC, bound to one remote service.
///
/// Calls never block: the request is queued on the connection and the reply
/// completes the call later on the client's scheduler shard. Calls that see
/// no reply within the configured window fail with
/// [`status::ASYNC_CALL_TIMEOUT`]; the sweep that detects this only runs while
/// the owning [`Server`](crate::service::Server) is running.
pub struct RpcClient {
    name: String,
    service_name: String,
    sequence: AtomicU32,
    call_timeout: Duration,
    pending: Arc<PendingCalls>,
    connect: Arc<Connect<ReplyHandler>>,
    ctx: NetContext,
}

impl RpcClient {
    pub(crate) fn new(
        name: impl Into<String>,
        service_name: impl Into<String>,
        addr: impl Into<String>,
        ctx: NetContext,
    ) -> Self {
        let name = name.into();
        let reconnect_interval = ctx.config().rpc.reconnect_interval;
        let call_timeout = ctx.config().rpc.call_timeout;
        let pending = Arc::new(PendingCalls::new(ctx.clone()));
        let handler = ReplyHandler {
            pending: pending.clone(),
        };
        let connect = Arc::new(Connect::new(
            name.clone(),
            addr,
            reconnect_interval,
            handler,
            ctx.clone(),
            true,
        ));
        Self {
            name,
            service_name: service_name.into(),
            sequence: AtomicU32::new(1),
            call_timeout,
            pending,
            connect,
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn connect(&self) -> &Arc<Connect<ReplyHandler>> {
        &self.connect
    }

    pub(crate) fn pending(&self) -> &Arc<PendingCalls> {
        &self.pending
    }

    pub fn is_connected(&self) -> bool {
        self.connect.is_connected()
    }

    /// Calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: u32) -> bool {
        self.pending.contains(request_id)
    }

    /// Fire a call and ignore its outcome. Returns the request id.
    pub fn call<A: RpcArgs>(&self, func: &str, args: A) -> Result<u32> {
        self.submit(func, &args, None)
    }

    /// Call `func`; `callback` receives the decoded return values on success.
    pub fn call_with_callback<A, R, F>(&self, func: &str, args: A, callback: F) -> Result<u32>
    where
        A: RpcArgs,
        R: RpcArgs,
        F: FnOnce(R) + Send + 'static,
    {
        let completion: Completion = Box::new(move |reply: Reply<'_>| match reply {
            Reply::Payload(payload) => {
                callback(R::from_payload(payload)?);
                Ok(())
            }
            Reply::Status(_) => Ok(()),
        });
        self.submit(func, &args, Some(completion))
    }

    /// Call `func`; `exception` receives the status code if the call fails.
    pub fn call_with_exception<A, E>(&self, func: &str, args: A, exception: E) -> Result<u32>
    where
        A: RpcArgs,
        E: FnOnce(i32) + Send + 'static,
    {
        let completion: Completion = Box::new(move |reply: Reply<'_>| {
            if let Reply::Status(code) = reply {
                exception(code);
            }
            Ok(())
        });
        self.submit(func, &args, Some(completion))
    }

    /// Call `func` with both outcomes handled. A reply whose payload does not
    /// decode as `R` reaches `exception` as [`status::FUNC_PARAMS_ERR`].
    pub fn call_with_callback_and_exception<A, R, F, E>(
        &self,
        func: &str,
        args: A,
        callback: F,
        exception: E,
    ) -> Result<u32>
    where
        A: RpcArgs,
        R: RpcArgs,
        F: FnOnce(R) + Send + 'static,
        E: FnOnce(i32) + Send + 'static,
    {
        let completion: Completion = Box::new(move |reply: Reply<'_>| match reply {
            Reply::Payload(payload) => match R::from_payload(payload) {
                Ok(values) => {
                    callback(values);
                    Ok(())
                }
                Err(e) => {
                    exception(status::FUNC_PARAMS_ERR);
                    Err(e)
                }
            },
            Reply::Status(code) => {
                exception(code);
                Ok(())
            }
        });
        self.submit(func, &args, Some(completion))
    }

    /// Send a one-way request; the server does not reply.
    pub fn notify<A: RpcArgs>(&self, func: &str, args: A) -> Result<()> {
        let request_id = self.next_request_id();
        let request = self.request(request_id, func, &args, true);
        self.connect.async_send(encode_frame(&request))?;
        self.ctx.metrics().rpc_call();
        Ok(())
    }

    /// Call `func` and wait for its decoded return values.
    ///
    /// Fails with [`ProtocolError::RpcStatus`] carrying the server's status or
    /// [`status::ASYNC_CALL_TIMEOUT`]. Must not be awaited from a handler on
    /// the client's own shard, which is where replies are delivered.
    pub async fn invoke<A: RpcArgs, R: RpcArgs>(&self, func: &str, args: A) -> Result<R> {
        let (tx, rx) = oneshot::channel::<Result<R>>();
        let completion: Completion = Box::new(move |reply: Reply<'_>| {
            let (result, error) = match reply {
                Reply::Payload(payload) => match R::from_payload(payload) {
                    Ok(values) => (Ok(values), None),
                    Err(e) => (Err(ProtocolError::RpcStatus(status::FUNC_PARAMS_ERR)), Some(e)),
                },
                Reply::Status(code) => (Err(ProtocolError::RpcStatus(code)), None),
            };
            let _ = tx.send(result);
            error.map_or(Ok(()), Err)
        });
        self.submit(func, &args, Some(completion))?;
        rx.await.map_err(|_| ProtocolError::ConnectionClosed)?
    }

    fn next_request_id(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn request<A: RpcArgs>(&self, request_id: u32, func: &str, args: &A, one_way: bool) -> RequestPacket {
        RequestPacket {
            is_one_way: one_way,
            request_id,
            service_name: self.service_name.clone(),
            func_name: func.to_string(),
            req_payload: args.to_payload(),
            timeout: u32::try_from(self.call_timeout.as_millis()).unwrap_or(u32::MAX),
            context: HashMap::new(),
        }
    }

    // The pending entry goes in before the send so a fast reply always finds it.
    fn submit<A: RpcArgs>(&self, func: &str, args: &A, completion: Option<Completion>) -> Result<u32> {
        let request_id = self.next_request_id();
        let request = self.request(request_id, func, args, false);
        self.pending.insert(
            request_id,
            PendingCall {
                deadline: Instant::now() + self.call_timeout,
                completion,
            },
        );
        if let Err(e) = self.connect.async_send(encode_frame(&request)) {
            self.pending.remove(request_id);
            return Err(e);
        }
        self.ctx.metrics().rpc_call();
        debug!(client = %self.name, request_id, func, "RPC call sent");
        Ok(request_id)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("name", &self.name)
            .field("service_name", &self.service_name)
            .field("pending", &self.pending.len())
            .finish()
    }
}
