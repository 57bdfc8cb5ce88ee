use super::{status, RequestPacket, ResponsePacket, RpcArgs, RPC_MESSAGE_ID};
use crate::core::frame::{encode_frame, split_record};
use crate::core::sdp::SdpError;
use crate::error::{constants, ProtocolError, Result};
use crate::service::{Dispatcher, ServiceImp, Unmarshaled};
use crate::transport::Session;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type RpcFn = Box<dyn Fn(&[u8]) -> std::result::Result<Bytes, SdpError> + Send + Sync>;

/// Server side of RPC: a table of named functions behind one service.
///
/// ```rust
/// use stnet::protocol::rpc::RpcServer;
///
/// let mut rpc = RpcServer::new("calc");
/// rpc.register("add", |(a, b): (i32, i32)| (a + b,)).unwrap();
/// assert!(rpc.has_function("add"));
/// ```
pub struct RpcServer {
    service_name: String,
    functions: HashMap<String, RpcFn>,
}

impl RpcServer {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            functions: HashMap::new(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Register `func` under `name`. Its argument tuple is decoded from the
    /// request and its returned tuple packed into the reply.
    pub fn register<A, R, F>(&mut self, name: impl Into<String>, func: F) -> Result<()>
    where
        A: RpcArgs,
        R: RpcArgs,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(ProtocolError::ConfigError(format!(
                "{}: {name}",
                constants::ERR_FUNCTION_EXISTS
            )));
        }
        let call: RpcFn = Box::new(move |payload: &[u8]| {
            let args = A::from_payload(payload)?;
            Ok(func(args).to_payload())
        });
        self.functions.insert(name, call);
        Ok(())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Run one request and reply to it unless it is one-way.
    pub fn handle_request(&self, session: &Arc<Session>, req: RequestPacket) {
        if req.service_name != self.service_name {
            debug!(
                requested = %req.service_name,
                service = %self.service_name,
                "Request for another service"
            );
            self.respond(session, req, status::NO_SERVICE_ERR, Bytes::new());
            return;
        }
        let Some(func) = self.functions.get(&req.func_name) else {
            let error = ProtocolError::NoRpcFunction(req.func_name.clone());
            self.respond(session, req, status::NO_FUNC_ERR, Bytes::new());
            self.handle_error(session, error);
            return;
        };
        match func(&req.req_payload) {
            Ok(payload) => self.respond(session, req, status::SUCCESS, payload),
            Err(e) => {
                self.respond(session, req, status::FUNC_PARAMS_ERR, Bytes::new());
                self.handle_error(session, e.into());
            }
        }
    }

    fn respond(&self, session: &Arc<Session>, req: RequestPacket, ret: i32, payload: Bytes) {
        if req.is_one_way {
            return;
        }
        let rsp = ResponsePacket {
            mfw_ret: ret,
            request_id: req.request_id,
            rsp_payload: payload,
            context: req.context,
        };
        if let Err(e) = session.async_send(encode_frame(&rsp)) {
            warn!(
                session_id = session.id(),
                request_id = rsp.request_id,
                error = %e,
                "RPC reply dropped"
            );
        }
    }
}

impl ServiceImp for RpcServer {
    type Message = RequestPacket;

    fn register_messages(&self, handlers: &Dispatcher<Self, RequestPacket>) -> Result<()> {
        handlers.register_message(RPC_MESSAGE_ID, Self::handle_request)
    }

    fn unmarshal(&self, session: &Arc<Session>, data: &[u8]) -> Unmarshaled<RequestPacket> {
        split_record(data, session.context().config().service.max_frame_size)
    }

    fn handle_error(&self, session: &Arc<Session>, error: ProtocolError) {
        warn!(
            service = %self.service_name,
            session_id = session.id(),
            error = %error,
            "RPC request failed"
        );
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RpcServer")
            .field("service_name", &self.service_name)
            .field("functions", &names)
            .finish()
    }
}
