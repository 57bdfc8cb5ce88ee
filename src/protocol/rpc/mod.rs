//! # RPC over SDP frames
//!
//! A client sends a [`RequestPacket`] naming a service, a function and the
//! positionally packed arguments; the server answers with a [`ResponsePacket`]
//! carrying a status code and the packed return values. Both travel as
//! length-prefixed SDP frames and are matched by request id.
//!
//! ```text
//! RpcClient ──RequestPacket──▶ RpcServer
//!     ▲                            │ lookup by name, decode args, call
//!     └──────ResponsePacket────────┘
//! ```
//!
//! Pending calls on the client expire after [`RpcConfig::call_timeout`]; a sweep
//! on the client's scheduler shard fails them with
//! [`status::ASYNC_CALL_TIMEOUT`].
//!
//! [`RpcConfig::call_timeout`]: crate::config::RpcConfig

pub mod args;
pub mod client;
pub mod packet;
pub mod server;

pub use args::RpcArgs;
pub use client::{ReplyHandler, RpcClient};
pub use packet::{RequestPacket, ResponsePacket};
pub use server::RpcServer;

/// Status codes carried in [`ResponsePacket::mfw_ret`] and passed to exception
/// callbacks.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const UNKNOWN_ERR: i32 = -999990;
    pub const NO_FUNC_ERR: i32 = -999991;
    pub const NO_SERVICE_ERR: i32 = -999992;
    pub const QUEUE_TIMEOUT: i32 = -999993;
    pub const ASYNC_CALL_TIMEOUT: i32 = -999994;
    pub const INVOKE_TIMEOUT: i32 = -999995;
    pub const PROXY_CONNECT_ERR: i32 = -999996;
    pub const OVERLOAD: i32 = -999997;
    pub const ADAPTER_NULL: i32 = -999998;
    pub const FUNC_PARAMS_ERR: i32 = -999999;

    /// Short description of a status code, for logs.
    pub fn describe(code: i32) -> &'static str {
        match code {
            SUCCESS => "success",
            NO_FUNC_ERR => "no such function",
            NO_SERVICE_ERR => "no such service",
            QUEUE_TIMEOUT => "server queue timeout",
            ASYNC_CALL_TIMEOUT => "call timed out",
            INVOKE_TIMEOUT => "invoke timed out",
            PROXY_CONNECT_ERR => "proxy connect failed",
            OVERLOAD => "server overloaded",
            ADAPTER_NULL => "no adapter",
            FUNC_PARAMS_ERR => "bad function parameters",
            _ => "unknown error",
        }
    }
}

/// Message id every RPC frame is dispatched under.
pub(crate) const RPC_MESSAGE_ID: u32 = 0;
