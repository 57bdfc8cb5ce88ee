//! # Protocol Layer
//!
//! Message strategies built on top of the transport:
//! - [`dispatcher`]: message-id keyed handler table and event queue shared by
//!   services and connects
//! - [`echo`]: sends every received chunk straight back
//! - [`rpc`]: request/response calls over length-prefixed SDP frames

pub mod dispatcher;
pub mod echo;
pub mod rpc;

#[cfg(test)]
mod tests;
