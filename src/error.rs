//! # Error Types
//!
//! Error handling for sessions, services, the SDP codec and the RPC layer.
//!
//! ## Error Categories
//! - **Connection**: socket closed, send timeout, send queue full, not connected.
//!   All of these are recoverable by retrying or by the connector's reconnect loop.
//! - **Protocol**: invalid or oversized frames. Incomplete frames are never errors,
//!   they only mean "wait for more bytes".
//! - **Codec**: every SDP decode/encode failure, wrapped from [`SdpError`].
//! - **RPC**: numeric status codes, late responses, unknown methods.
//! - **Configuration**: rejected at construction or start time.
//!
//! Nothing here is process-fatal: the worst outcome of any error is one session
//! or one pending RPC being torn down.
//!
//! ## Example Usage
//! ```rust
//! use stnet::core::sdp::{self, SdpError};
//! use stnet::error::{ProtocolError, Result};
//!
//! fn read_count(data: &[u8]) -> Result<u64> {
//!     let mut unpacker = sdp::Unpacker::new(data);
//!     let value = unpacker.unpack_number()?;
//!     Ok(value)
//! }
//!
//! let err = read_count(&[0x80]).unwrap_err();
//! assert!(matches!(err, ProtocolError::Codec(SdpError::UnexpectedEof)));
//! ```

use crate::core::sdp::SdpError;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handler table errors
    pub const ERR_HANDLER_EXISTS: &str = "Message handler already registered";
    pub const ERR_HANDLERS_FROZEN: &str = "Message handlers are frozen after start";

    /// RPC registration
    pub const ERR_FUNCTION_EXISTS: &str = "RPC function already registered";

    /// Scheduler errors
    pub const ERR_ALREADY_STARTED: &str = "Server already started";
    pub const ERR_SERVER_STOPPED: &str = "Server already stopped";
    pub const ERR_START_FAILED: &str = "Server failed to start and must be stopped";

    /// Frame errors
    pub const ERR_FRAME_TOO_SHORT: &str = "Frame length smaller than its own header";

    /// Synchronization
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// Primary error type for all framework operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] SdpError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Send timed out after {0:?}")]
    SendTimeout(std::time::Duration),

    #[error("Send queue full")]
    SendQueueFull,

    #[error("Invalid frame: {0}")]
    InvalidFrame(&'static str),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Message handler not found for message id {0}")]
    HandlerNotFound(u32),

    #[error("RPC failed with status {0}")]
    RpcStatus(i32),

    #[error("Received response {0} but its request already timed out")]
    LateResponse(u32),

    #[error("No rpc function: {0}")]
    NoRpcFunction(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization of {0} failed")]
    InitFailed(String),
}

impl ProtocolError {
    /// Connection-level errors are recoverable by retrying the operation.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::NotConnected
                | ProtocolError::SendTimeout(_)
                | ProtocolError::SendQueueFull
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
