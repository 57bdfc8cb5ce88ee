//! # stnet
//!
//! Session-oriented TCP service framework.
//!
//! - [`core`]: the SDP tag/type/length codec and length-prefixed framing
//! - [`transport`]: sessions with concurrent receive, reassembly and send
//!   tasks, plus the listener and reconnecting connector that own them
//! - [`service`]: services and connects that queue socket events for a
//!   sharded [`Server`](service::Server) scheduler to dispatch
//! - [`protocol`]: the message-id dispatcher, an echo strategy and RPC
//! - [`config`], [`error`], [`utils`]: configuration, errors, buffer pool,
//!   metrics and logging bootstrap
//!
//! ## Example
//! ```rust,no_run
//! use stnet::config::NetworkConfig;
//! use stnet::protocol::echo::EchoService;
//! use stnet::service::Server;
//! use stnet::transport::NetContext;
//!
//! # async fn run() -> stnet::error::Result<()> {
//! let ctx = NetContext::new(NetworkConfig::default());
//! let server = Server::with_context("echo", ctx);
//! server.add_service("echo", "127.0.0.1:7000", EchoService, 0).await?;
//! server.start()?;
//! tokio::signal::ctrl_c().await?;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::NetworkConfig;
pub use crate::error::{ProtocolError, Result};
pub use crate::service::Server;
pub use crate::transport::NetContext;
