//! # Utility Modules
//!
//! Supporting utilities shared by the transport and service layers.
//!
//! ## Components
//! - **Buffer Pool**: reusable read buffers handed between session tasks
//! - **Metrics**: thread-safe observability counters
//! - **Logging**: `tracing-subscriber` bootstrap driven by [`LoggingConfig`](crate::config::LoggingConfig)

pub mod buffer_pool;
pub mod logging;
pub mod metrics;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use metrics::{Metrics, MetricsSnapshot};
