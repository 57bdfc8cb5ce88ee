//! Observability and Metrics
//!
//! Atomic counters for sessions, traffic, backpressure and RPC health.
//!
//! One [`Metrics`] lives inside each [`NetContext`](crate::transport::NetContext);
//! there is no process-wide instance, so independent servers (and tests) never
//! see each other's numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for framework operations
#[derive(Debug)]
pub struct Metrics {
    /// Total sessions opened
    pub sessions_total: AtomicU64,
    /// Currently open sessions
    pub sessions_active: AtomicU64,
    /// Total messages parsed out of inbound bytes
    pub messages_received: AtomicU64,
    /// Total messages queued for sending
    pub messages_sent: AtomicU64,
    /// Total bytes read from sockets
    pub bytes_received: AtomicU64,
    /// Total bytes written to sockets
    pub bytes_sent: AtomicU64,
    /// `send` calls that hit their bounded wait
    pub send_timeouts: AtomicU64,
    /// `async_send` calls rejected on a full queue
    pub queue_full: AtomicU64,
    /// Dial failures and socket errors
    pub connection_errors: AtomicU64,
    /// Malformed or oversized frames
    pub protocol_errors: AtomicU64,
    /// RPC requests issued
    pub rpc_calls: AtomicU64,
    /// RPC requests failed by the deadline sweep
    pub rpc_timeouts: AtomicU64,
    /// RPC replies with no pending request
    pub rpc_late_responses: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_timeouts: AtomicU64::new(0),
            queue_full: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            rpc_calls: AtomicU64::new(0),
            rpc_timeouts: AtomicU64::new(0),
            rpc_late_responses: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_received.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_timeout(&self) {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_call(&self) {
        self.rpc_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_timeout(&self) {
        self.rpc_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_late_response(&self) {
        self.rpc_late_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_timeouts: self.send_timeouts.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            rpc_calls: self.rpc_calls.load(Ordering::Relaxed),
            rpc_timeouts: self.rpc_timeouts.load(Ordering::Relaxed),
            rpc_late_responses: self.rpc_late_responses.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            sessions_total = snapshot.sessions_total,
            sessions_active = snapshot.sessions_active,
            messages_received = snapshot.messages_received,
            messages_sent = snapshot.messages_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            send_timeouts = snapshot.send_timeouts,
            queue_full = snapshot.queue_full,
            connection_errors = snapshot.connection_errors,
            protocol_errors = snapshot.protocol_errors,
            rpc_calls = snapshot.rpc_calls,
            rpc_timeouts = snapshot.rpc_timeouts,
            rpc_late_responses = snapshot.rpc_late_responses,
            uptime_seconds = snapshot.uptime_seconds,
            "Network metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub send_timeouts: u64,
    pub queue_full: u64,
    pub connection_errors: u64,
    pub protocol_errors: u64,
    pub rpc_calls: u64,
    pub rpc_timeouts: u64,
    pub rpc_late_responses: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let metrics = Metrics::new();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        let snap = metrics.snapshot();
        assert_eq!(snap.sessions_total, 2);
        assert_eq!(snap.sessions_active, 1);
    }

    #[test]
    fn test_traffic_counters() {
        let metrics = Metrics::default();
        metrics.bytes_read(10);
        metrics.bytes_written(4);
        metrics.message_received();
        metrics.send_queue_full();
        metrics.rpc_timeout();
        let snap = metrics.snapshot();
        assert_eq!(snap.bytes_received, 10);
        assert_eq!(snap.bytes_sent, 4);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.queue_full, 1);
        assert_eq!(snap.rpc_timeouts, 1);
        metrics.log_metrics();
    }
}
