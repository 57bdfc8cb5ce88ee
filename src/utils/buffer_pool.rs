//! # Buffer Pool
//!
//! Reusable read buffers shared by every session of a [`NetContext`](crate::transport::NetContext).
//!
//! A session's receive task reads into a pooled buffer, hands it to the
//! reassembly task, and the buffer returns to the pool when the reassembly task
//! drops it. Buffers larger than the pool's `buffer_size` are allocated fresh
//! and freed normally.
//!
//! ## Usage
//! ```rust
//! use stnet::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(8, 4096);
//! let mut buffer = pool.acquire(1024);
//! assert_eq!(buffer.len(), 1024);
//! buffer[0] = 7;
//! drop(buffer); // back in the pool
//! assert_eq!(pool.available(), 1);
//! ```

use std::sync::{Arc, Mutex};

/// A pooled buffer that returns itself to the pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<Shared>,
}

struct Shared {
    idle: Mutex<Vec<Vec<u8>>>,
    max_buffers: usize,
    buffer_size: usize,
}

impl PooledBuffer {
    /// Shorten the visible contents to `len` bytes (no-op if already shorter).
    pub fn truncate(&mut self, len: usize) {
        self.buffer.truncate(len);
    }

    /// Capacity of the underlying allocation.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Get the underlying buffer, consuming this wrapper
    pub fn into_inner(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // Oversized or taken buffers are simply freed
        let capacity = self.buffer.capacity();
        if capacity == 0 || capacity > self.pool.buffer_size {
            return;
        }
        if let Ok(mut idle) = self.pool.idle.lock() {
            if idle.len() < self.pool.max_buffers {
                self.buffer.clear();
                idle.push(std::mem::take(&mut self.buffer));
            }
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}

/// Thread-safe pool of read buffers
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<Shared>,
}

impl BufferPool {
    /// Create a pool that keeps at most `max_buffers` idle allocations of up to
    /// `buffer_size` bytes each.
    pub fn new(max_buffers: usize, buffer_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::with_capacity(max_buffers)),
                max_buffers,
                buffer_size,
            }),
        }
    }

    /// Acquire a buffer holding exactly `len` zeroed bytes.
    pub fn acquire(&self, len: usize) -> PooledBuffer {
        let mut buffer = if len <= self.shared.buffer_size {
            self.shared
                .idle
                .lock()
                .ok()
                .and_then(|mut idle| idle.pop())
                .unwrap_or_else(|| Vec::with_capacity(self.shared.buffer_size))
        } else {
            Vec::with_capacity(len)
        };
        buffer.resize(len, 0);

        PooledBuffer {
            buffer,
            pool: self.shared.clone(),
        }
    }

    /// Get the current number of idle buffers in the pool
    pub fn available(&self) -> usize {
        self.shared.idle.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(256, 64 * 1024)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("available", &self.available())
            .field("max_buffers", &self.shared.max_buffers)
            .field("buffer_size", &self.shared.buffer_size)
            .finish()
    }
}
