//! Pooled scratch buffers.
//!
//! Scanline, chunk payload and expansion buffers are short-lived and
//! allocated at the same handful of sizes over and over. A
//! [`MemoryAllocator`] keeps released buffers around so the next
//! allocation of a similar size can reuse them. Every [`PooledBuffer`]
//! hands its storage back when dropped, including on early `?` returns.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a freshly handed-out buffer must be initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationOptions {
    /// Contents are unspecified; the caller overwrites them.
    #[default]
    None,
    /// Every byte is zero.
    Clean,
}

const DEFAULT_MAX_RETAINED: usize = 16;
const DEFAULT_MAX_BUFFER_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug)]
struct Pool {
    free: Vec<Vec<u8>>,
    max_retained: usize,
    max_buffer_len: usize,
}

/// A shared pool of byte buffers.
///
/// Cloning the allocator shares the same pool.
#[derive(Debug, Clone)]
pub struct MemoryAllocator {
    pool: Arc<Mutex<Pool>>,
}

impl MemoryAllocator {
    /// Create an allocator with default retention limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_RETAINED, DEFAULT_MAX_BUFFER_LEN)
    }

    /// Create an allocator that keeps at most `max_retained` idle buffers,
    /// each no larger than `max_buffer_len` bytes.
    pub fn with_limits(max_retained: usize, max_buffer_len: usize) -> Self {
        Self {
            pool: Arc::new(Mutex::new(Pool {
                free: Vec::new(),
                max_retained,
                max_buffer_len,
            })),
        }
    }

    /// Hand out a buffer of exactly `len` bytes.
    pub fn allocate(&self, len: usize, options: AllocationOptions) -> PooledBuffer {
        let reused = {
            let mut pool = lock(&self.pool);
            // Smallest idle buffer that fits.
            let best = pool
                .free
                .iter()
                .enumerate()
                .filter(|(_, buf)| buf.capacity() >= len)
                .min_by_key(|(_, buf)| buf.capacity())
                .map(|(i, _)| i);
            best.map(|i| pool.free.swap_remove(i))
        };

        let data = match reused {
            Some(mut buf) => {
                if buf.len() >= len {
                    buf.truncate(len);
                    if options == AllocationOptions::Clean {
                        buf.fill(0);
                    }
                } else {
                    if options == AllocationOptions::Clean {
                        buf.fill(0);
                    }
                    buf.resize(len, 0);
                }
                buf
            }
            None => vec![0u8; len],
        };

        PooledBuffer {
            data,
            pool: Arc::clone(&self.pool),
        }
    }

    /// Number of idle buffers currently held by the pool.
    pub fn retained(&self) -> usize {
        lock(&self.pool).free.len()
    }
}

impl Default for MemoryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(pool: &Mutex<Pool>) -> MutexGuard<'_, Pool> {
    pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A byte buffer borrowed from a [`MemoryAllocator`].
///
/// Dereferences to `[u8]`. The storage returns to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Arc<Mutex<Pool>>,
}

impl PooledBuffer {
    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Extend to `len` bytes; the new tail is zeroed. Shorter lengths are ignored.
    pub fn grow(&mut self, len: usize) {
        if len > self.data.len() {
            self.data.resize(len, 0);
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        if data.capacity() == 0 {
            return;
        }
        let mut pool = lock(&self.pool);
        if pool.free.len() < pool.max_retained && data.capacity() <= pool.max_buffer_len {
            pool.free.push(data);
        }
    }
}
