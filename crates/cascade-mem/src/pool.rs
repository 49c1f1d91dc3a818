//! Size-class buffer pool.
//!
//! Every `ByteBuf` allocated here is counted on acquire and on release, so a
//! finished pipeline can assert that nothing leaked: `outstanding() == 0`.
//! The pool is single-threaded like the event loop that uses it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cascade_core::config::PoolConfig;
use tracing::trace;

use crate::buf::ByteBuf;
use crate::tracking::PeakTracker;

/// Smallest capacity handed out; requests are rounded up to a power of two.
pub const MIN_CAPACITY: usize = 32;

const SIZE_CLASSES: usize = usize::BITS as usize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocations: u64,
    pub releases: u64,
    /// Allocations served by a fresh `Vec`.
    pub created: u64,
    /// Allocations served from a free list.
    pub reused: u64,
    pub cached_bytes: usize,
    pub peak_outstanding: usize,
}

impl PoolStats {
    pub fn outstanding(&self) -> u64 {
        self.allocations - self.releases
    }
}

pub(crate) struct PoolShared {
    free: RefCell<Vec<Vec<Vec<u8>>>>,
    cached_bytes: Cell<usize>,
    max_cached_bytes: usize,
    allocations: Cell<u64>,
    releases: Cell<u64>,
    created: Cell<u64>,
    reused: Cell<u64>,
    tracker: PeakTracker,
}

impl PoolShared {
    fn outstanding(&self) -> usize {
        (self.allocations.get() - self.releases.get()) as usize
    }

    pub(crate) fn release(&self, data: Vec<u8>) {
        self.releases.set(self.releases.get() + 1);
        self.tracker.record(self.outstanding());

        let cap = data.len();
        if cap < MIN_CAPACITY || !cap.is_power_of_two() {
            return;
        }
        if self.cached_bytes.get() + cap > self.max_cached_bytes {
            return;
        }
        self.cached_bytes.set(self.cached_bytes.get() + cap);
        self.free.borrow_mut()[class_of(cap)].push(data);
    }
}

fn class_of(cap: usize) -> usize {
    cap.trailing_zeros() as usize
}

fn round_capacity(min: usize) -> usize {
    min.max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .unwrap_or(min)
}

/// Cheap cloneable handle to a shared pool.
#[derive(Clone)]
pub struct BufferPool {
    shared: Rc<PoolShared>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

impl BufferPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            shared: Rc::new(PoolShared {
                free: RefCell::new(vec![Vec::new(); SIZE_CLASSES]),
                cached_bytes: Cell::new(0),
                max_cached_bytes: config.max_cached_bytes,
                allocations: Cell::new(0),
                releases: Cell::new(0),
                created: Cell::new(0),
                reused: Cell::new(0),
                tracker: PeakTracker::new(),
            }),
        }
    }

    /// Buffer with at least `min_capacity` writable bytes.
    pub fn allocate(&self, min_capacity: usize) -> ByteBuf {
        let shared = &self.shared;
        let cap = round_capacity(min_capacity);
        let recycled = if cap.is_power_of_two() {
            shared.free.borrow_mut()[class_of(cap)].pop()
        } else {
            None
        };
        let data = match recycled {
            Some(data) => {
                shared.cached_bytes.set(shared.cached_bytes.get() - cap);
                shared.reused.set(shared.reused.get() + 1);
                data
            }
            None => {
                shared.created.set(shared.created.get() + 1);
                vec![0u8; cap]
            }
        };
        shared.allocations.set(shared.allocations.get() + 1);
        shared.tracker.record(shared.outstanding());
        ByteBuf::pooled(data, shared.clone())
    }

    /// Return `buf` unchanged if it has room for `n` more bytes, otherwise a
    /// larger buffer holding the same readable bytes.
    pub fn ensure_write_remaining(&self, mut buf: ByteBuf, n: usize) -> ByteBuf {
        if buf.write_remaining() >= n {
            return buf;
        }
        if buf.capacity() - buf.read_remaining() >= n {
            buf.compact();
            return buf;
        }
        let mut bigger = self.allocate(buf.read_remaining() + n);
        bigger.put_slice(buf.read_slice());
        trace!(from = buf.capacity(), to = bigger.capacity(), "buffer grown");
        bigger
    }

    pub fn append(&self, buf: ByteBuf, bytes: &[u8]) -> ByteBuf {
        let mut buf = self.ensure_write_remaining(buf, bytes.len());
        buf.put_slice(bytes);
        buf
    }

    /// Pooled copy of `bytes`.
    pub fn copy_of(&self, bytes: &[u8]) -> ByteBuf {
        let mut buf = self.allocate(bytes.len());
        buf.put_slice(bytes);
        buf
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            allocations: shared.allocations.get(),
            releases: shared.releases.get(),
            created: shared.created.get(),
            reused: shared.reused.get(),
            cached_bytes: shared.cached_bytes.get(),
            peak_outstanding: shared.tracker.peak(),
        }
    }

    /// Drop every cached buffer.
    pub fn clear(&self) {
        for class in self.shared.free.borrow_mut().iter_mut() {
            class.clear();
        }
        self.shared.cached_bytes.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_are_reused() {
        let pool = BufferPool::default();
        let a = pool.allocate(100);
        assert_eq!(a.capacity(), 128);
        drop(a);
        let b = pool.allocate(70);
        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.outstanding(), 1);
        drop(b);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn growth_keeps_readable_bytes() {
        let pool = BufferPool::default();
        let mut buf = pool.allocate(4);
        buf.put_slice(b"abcd");
        buf.advance_read(1);
        let buf = pool.append(buf, &[b'x'; 40]);
        assert_eq!(&buf.read_slice()[..3], b"bcd");
        assert_eq!(buf.read_remaining(), 43);
        drop(buf);
        assert_eq!(pool.stats().outstanding(), 0);
        assert_eq!(pool.stats().peak_outstanding, 2);
    }

    #[test]
    fn into_vec_counts_as_release() {
        let pool = BufferPool::default();
        let buf = pool.copy_of(b"hello");
        assert_eq!(buf.into_vec(), b"hello".to_vec());
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn cache_is_bounded() {
        let pool = BufferPool::new(&PoolConfig { max_cached_bytes: 64 });
        drop(pool.allocate(64));
        drop(pool.allocate(1000));
        let stats = pool.stats();
        assert_eq!(stats.cached_bytes, 64);
    }
}
