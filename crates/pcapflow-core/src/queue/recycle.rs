//! Packet buffer pool.
//!
//! The pool is the only resource shared by every worker. The source takes
//! fresh buffers from it, the sink (or any worker dropping a packet) puts
//! them back. Buffers are allocated lazily up to the pool capacity; once all
//! of them are in flight `acquire` blocks until one is released, which
//! throttles the source to the pace of the slowest consumer.
//!
//! A worker that dies mid-run may strand buffers in its input shard, so the
//! pool can be closed: a closed pool hands out nothing and wakes a blocked
//! `acquire`, which ends the source and lets the rest of the topology drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::packet::{Packet, DEFAULT_SNAPLEN};

/// Name under which the pool appears in worker descriptors.
pub const RECYCLE_POOL_NAME: &str = "packetpool";

/// Shared free list of packet buffers.
#[derive(Clone)]
pub struct RecyclePool {
    free_tx: Sender<Packet>,
    free_rx: Receiver<Packet>,
    /// Dropped on close; `closed_rx` then reports disconnection.
    close_tx: Arc<Mutex<Option<Sender<()>>>>,
    closed_rx: Receiver<()>,
    allocated: Arc<AtomicUsize>,
    capacity: usize,
    buffer_size: usize,
}

impl RecyclePool {
    /// Creates a pool of at most `capacity` buffers (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_buffer_size(capacity, DEFAULT_SNAPLEN)
    }

    /// Creates a pool whose buffers are preallocated to `buffer_size` bytes.
    #[must_use]
    pub fn with_buffer_size(capacity: usize, buffer_size: usize) -> Self {
        let (free_tx, free_rx) = crossbeam_channel::unbounded();
        let (close_tx, closed_rx) = crossbeam_channel::bounded(0);
        Self {
            free_tx,
            free_rx,
            close_tx: Arc::new(Mutex::new(Some(close_tx))),
            closed_rx,
            allocated: Arc::new(AtomicUsize::new(0)),
            capacity: capacity.max(1),
            buffer_size,
        }
    }

    /// Takes a buffer, allocating one if the pool has not reached capacity
    /// and blocking otherwise.
    ///
    /// Returns `None` once the pool is closed, including while blocked.
    pub fn acquire(&self) -> Option<Packet> {
        if let Some(packet) = self.try_acquire() {
            return Some(packet);
        }
        if self.is_closed() {
            return None;
        }
        crossbeam_channel::select! {
            recv(self.free_rx) -> packet => packet.ok(),
            recv(self.closed_rx) -> _closed => None,
        }
    }

    /// Takes a buffer without blocking. Returns `None` if none is free and
    /// the pool is at capacity, or if the pool is closed.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Packet> {
        if self.is_closed() {
            return None;
        }
        if let Ok(packet) = self.free_rx.try_recv() {
            return Some(packet);
        }
        self.try_grow()
            .then(|| Packet::with_capacity(self.buffer_size))
    }

    /// Returns a buffer to the pool. Never blocks.
    pub fn release(&self, mut packet: Packet) {
        packet.reset();
        // Cannot fail: `self` keeps a receiver alive.
        let _ = self.free_tx.send(packet);
    }

    /// Stops handing out buffers and wakes every blocked `acquire`.
    /// Idempotent.
    pub fn close(&self) {
        if self.close_tx.lock().take().is_some() {
            tracing::debug!("packet pool closed");
        }
    }

    /// Returns true once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_tx.lock().is_none()
    }

    /// Maximum number of buffers.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers allocated so far.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Buffers currently sitting in the free list.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    fn try_grow(&self) -> bool {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }
}

impl std::fmt::Debug for RecyclePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecyclePool")
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated())
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lazy_allocation_up_to_capacity() {
        let pool = RecyclePool::with_buffer_size(2, 64);
        assert_eq!(pool.allocated(), 0);

        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert_eq!(pool.allocated(), 2);
        assert!(pool.try_acquire().is_none());

        pool.release(a);
        assert_eq!(pool.available(), 1);
        let c = pool.try_acquire().unwrap();
        assert!(c.data.capacity() >= 64);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn test_release_resets_packet() {
        let pool = RecyclePool::with_buffer_size(1, 16);
        let mut packet = pool.acquire().unwrap();
        packet.data.extend_from_slice(b"abc");
        packet.seq = 9;
        pool.release(packet);

        let packet = pool.acquire().unwrap();
        assert!(packet.data.is_empty());
        assert_eq!(packet.seq, 0);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = RecyclePool::with_buffer_size(1, 16);
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        pool.release(held);
        assert!(waiter.join().unwrap().is_some());
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_close_wakes_blocked_acquire() {
        let pool = RecyclePool::with_buffer_size(1, 16);
        let _held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        pool.close();
        assert!(waiter.join().unwrap().is_none());
        assert!(pool.is_closed());
    }

    #[test]
    fn test_closed_pool_hands_out_nothing() {
        let pool = RecyclePool::with_buffer_size(4, 16);
        let packet = pool.acquire().unwrap();
        pool.release(packet);

        pool.close();
        pool.close();
        assert!(pool.try_acquire().is_none());
        assert!(pool.acquire().is_none());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let pool = RecyclePool::new(0);
        assert_eq!(pool.capacity(), 1);
    }
}
