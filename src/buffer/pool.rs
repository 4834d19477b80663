//! Buffer Pool
//!
//! Shared pool of byte arrays bucketed by power-of-two capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crossbeam::queue::ArrayQueue;

use super::RentedBuffer;

/// Smallest size class: 4 KiB
const MIN_CLASS_SHIFT: u32 = 12;

/// Largest size class: 64 MiB
const MAX_CLASS_SHIFT: u32 = 26;

const CLASS_COUNT: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;

/// Arrays retained per size class
const ARRAYS_PER_CLASS: usize = 4;

static SHARED: OnceLock<BufferPool> = OnceLock::new();

/// Pool of reusable byte arrays
///
/// ## Concurrency:
/// - Each size class is a bounded lock-free queue
/// - Counters are relaxed atomics (diagnostics only)
pub struct BufferPool {
    classes: Vec<ArrayQueue<Vec<u8>>>,
    rents: AtomicU64,
    reuses: AtomicU64,
    returns: AtomicU64,
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total rentals handed out
    pub rents: u64,
    /// Rentals served from a pooled array
    pub reuses: u64,
    /// Arrays accepted back into the pool
    pub returns: u64,
}

impl BufferPool {
    /// Create an empty pool
    pub fn new() -> Self {
        let classes = (0..CLASS_COUNT)
            .map(|_| ArrayQueue::new(ARRAYS_PER_CLASS))
            .collect();

        Self {
            classes,
            rents: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
        }
    }

    /// Process-wide pool used by the serializers
    pub fn shared() -> &'static BufferPool {
        SHARED.get_or_init(BufferPool::new)
    }

    /// Rent a buffer able to hold at least `estimated_size` bytes
    pub fn rent(&self, estimated_size: usize) -> RentedBuffer<'_> {
        RentedBuffer::new(self, self.take(estimated_size))
    }

    /// Counter snapshot
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            rents: self.rents.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
        }
    }

    /// Take an array of at least `min_len` bytes (length == capacity class)
    pub(super) fn take(&self, min_len: usize) -> Vec<u8> {
        self.rents.fetch_add(1, Ordering::Relaxed);

        let Some(class) = Self::class_for(min_len) else {
            return vec![0u8; min_len];
        };

        if let Some(array) = self.classes[class].pop() {
            self.reuses.fetch_add(1, Ordering::Relaxed);
            return array;
        }

        vec![0u8; Self::class_size(class)]
    }

    /// Hand an array back. Arrays that don't match a class exactly, or that
    /// arrive when the class is full, are dropped.
    pub(super) fn give_back(&self, array: Vec<u8>) {
        let Some(class) = Self::class_for(array.len()) else {
            return;
        };
        if Self::class_size(class) != array.len() {
            return;
        }
        if self.classes[class].push(array).is_ok() {
            self.returns.fetch_add(1, Ordering::Relaxed);
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Smallest class that fits `len`, or None if larger than every class
    fn class_for(len: usize) -> Option<usize> {
        let shift = len.max(1).next_power_of_two().trailing_zeros();
        let shift = shift.max(MIN_CLASS_SHIFT);
        if shift > MAX_CLASS_SHIFT {
            return None;
        }
        Some((shift - MIN_CLASS_SHIFT) as usize)
    }

    fn class_size(class: usize) -> usize {
        1usize << (class as u32 + MIN_CLASS_SHIFT)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("stats", &self.stats())
            .finish()
    }
}
