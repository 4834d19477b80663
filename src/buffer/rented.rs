//! Rented Buffer
//!
//! Growable byte sink over a pooled array.

use super::BufferPool;

/// A byte array rented from a [`BufferPool`]
///
/// The whole array is initialized; `written` marks how much of it holds
/// data. Dropping the rental returns the array to its pool.
pub struct RentedBuffer<'p> {
    pool: &'p BufferPool,
    array: Option<Vec<u8>>,
    written: usize,
}

impl<'p> RentedBuffer<'p> {
    pub(super) fn new(pool: &'p BufferPool, array: Vec<u8>) -> Self {
        Self {
            pool,
            array: Some(array),
            written: 0,
        }
    }

    /// Spare region of at least `min` bytes after the written data.
    ///
    /// Grows the rental if needed. Call [`advance`](Self::advance) with the
    /// number of bytes actually filled.
    pub fn writable(&mut self, min: usize) -> &mut [u8] {
        self.ensure_capacity(self.written + min);
        let written = self.written;
        match self.array.as_mut() {
            Some(array) => &mut array[written..],
            None => &mut [],
        }
    }

    /// Mark `n` more bytes of the spare region as written
    pub fn advance(&mut self, n: usize) {
        assert!(
            self.written + n <= self.capacity(),
            "advance past end of rented buffer ({} + {} > {})",
            self.written,
            n,
            self.capacity()
        );
        self.written += n;
    }

    /// Append bytes, growing as needed
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        let region = self.writable(data.len());
        region[..data.len()].copy_from_slice(data);
        self.advance(data.len());
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        match self.array.as_ref() {
            Some(array) => &array[..self.written],
            None => &[],
        }
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Size of the underlying array
    pub fn capacity(&self) -> usize {
        self.array.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Forget written data, keep the array
    pub fn clear(&mut self) {
        self.written = 0;
    }

    /// Return the array to the pool. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(array) = self.array.take() {
            self.pool.give_back(array);
        }
        self.written = 0;
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Swap in a bigger array, copying the written prefix
    fn ensure_capacity(&mut self, needed: usize) {
        if needed <= self.capacity() {
            return;
        }

        let target = needed.max(self.capacity() * 2);
        let mut bigger = self.pool.take(target);
        if let Some(old) = self.array.take() {
            bigger[..self.written].copy_from_slice(&old[..self.written]);
            self.pool.give_back(old);
        }
        self.array = Some(bigger);
    }
}

impl Drop for RentedBuffer<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RentedBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RentedBuffer")
            .field("written", &self.written)
            .field("capacity", &self.capacity())
            .finish()
    }
}
