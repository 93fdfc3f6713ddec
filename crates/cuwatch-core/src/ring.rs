//! Fixed-capacity rate-averaging ring buffer (`no_std` compatible)
//!
//! The backing storage is a `[f32; N]` array sized at compile time; the
//! logical capacity is chosen at runtime (`1..=N`) so one build can serve
//! different buffer sizes from configuration. Pushing into a full buffer
//! overwrites the oldest value. Nothing here allocates.

use serde::{Deserialize, Serialize};

/// Which series a ring buffer holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Inter-event intervals in milliseconds
    IntervalMs,
    /// Periodic rate snapshots in hits per second
    Rate,
}

/// Fixed-capacity circular buffer of `f32` samples.
///
/// Single-owner: the acquisition loop writes, status readers get copies via
/// [`snapshot`](Self::snapshot).
#[derive(Clone, Debug)]
pub struct RateRingBuffer<const N: usize> {
    buffer: [f32; N],
    /// Physical index of the oldest element
    head: usize,
    /// Number of valid elements
    len: usize,
    capacity: usize,
    kind: SeriesKind,
}

impl<const N: usize> RateRingBuffer<N> {
    const NON_EMPTY: () = assert!(N > 0, "RateRingBuffer needs a backing array of at least one slot");

    /// Create an empty buffer holding at most `capacity` values.
    ///
    /// `capacity` is clamped to `1..=N`. A zero-sized backing array is
    /// rejected at compile time:
    ///
    /// ```compile_fail
    /// use cuwatch_core::ring::{RateRingBuffer, SeriesKind};
    ///
    /// let _ = RateRingBuffer::<0>::new(1, SeriesKind::Rate);
    /// ```
    #[must_use]
    pub const fn new(capacity: usize, kind: SeriesKind) -> Self {
        let () = Self::NON_EMPTY;
        let capacity = if capacity == 0 {
            1
        } else if capacity > N {
            N
        } else {
            capacity
        };
        Self {
            buffer: [0.0; N],
            head: 0,
            len: 0,
            capacity,
            kind,
        }
    }

    /// Create an empty buffer using the whole backing array.
    #[must_use]
    pub const fn with_full_capacity(kind: SeriesKind) -> Self {
        Self::new(N, kind)
    }

    /// Append a value, overwriting the oldest one when full.
    #[inline]
    pub fn push(&mut self, value: f32) {
        let tail = (self.head + self.len) % self.capacity;
        self.buffer[tail] = value;
        if self.len == self.capacity {
            self.head = (self.head + 1) % self.capacity;
        } else {
            self.len += 1;
        }
    }

    /// Arithmetic mean of the held values, `0.0` when empty.
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.len == 0 {
            return 0.0;
        }
        let sum: f64 = self.iter().map(f64::from).sum();
        (sum / self.len as f64) as f32
    }

    /// Copy of the held values, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> heapless::Vec<f32, N> {
        self.iter().collect()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.len).map(move |i| self.buffer[(self.head + i) % self.capacity])
    }

    /// Oldest held value
    #[must_use]
    pub fn oldest(&self) -> Option<f32> {
        (self.len > 0).then(|| self.buffer[self.head])
    }

    /// Most recently pushed value
    #[must_use]
    pub fn latest(&self) -> Option<f32> {
        (self.len > 0).then(|| self.buffer[(self.head + self.len - 1) % self.capacity])
    }

    /// Drop all values without touching the backing array's size.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Number of held values
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if no values are held
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if the next push overwrites the oldest value
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Logical capacity
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Series held by this buffer
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> SeriesKind {
        self.kind
    }
}
