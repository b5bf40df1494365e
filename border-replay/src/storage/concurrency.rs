//! Counters of the write cursor and running maximum, for one or many writers.
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
};

/// Selects how the scalar counters of a buffer are updated.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum ConcurrencyMode {
    /// Plain loads and stores. Only one thread may write at a time.
    SingleWriter,

    /// Atomic read-modify-write operations. Many threads may reserve slots
    /// concurrently through a [`SharedWriter`](super::SharedWriter).
    MultiWriter,
}

impl Default for ConcurrencyMode {
    fn default() -> Self {
        Self::SingleWriter
    }
}

impl ConcurrencyMode {
    /// Returns `true` for [`ConcurrencyMode::MultiWriter`].
    pub fn is_multi_writer(&self) -> bool {
        matches!(self, Self::MultiWriter)
    }

    /// Builds the cursor and stored-size counters of a ring of `capacity`
    /// slots for this mode.
    pub fn counters(&self, capacity: usize) -> Box<dyn WriteCounters> {
        match self {
            Self::SingleWriter => Box::new(PlainCounters::new(capacity)),
            Self::MultiWriter => Box::new(AtomicCounters::new(capacity)),
        }
    }

    /// Builds a running maximum for this mode, starting at `init`.
    pub fn running_max(&self, init: f32) -> Box<dyn RunningMax> {
        match self {
            Self::SingleWriter => Box::new(PlainMax(AtomicU32::new(init.to_bits()))),
            Self::MultiWriter => Box::new(AtomicMax(AtomicU32::new(init.to_bits()))),
        }
    }
}

/// Write cursor and number of stored items of a ring buffer.
///
/// Cursors are raw (unwrapped) positions; slot `i` of the ring is hit by every
/// position congruent to `i` modulo the capacity. A reservation never covers a
/// slot of a run that is reserved but not yet published.
pub trait WriteCounters: Send + Sync + Debug {
    /// Number of slots of the ring.
    fn capacity(&self) -> usize;

    /// Reserves `count` slots and returns the raw cursor before the
    /// reservation.
    ///
    /// Returns `None` if the run would overwrite slots still being written, or
    /// if `count` exceeds the capacity.
    fn try_reserve(&self, count: usize) -> Option<usize>;

    /// Makes the run of `count` slots reserved at `start` visible to
    /// [`WriteCounters::stored_size`].
    ///
    /// Runs are published in the order they were reserved; this call waits
    /// for the runs reserved before `start`.
    fn publish(&self, start: usize, count: usize);

    /// Number of valid slots, at most the capacity.
    fn stored_size(&self) -> usize;

    /// Raw cursor of the next reservation.
    fn next_index(&self) -> usize;

    /// Resets the counters to zero.
    fn reset(&self);
}

/// Monotonic running maximum of `f32` values.
pub trait RunningMax: Send + Sync + Debug {
    /// Current maximum.
    fn load(&self) -> f32;

    /// Raises the maximum to `v` if `v` is larger. NaN is ignored.
    fn store_max(&self, v: f32);

    /// Overwrites the maximum with `v`.
    fn reset(&self, v: f32);
}

// Relaxed loads and stores without read-modify-write; a single writer only,
// so nothing is in flight when a reservation is made.
#[derive(Debug)]
struct PlainCounters {
    capacity: usize,
    next_index: AtomicUsize,
    stored_size: AtomicUsize,
}

impl PlainCounters {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_index: AtomicUsize::new(0),
            stored_size: AtomicUsize::new(0),
        }
    }
}

impl WriteCounters for PlainCounters {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn try_reserve(&self, count: usize) -> Option<usize> {
        if count > self.capacity {
            return None;
        }
        let i = self.next_index.load(Ordering::Relaxed);
        self.next_index.store(i.wrapping_add(count), Ordering::Relaxed);
        Some(i)
    }

    fn publish(&self, _start: usize, count: usize) {
        let n = self.stored_size.load(Ordering::Relaxed);
        self.stored_size.store(
            n.saturating_add(count).min(self.capacity),
            Ordering::Relaxed,
        );
    }

    fn stored_size(&self) -> usize {
        self.stored_size.load(Ordering::Relaxed)
    }

    fn next_index(&self) -> usize {
        self.next_index.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.next_index.store(0, Ordering::Relaxed);
        self.stored_size.store(0, Ordering::Relaxed);
    }
}

// `published` is the raw position up to which all runs are written. Runs in
// flight all lie in `[published, next_index)`, so a reservation keeping
// `next_index - published <= capacity` cannot lap any of them.
#[derive(Debug)]
struct AtomicCounters {
    capacity: usize,
    next_index: AtomicUsize,
    published: AtomicUsize,
    stored_size: AtomicUsize,
}

impl AtomicCounters {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_index: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            stored_size: AtomicUsize::new(0),
        }
    }
}

impl WriteCounters for AtomicCounters {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn try_reserve(&self, count: usize) -> Option<usize> {
        // `published` is loaded first: a stale value only makes the check
        // stricter, while a cursor older than it would underflow.
        let published = self.published.load(Ordering::Acquire);
        let mut current = self.next_index.load(Ordering::Acquire);
        loop {
            let in_flight = current.wrapping_sub(published);
            if in_flight.saturating_add(count) > self.capacity {
                return None;
            }
            match self.next_index.compare_exchange_weak(
                current,
                current.wrapping_add(count),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current),
                Err(actual) => current = actual,
            }
        }
    }

    fn publish(&self, start: usize, count: usize) {
        while self.published.load(Ordering::Acquire) != start {
            std::thread::yield_now();
        }
        let n = self.stored_size.load(Ordering::Relaxed);
        self.stored_size.store(
            n.saturating_add(count).min(self.capacity),
            Ordering::Release,
        );
        // The release store is the publication point of the field writes.
        self.published
            .store(start.wrapping_add(count), Ordering::Release);
    }

    fn stored_size(&self) -> usize {
        self.stored_size.load(Ordering::Acquire)
    }

    fn next_index(&self) -> usize {
        self.next_index.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.next_index.store(0, Ordering::Release);
        self.published.store(0, Ordering::Release);
        self.stored_size.store(0, Ordering::Release);
    }
}

#[derive(Debug)]
struct PlainMax(AtomicU32);

impl RunningMax for PlainMax {
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store_max(&self, v: f32) {
        if self.load() < v {
            self.0.store(v.to_bits(), Ordering::Relaxed);
        }
    }

    fn reset(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct AtomicMax(AtomicU32);

impl RunningMax for AtomicMax {
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store_max(&self, v: f32) {
        let mut current = self.0.load(Ordering::Acquire);
        while f32::from_bits(current) < v {
            match self.0.compare_exchange_weak(
                current,
                v.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn reset(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Release);
    }
}
