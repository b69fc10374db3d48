//! Recency queue for combined mixing
//!
//! One queue exists per participant. The receive loop appends decoded
//! frames, the mixer drains them; both sides run concurrently, so the
//! queue is lock-free (multiple-producer, single-consumer usage of
//! crossbeam's `SegQueue`). Entries that outlive the recency window are
//! discarded at drain time, never mixed.

use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Queue of `(captured_at, frame)` entries awaiting the mixer
pub struct RecencyQueue {
    queue: SegQueue<(Instant, Vec<i16>)>,
    /// Entries dropped for exceeding the recency window
    discarded: AtomicUsize,
}

impl RecencyQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            discarded: AtomicUsize::new(0),
        }
    }

    /// Append a decoded frame captured at `captured_at`
    pub fn push(&self, captured_at: Instant, frame: Vec<i16>) {
        self.queue.push((captured_at, frame));
    }

    /// Pop the oldest entry still inside the recency window
    ///
    /// Entries older than `window` relative to `now` are discarded on
    /// the way. Returns `None` if nothing fresh remains.
    pub fn pop_fresh(&self, now: Instant, window: Duration) -> Option<Vec<i16>> {
        while let Some((captured_at, frame)) = self.queue.pop() {
            if now.saturating_duration_since(captured_at) <= window {
                return Some(frame);
            }
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Whether the queue currently holds no entries
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Entries dropped for staleness so far
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Default for RecencyQueue {
    fn default() -> Self {
        Self::new()
    }
}
