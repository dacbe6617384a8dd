//! Bounded sample window
//!
//! Fixed-capacity FIFO buffer that always holds the most recently offered
//! elements, dropping the oldest one once full.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Concurrent drop-oldest window of recent samples.
#[derive(Debug)]
pub struct SampleWindow<T> {
    capacity: NonZeroUsize,
    samples: Mutex<VecDeque<T>>,
}

impl<T> SampleWindow<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity.get())),
        }
    }

    /// Insert a sample, returning the evicted one when the window was full.
    pub fn offer(&self, sample: T) -> Option<T> {
        let mut samples = self.samples.lock();
        let evicted = if samples.len() == self.capacity.get() {
            samples.pop_front()
        } else {
            None
        };
        samples.push_back(sample);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Drop all samples.
    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

impl<T: Clone> SampleWindow<T> {
    /// Point-in-time copy of the window, oldest first.
    ///
    /// The lock is released before the copy is returned so callers can fold
    /// it without blocking writers.
    pub fn contents(&self) -> Vec<T> {
        self.samples.lock().iter().cloned().collect()
    }
}
