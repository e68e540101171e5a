//! A fixed-capacity, thread-safe ring buffer of samples.
//!
//! The acquisition thread pushes into it at sensor rate while consumers pop
//! or take snapshots on their own schedule. When the buffer is full the
//! oldest sample is overwritten, so a slow consumer loses history instead of
//! stalling the producer.
//!
//! A [`SampleBuffer`] is a handle: cloning it yields another handle to the
//! same ring, which is how the producer and a consumer share one.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

#[derive(Debug)]
struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// A cloneable handle to a bounded, overwrite-oldest ring buffer.
#[derive(Debug)]
pub struct SampleBuffer<T> {
    ring: Arc<Mutex<Ring<T>>>,
}

impl<T> Clone for SampleBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl<T: Clone> SampleBuffer<T> {
    /// Instantiates an empty buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        SampleBuffer {
            ring: Arc::new(Mutex::new(Ring {
                items: VecDeque::with_capacity(capacity),
                capacity,
            })),
        }
    }

    // No operation leaves the ring half-updated, so a panic in another
    // holder of the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Appends a sample, evicting the oldest one if the buffer is full.
    pub fn push(&self, item: T) {
        let mut ring = self.lock();
        if ring.capacity == 0 {
            return;
        }
        if ring.items.len() == ring.capacity {
            ring.items.pop_front();
        }
        ring.items.push_back(item);
    }

    /// Removes and returns the oldest sample.
    pub fn pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Returns a copy of the oldest sample.
    pub fn peek_front(&self) -> Option<T> {
        self.lock().items.front().cloned()
    }

    /// Returns a copy of the newest sample.
    pub fn peek_back(&self) -> Option<T> {
        self.lock().items.back().cloned()
    }

    /// Copies out every sample, oldest first. With `consume` the buffer is
    /// emptied under the same lock, so no sample is both returned and kept,
    /// and none pushed meanwhile is lost.
    pub fn extract(&self, consume: bool) -> Vec<T> {
        let mut ring = self.lock();
        if consume {
            ring.items.drain(..).collect()
        } else {
            ring.items.iter().cloned().collect()
        }
    }

    /// Drops every sample.
    pub fn clear(&self) {
        self.lock().items.clear();
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// `true` if no samples are held.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
