//! Bounded MPMC ingestion queue.
//!
//! The queue favours the newest data: when a bound is configured and the
//! queue is full, the oldest element is discarded to admit the push. The
//! terminal signal, [`BoundedQueue::stop_once_drained`], lets consumers
//! drain everything that was accepted before they observe the drained
//! sentinel; no element is silently dropped by shutdown.

use std::collections::VecDeque;

use log::trace;
use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    draining: bool,
}

/// FIFO with drop-oldest overflow and a stop-once-drained terminal signal.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
    limit: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `limit` elements. Zero means
    /// unbounded.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                draining: false,
            }),
            ready: Condvar::new(),
            limit,
        }
    }

    /// Enqueue `value`, discarding the oldest element when full.
    pub fn push(&self, value: T) {
        let mut inner = self.inner.lock();
        if self.limit > 0 && inner.items.len() == self.limit {
            inner.items.pop_front();
            trace!("BoundedQueue: full at {}, dropped oldest element", self.limit);
        }
        inner.items.push_back(value);
        self.ready.notify_one();
    }

    /// Block until an element is available or the queue is terminal and
    /// empty. Returns `None` only in the drained case.
    pub fn wait_and_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(value) = inner.items.pop_front() {
                return Some(value);
            }
            if inner.draining {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Mark the queue terminal and wake all waiters. Blocked pops keep
    /// returning elements until the queue is empty.
    pub fn stop_once_drained(&self) {
        let mut inner = self.inner.lock();
        inner.draining = true;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}
