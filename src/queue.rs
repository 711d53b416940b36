//! Fixed-capacity blocking FIFO shared between pipeline roles.
//!
//! [`BoundedQueue`] is the only structure shared across threads in the
//! pipeline. Every item moves through it by value, so whoever holds an item
//! owns it: the producer before `push`, the queue while enqueued and the
//! consumer after `pop`.
//!
//! # Example
//! ```
//! use av_recorder::queue::{BoundedQueue, TryPushError};
//!
//! let queue = BoundedQueue::new(2);
//! queue.try_push(1).unwrap();
//! queue.try_push(2).unwrap();
//! assert!(matches!(queue.try_push(3), Err(TryPushError::Full(3))));
//!
//! queue.close();
//! assert_eq!(queue.pop(), Some(1));
//! assert_eq!(queue.pop(), Some(2));
//! assert_eq!(queue.pop(), None);
//! ```
use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};

/// Returned by [`BoundedQueue::push`] when the queue is closed. The rejected item is handed back.
#[derive(thiserror::Error, Eq, PartialEq, Clone, Copy)]
pub enum PushError<T> {
    #[error("Queue is closed")]
    Closed(T),
}

impl<T> PushError<T> {
    /// Takes back ownership of the rejected item.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closed(..)")
    }
}

/// Returned by [`BoundedQueue::try_push`]. In both cases the caller keeps the item.
#[derive(thiserror::Error, Eq, PartialEq, Clone, Copy)]
pub enum TryPushError<T> {
    #[error("Queue is full")]
    Full(T),
    #[error("Queue is closed")]
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Takes back ownership of the rejected item.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Anything that can be closed by the shutdown controller.
pub trait Close: Send + Sync {
    /// Closes the resource and wakes every thread blocked on it. Must be idempotent.
    fn close(&self);
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A thread-safe FIFO holding at most `capacity` items.
///
/// `push` blocks while the queue is full, `try_push` fails fast, and `pop` blocks while
/// the queue is empty. After [`close`](Self::close) no new items are accepted, but items
/// already enqueued stay poppable until drained; after that `pop` returns `None`.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates an open, empty queue.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    #[inline]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be non-zero");

        Self {
            state: Mutex::new(State { items: VecDeque::with_capacity(capacity), closed: false }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueues `item`, blocking while the queue is full and open.
    ///
    /// Fails without enqueuing if the queue is closed when the wait resolves, including
    /// when it is closed while this call is blocked.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();

        while !state.closed && state.items.len() == self.capacity {
            self.not_full.wait(&mut state);
        }

        if state.closed {
            return Err(PushError::Closed(item));
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();

        Ok(())
    }

    /// Enqueues `item` if there is room, never blocking.
    #[inline]
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(TryPushError::Closed(item));
        }
        if state.items.len() == self.capacity {
            return Err(TryPushError::Full(item));
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();

        Ok(())
    }

    /// Dequeues the oldest item, blocking while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and fully drained (end of stream). Every
    /// later call returns `None` immediately.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();

        while !state.closed && state.items.is_empty() {
            self.not_empty.wait(&mut state);
        }

        let item = state.items.pop_front()?;
        drop(state);
        self.not_full.notify_one();

        Some(item)
    }

    /// Number of items currently enqueued.
    #[must_use]
    #[inline]
    pub fn size(&self) -> usize {
        self.state.lock().items.len()
    }

    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Marks the queue closed and wakes every blocked `push` and `pop`.
    ///
    /// Already enqueued items are kept. Calling this more than once has no further effect.
    #[inline]
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl<T: Send> Close for BoundedQueue<T> {
    #[inline]
    fn close(&self) {
        Self::close(self);
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedQueue")
            .field("size", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}
