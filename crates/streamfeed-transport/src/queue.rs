use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A thread-safe FIFO with a fixed capacity.
///
/// `push` blocks while the queue is full and `pop` blocks while it is empty,
/// which gives producers backpressure from slower consumers. Values are moved
/// in and out, never cloned. Each queue has its own lock, so operations on
/// one queue never wait on another.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    pushed: Condvar,
    popped: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue with no practical capacity limit.
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Create a queue holding at most `capacity` elements.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            pushed: Condvar::new(),
            popped: Condvar::new(),
        }
    }

    /// Append `value`, blocking until there is room.
    pub fn push(&self, value: T) {
        let guard = self.lock();
        let mut items = self
            .popped
            .wait_while(guard, |items| items.len() >= self.capacity)
            .unwrap_or_else(PoisonError::into_inner);
        items.push_back(value);
        drop(items);
        self.pushed.notify_one();
    }

    /// Append `value` if there is room, otherwise hand it back.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            return Err(value);
        }
        items.push_back(value);
        drop(items);
        self.pushed.notify_one();
        Ok(())
    }

    /// Remove and return the oldest element, blocking until one exists.
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(value) = items.pop_front() {
                drop(items);
                self.popped.notify_one();
                return value;
            }
            items = self
                .pushed
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Discard every queued element.
    pub fn clear(&self) {
        self.lock().clear();
        self.popped.notify_all();
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of elements the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Every critical section leaves the deque valid, so a poisoned lock is
        // still safe to use.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
