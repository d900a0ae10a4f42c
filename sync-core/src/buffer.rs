//! Outgoing message queue for ressync.
//!
//! This module provides the queue a connection-based backend funnels its
//! operations through:
//! - FIFO ordering for delivery
//! - Snapshot draining: a flush takes everything queued *so far*, anything
//!   enqueued during the flush waits for the next one
//! - Max size limits to prevent unbounded memory growth while offline

use std::collections::VecDeque;

/// Default capacity of an outgoing queue.
pub const DEFAULT_MAX_OUTGOING: usize = 10_000;

/// Error type for buffer operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Buffer is at capacity.
    Full {
        /// Current buffer capacity.
        capacity: usize,
    },
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::Full { capacity } => {
                write!(f, "outgoing queue full (capacity: {})", capacity)
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// FIFO of messages waiting for a connection.
///
/// Messages flow through the queue in this order:
/// 1. `enqueue()` - add to the tail
/// 2. `take_snapshot()` - remove everything queued so far, in order
#[derive(Debug)]
pub struct OutgoingQueue<T> {
    /// Maximum number of queued messages.
    max_size: usize,
    /// Messages waiting to be sent.
    queue: VecDeque<T>,
}

impl<T> OutgoingQueue<T> {
    /// Create a new queue with the given maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            queue: VecDeque::new(),
        }
    }

    /// Add a message to the tail of the queue.
    ///
    /// Returns an error if the queue is full.
    pub fn enqueue(&mut self, msg: T) -> Result<(), BufferError> {
        if self.queue.len() >= self.max_size {
            return Err(BufferError::Full {
                capacity: self.max_size,
            });
        }
        self.queue.push_back(msg);
        Ok(())
    }

    /// Remove and return every queued message, oldest first.
    ///
    /// The queue is empty afterwards.
    pub fn take_snapshot(&mut self) -> Vec<T> {
        self.queue.drain(..).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of queued messages.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Drop all queued messages.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl<T> Default for OutgoingQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTGOING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_holds_messages() {
        let mut queue = OutgoingQueue::new(100);

        queue.enqueue("a").unwrap();

        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());
    }

    #[test]
    fn queue_respects_max_size() {
        let mut queue = OutgoingQueue::new(2);

        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        let overflow = queue.enqueue(3);

        assert_eq!(overflow, Err(BufferError::Full { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn snapshot_is_fifo_and_empties_queue() {
        let mut queue = OutgoingQueue::new(100);
        queue.enqueue("first").unwrap();
        queue.enqueue("second").unwrap();
        queue.enqueue("third").unwrap();

        let snapshot = queue.take_snapshot();

        assert_eq!(snapshot, vec!["first", "second", "third"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn messages_after_snapshot_wait_for_next_one() {
        let mut queue = OutgoingQueue::new(100);
        queue.enqueue(1).unwrap();

        let first = queue.take_snapshot();
        queue.enqueue(2).unwrap();

        assert_eq!(first, vec![1]);
        assert_eq!(queue.take_snapshot(), vec![2]);
    }

    #[test]
    fn snapshot_frees_space() {
        let mut queue = OutgoingQueue::new(1);
        queue.enqueue(1).unwrap();
        assert!(queue.enqueue(2).is_err());

        queue.take_snapshot();

        assert!(queue.enqueue(2).is_ok());
    }

    #[test]
    fn empty_snapshot() {
        let mut queue: OutgoingQueue<u8> = OutgoingQueue::default();
        assert!(queue.take_snapshot().is_empty());
        assert_eq!(queue.capacity(), DEFAULT_MAX_OUTGOING);
    }

    #[test]
    fn clear_removes_all() {
        let mut queue = OutgoingQueue::new(100);
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        queue.clear();

        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn error_display() {
        let err = BufferError::Full { capacity: 8 };
        assert_eq!(err.to_string(), "outgoing queue full (capacity: 8)");
    }
}
