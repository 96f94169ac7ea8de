//! Bounded FIFO retention buffer

use std::collections::VecDeque;

/// Initial allocation; the buffer grows on demand up to its capacity
const INITIAL_ALLOCATION: usize = 1024;

/// Fixed-capacity buffer keeping the most recently pushed items
///
/// Items are kept in insertion order; pushing beyond capacity evicts the
/// oldest item.
#[derive(Debug, Clone)]
pub struct RetentionBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RetentionBuffer<T> {
    /// Create an empty buffer; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(INITIAL_ALLOCATION)),
            capacity,
        }
    }

    /// Append at the tail, returning the evicted head if the buffer overflowed
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// Last `limit` items in insertion order (most recent last)
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(limit);
        self.items.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
