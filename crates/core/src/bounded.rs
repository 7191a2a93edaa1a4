use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Append-only log that keeps the most recent `capacity` items, evicting from the head.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLog<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::new(),
        }
    }

    /// Keeps the last `capacity` of `items`, in order.
    pub fn from_items(capacity: usize, items: impl IntoIterator<Item = T>) -> Self {
        let mut log = Self::new(capacity);
        for item in items {
            log.push(item);
        }
        log
    }

    /// Appends and returns the evicted oldest item, if the log was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The newest `n` items, oldest first.
    pub fn tail(&self, n: usize) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Serialize> Serialize for BoundedLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}
