use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity rolling history. Pushing past capacity evicts the oldest item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted one if the history was full
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }

        self.items.push_back(item);

        // Remove oldest if exceeds capacity
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent item
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn pop_last(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    /// Item `n` steps back from the most recent (`ago(0)` is the latest)
    pub fn ago(&self, n: usize) -> Option<&T> {
        let len = self.items.len();
        if n >= len {
            return None;
        }
        self.items.get(len - 1 - n)
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// The `n` most recent items, newest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().rev().take(n)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_limit() {
        let mut history = BoundedHistory::new(5);

        // Add 10 items
        for i in 0..10 {
            history.push(i);
        }

        assert_eq!(history.len(), 5); // Should only keep last 5
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![5, 6, 7, 8, 9]);
        assert!(history.is_full());
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut history = BoundedHistory::new(2);
        assert_eq!(history.push(1), None);
        assert_eq!(history.push(2), None);
        assert_eq!(history.push(3), Some(1));
    }

    #[test]
    fn test_ago_indexes_from_newest() {
        let mut history = BoundedHistory::new(10);
        for i in 0..4 {
            history.push(i * 10);
        }

        assert_eq!(history.ago(0), Some(&30));
        assert_eq!(history.ago(3), Some(&0));
        assert_eq!(history.ago(4), None);
        assert_eq!(history.recent(2).copied().collect::<Vec<_>>(), vec![30, 20]);
    }

    #[test]
    fn test_pop_last() {
        let mut history = BoundedHistory::new(3);
        history.push(1.0);
        history.push(2.0);

        assert_eq!(history.pop_last(), Some(2.0));
        assert_eq!(history.last(), Some(&1.0));
        history.clear();
        assert!(history.is_empty());
    }
}
