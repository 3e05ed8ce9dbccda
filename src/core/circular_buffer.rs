use std::collections::VecDeque;

/// Fixed-capacity ring buffer.
///
/// A small wrapper around `VecDeque`:
/// - `push` is O(1) and evicts from the front when full, handing the evicted item back.
/// - Memory usage is bounded by `capacity`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircularBuffer<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the entry evicted to make room.
    ///
    /// With capacity 0 nothing is stored and `item` itself comes back.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }

        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(item);
        evicted
    }

    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.buffer.back()
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.buffer.pop_front()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.buffer.iter()
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.buffer.drain(..)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl<'a, T> IntoIterator for &'a CircularBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffer.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest_when_full() {
        let mut buf = CircularBuffer::new(2);
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert!(buf.is_full());
        assert_eq!(buf.push(3), Some(1));
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buf = CircularBuffer::new(0);
        assert_eq!(buf.push("a"), Some("a"));
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_yields_fifo_and_empties() {
        let mut buf = CircularBuffer::new(4);
        for n in 0..4 {
            buf.push(n);
        }
        let drained: Vec<_> = buf.drain().collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(buf.is_empty());
    }
}
