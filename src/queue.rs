use std::collections::{vec_deque, VecDeque};

/// Bounded FIFO.
#[derive(Debug, Clone)]
pub struct Queue<T: Clone> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn try_push(&mut self, item: T) -> Option<T> {
        if self.is_full() {
            return Some(item);
        }

        self.data.push_back(item);
        None
    }

    pub fn try_pop(&mut self) -> Option<T> {
        self.data.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.data.front()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> vec_deque::IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Remove items from the back while `f` holds. Returned oldest first.
    pub fn pop_back_while<F>(&mut self, mut f: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut popped = Vec::new();
        while self.data.back().map_or(false, &mut f) {
            popped.extend(self.data.pop_back());
        }
        popped.reverse();
        popped
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.data.retain(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity() {
        let mut q = Queue::new(2);
        assert_eq!(q.try_push(1), None);
        assert_eq!(q.try_push(2), None);
        assert!(q.is_full());
        assert_eq!(q.try_push(3), Some(3));
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_push(3), None);
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_pop_back_while() {
        let mut q = Queue::new(8);
        for i in 0..5 {
            assert_eq!(q.try_push(i), None);
        }

        assert_eq!(q.pop_back_while(|&x| x >= 2), vec![2, 3, 4]);
        assert_eq!(q.pop_back_while(|&x| x >= 2), Vec::<i32>::new());
        assert_eq!(q.len(), 2);
    }
}
