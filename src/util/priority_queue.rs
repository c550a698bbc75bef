//! A binary min-heap ordered by a caller-supplied `less_than` predicate.
//!
//! This is the queue behind top-K hit collection, fuzzy term selection,
//! disjunction scoring and the N-way term merge. Unlike
//! [`std::collections::BinaryHeap`] it supports a fixed capacity with
//! replace-the-minimum overflow and in-place adjustment of the top element,
//! both of which the hot loops rely on.
//!
//! Slots are 1-indexed: `heap[1]` is the least element, `heap[0]` is never
//! used, and the backing storage holds `max(2, capacity + 1)` slots.
//!
//! # Example
//!
//! ```
//! use pilum::util::priority_queue::PriorityQueue;
//!
//! let mut pq = PriorityQueue::new(3, |a: &i32, b: &i32| a < b);
//! for v in [5, 1, 4, 2] {
//!     pq.insert_with_overflow(v);
//! }
//! // The three largest values survive; the smallest of them is on top.
//! assert_eq!(pq.top(), Some(&2));
//! assert_eq!(pq.size(), 3);
//! ```

use std::fmt;

/// Outcome of offering an element to a full or non-full queue.
enum Offer<T> {
    /// The element was stored without evicting anything.
    Added,
    /// The element replaced the previous top, which is returned.
    Replaced(T),
    /// The element was not stored and is handed back.
    Rejected(T),
}

/// A priority queue keeping its least element (by `less_than`) on top.
pub struct PriorityQueue<T, L = fn(&T, &T) -> bool>
where
    L: Fn(&T, &T) -> bool,
{
    heap: Vec<Option<T>>,
    size: usize,
    max_size: Option<usize>,
    less_than: L,
}

impl<T, L> PriorityQueue<T, L>
where
    L: Fn(&T, &T) -> bool,
{
    /// Create a queue holding at most `max_size` elements.
    pub fn new(max_size: usize, less_than: L) -> Self {
        let heap_size = if max_size == 0 { 2 } else { max_size + 1 };
        PriorityQueue {
            heap: (0..heap_size).map(|_| None).collect(),
            size: 0,
            max_size: Some(max_size),
            less_than,
        }
    }

    /// Create a queue whose storage grows on demand.
    pub fn unbounded(less_than: L) -> Self {
        PriorityQueue {
            heap: vec![None, None],
            size: 0,
            max_size: None,
            less_than,
        }
    }

    /// Maximum number of elements, or `None` for an unbounded queue.
    pub fn capacity(&self) -> Option<usize> {
        self.max_size
    }

    /// Number of elements currently stored.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the queue holds no elements.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Add an element, restoring heap order in O(log n).
    ///
    /// # Panics
    ///
    /// Panics if a bounded queue has no free slot. Use
    /// [`insert_with_overflow`](Self::insert_with_overflow) when the queue may
    /// be full.
    pub fn put(&mut self, element: T) {
        self.size += 1;
        if self.size >= self.heap.len() {
            match self.max_size {
                None => self.heap.push(None),
                Some(max) => panic!("priority queue overflow: capacity {max} exceeded"),
            }
        }
        self.heap[self.size] = Some(element);
        self.up_heap();
    }

    /// Offer an element to the queue.
    ///
    /// When the queue is not full the element is stored and `None` is
    /// returned. When it is full and the element is not less than the current
    /// top, the top is evicted, the element takes its place and the evicted
    /// element is returned. Otherwise the element itself is returned unchanged.
    pub fn insert_with_overflow(&mut self, element: T) -> Option<T> {
        match self.offer(element) {
            Offer::Added => None,
            Offer::Replaced(evicted) => Some(evicted),
            Offer::Rejected(element) => Some(element),
        }
    }

    /// Offer an element, reporting whether it was retained.
    ///
    /// Returns `true` when the element itself now lives in the queue, whether
    /// or not that displaced another element.
    pub fn insert(&mut self, element: T) -> bool {
        !matches!(self.offer(element), Offer::Rejected(_))
    }

    fn offer(&mut self, element: T) -> Offer<T> {
        let full = self.max_size.is_some_and(|max| self.size >= max);
        if !full {
            self.put(element);
            return Offer::Added;
        }
        let displaces_top = match &self.heap[1] {
            Some(top) if self.size > 0 => !(self.less_than)(&element, top),
            _ => false,
        };
        if displaces_top {
            let evicted = self.heap[1].replace(element);
            self.down_heap();
            match evicted {
                Some(evicted) => Offer::Replaced(evicted),
                None => Offer::Added,
            }
        } else {
            Offer::Rejected(element)
        }
    }

    /// The least element, in constant time.
    pub fn top(&self) -> Option<&T> {
        if self.size == 0 {
            None
        } else {
            self.heap[1].as_ref()
        }
    }

    /// Mutable access to the least element.
    ///
    /// Call [`adjust_top`](Self::adjust_top) after changing the element in a
    /// way that affects its ordering.
    pub fn top_mut(&mut self) -> Option<&mut T> {
        if self.size == 0 {
            None
        } else {
            self.heap[1].as_mut()
        }
    }

    /// Remove and return the least element in O(log n).
    pub fn pop(&mut self) -> Option<T> {
        if self.size == 0 {
            return None;
        }
        let result = self.heap[1].take();
        self.heap[1] = self.heap[self.size].take();
        self.size -= 1;
        self.down_heap();
        result
    }

    /// Restore heap order after the top element was modified in place.
    pub fn adjust_top(&mut self) {
        self.down_heap();
    }

    /// Remove every element, dropping each stored value.
    pub fn clear(&mut self) {
        for slot in self.heap.iter_mut().take(self.size + 1) {
            *slot = None;
        }
        self.size = 0;
    }

    /// Iterate over the stored elements in heap (not sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap[1..=self.size].iter().flatten()
    }

    /// Drain the queue into a vector in pop order, least element first.
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.size);
        while let Some(element) = self.pop() {
            out.push(element);
        }
        out
    }

    fn less_at(&self, a: usize, b: usize) -> bool {
        match (&self.heap[a], &self.heap[b]) {
            (Some(x), Some(y)) => (self.less_than)(x, y),
            _ => false,
        }
    }

    fn up_heap(&mut self) {
        let mut i = self.size;
        let node = self.heap[i].take();
        let mut j = i >> 1;
        while j > 0 {
            let moves_up = match (&node, &self.heap[j]) {
                (Some(n), Some(parent)) => (self.less_than)(n, parent),
                _ => false,
            };
            if !moves_up {
                break;
            }
            self.heap[i] = self.heap[j].take();
            i = j;
            j >>= 1;
        }
        self.heap[i] = node;
    }

    fn down_heap(&mut self) {
        let mut i = 1;
        let Some(node) = self.heap[i].take() else {
            return;
        };
        let mut j = i << 1;
        let mut k = j + 1;
        if k <= self.size && self.less_at(k, j) {
            j = k;
        }
        while j <= self.size {
            let child_smaller = match &self.heap[j] {
                Some(child) => (self.less_than)(child, &node),
                None => false,
            };
            if !child_smaller {
                break;
            }
            self.heap[i] = self.heap[j].take();
            i = j;
            j = i << 1;
            k = j + 1;
            if k <= self.size && self.less_at(k, j) {
                j = k;
            }
        }
        self.heap[i] = Some(node);
    }
}

impl<T: fmt::Debug, L> fmt::Debug for PriorityQueue<T, L>
where
    L: Fn(&T, &T) -> bool,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("size", &self.size)
            .field("max_size", &self.max_size)
            .field("elements", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_queue(max_size: usize) -> PriorityQueue<i32> {
        PriorityQueue::new(max_size, |a: &i32, b: &i32| a < b)
    }

    #[test]
    fn test_pop_orders_ascending() {
        let mut pq = int_queue(8);
        for v in [7, 3, 9, 1, 5, 3] {
            pq.put(v);
        }
        assert_eq!(pq.top(), Some(&1));

        let popped = pq.into_sorted_vec();
        assert_eq!(popped, vec![1, 3, 3, 5, 7, 9]);
    }

    #[test]
    fn test_insert_with_overflow_capacity_three() {
        let mut pq = int_queue(3);
        let results: Vec<Option<i32>> = [2, 3, 1, 5, 7, 1]
            .into_iter()
            .map(|v| pq.insert_with_overflow(v))
            .collect();

        assert_eq!(results, vec![None, None, None, Some(1), Some(2), Some(1)]);
        assert_eq!(pq.size(), 3);
        assert_eq!(pq.top(), Some(&3));
    }

    #[test]
    fn test_insert_with_overflow_capacity_four() {
        let mut pq = int_queue(4);
        let results: Vec<Option<i32>> = [2, 3, 1, 5, 7, 1]
            .into_iter()
            .map(|v| pq.insert_with_overflow(v))
            .collect();

        assert_eq!(results, vec![None, None, None, None, Some(1), Some(1)]);
        assert_eq!(pq.size(), 4);
        assert_eq!(pq.top(), Some(&2));
    }

    #[test]
    fn test_insert_reports_identity() {
        #[derive(Debug, PartialEq)]
        struct Tagged {
            value: i32,
            tag: &'static str,
        }

        let mut pq = PriorityQueue::new(1, |a: &Tagged, b: &Tagged| a.value < b.value);
        assert!(pq.insert(Tagged { value: 4, tag: "first" }));
        // An equal element is not less than the top, so it displaces it.
        assert!(pq.insert(Tagged { value: 4, tag: "second" }));
        assert_eq!(pq.top().map(|t| t.tag), Some("second"));
        // A smaller element is rejected.
        assert!(!pq.insert(Tagged { value: 1, tag: "third" }));
        assert_eq!(pq.top().map(|t| t.tag), Some("second"));
    }

    #[test]
    fn test_adjust_top() {
        let mut pq = int_queue(4);
        for v in [1, 4, 6, 8] {
            pq.put(v);
        }
        if let Some(top) = pq.top_mut() {
            *top = 7;
        }
        pq.adjust_top();
        assert_eq!(pq.top(), Some(&4));
        assert_eq!(pq.into_sorted_vec(), vec![4, 6, 7, 8]);
    }

    #[test]
    fn test_clear_drops_elements() {
        use std::sync::Arc;

        let shared = Arc::new(());
        let mut pq = PriorityQueue::new(4, |a: &(u8, Arc<()>), b: &(u8, Arc<()>)| a.0 < b.0);
        for i in 0..4 {
            pq.put((i, Arc::clone(&shared)));
        }
        assert_eq!(Arc::strong_count(&shared), 5);

        pq.clear();
        assert!(pq.is_empty());
        assert_eq!(pq.top(), None);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_empty_queue() {
        let mut pq = int_queue(0);
        assert_eq!(pq.pop(), None);
        assert_eq!(pq.top(), None);
        assert_eq!(pq.insert_with_overflow(3), Some(3));
    }

    #[test]
    fn test_unbounded_grows() {
        let mut pq = PriorityQueue::unbounded(|a: &u32, b: &u32| a > b);
        for v in 0..100 {
            assert_eq!(pq.insert_with_overflow(v), None);
        }
        assert_eq!(pq.size(), 100);
        assert_eq!(pq.top(), Some(&99));
        assert_eq!(pq.capacity(), None);
    }

    #[test]
    #[should_panic(expected = "capacity 2 exceeded")]
    fn test_put_past_capacity_panics() {
        let mut pq = int_queue(2);
        pq.put(1);
        pq.put(2);
        pq.put(3);
    }
}
