//! Heap laws of the bounded priority queue.

use pilum::util::priority_queue::PriorityQueue;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn int_queue(max_size: usize) -> PriorityQueue<i64> {
    PriorityQueue::new(max_size, |a: &i64, b: &i64| a < b)
}

fn checked_sum(seed: u64, count: usize) -> (i64, Vec<i64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pq = int_queue(count);
    let mut sum = 0;
    for _ in 0..count {
        let value: i64 = rng.random_range(-1_000_000..1_000_000);
        sum += value;
        pq.put(value);
    }
    (sum, pq.into_sorted_vec())
}

#[test]
fn test_pop_keeps_every_element() {
    let (sum, popped) = checked_sum(42, 10_000);
    let (again, popped_again) = checked_sum(42, 10_000);
    assert_eq!(sum, again);
    assert_eq!(popped, popped_again);
    assert_eq!(popped.len(), 10_000);
    assert_eq!(popped.iter().sum::<i64>(), sum);
    assert!(popped.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_clear_then_reuse() {
    let mut pq = int_queue(4);
    for v in [4, 2, 8] {
        pq.put(v);
    }
    pq.clear();
    assert!(pq.is_empty());
    assert_eq!(pq.top(), None);
    pq.put(5);
    assert_eq!(pq.pop(), Some(5));
    assert_eq!(pq.pop(), None);
}

proptest! {
    #[test]
    fn prop_top_is_minimum(values in prop::collection::vec(any::<i64>(), 1..200)) {
        let mut pq = int_queue(values.len());
        let mut seen = Vec::new();
        for v in values {
            pq.put(v);
            seen.push(v);
            prop_assert_eq!(pq.top().copied(), seen.iter().min().copied());
        }
    }

    #[test]
    fn prop_overflow_keeps_the_largest(
        capacity in 1usize..20,
        values in prop::collection::vec(-1000i64..1000, 0..100),
    ) {
        let mut pq = int_queue(capacity);
        let mut evicted = Vec::new();
        for &v in &values {
            if let Some(out) = pq.insert_with_overflow(v) {
                evicted.push(out);
            }
        }
        prop_assert_eq!(pq.size(), values.len().min(capacity));
        if let Some(&top) = pq.top() {
            prop_assert!(evicted.iter().all(|&e| e <= top));
        }

        let mut expected = values.clone();
        expected.sort_unstable();
        let kept = expected.split_off(expected.len() - pq.size());
        prop_assert_eq!(pq.into_sorted_vec(), kept);
    }

    #[test]
    fn prop_pops_are_non_decreasing(values in prop::collection::vec(any::<i32>(), 0..300)) {
        let mut pq = PriorityQueue::unbounded(|a: &i32, b: &i32| a < b);
        for &v in &values {
            pq.put(v);
        }
        let mut previous = None;
        while let Some(v) = pq.pop() {
            if let Some(p) = previous {
                prop_assert!(p <= v);
            }
            previous = Some(v);
        }
    }
}
