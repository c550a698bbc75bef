//! Levenshtein edit distance.
//!
//! Distances are measured over `char`s. The bounded variant gives up as soon
//! as every cell of a row exceeds the limit, which is what fuzzy term
//! enumeration needs when scanning a whole term dictionary.

use std::cmp::min;

/// Edit distance between two strings.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    bounded_distance(&a, &b, usize::MAX).unwrap_or(usize::MAX)
}

/// Edit distance between two char slices, or `None` once it is known to be
/// greater than `max_distance`.
pub fn bounded_distance(a: &[char], b: &[char], max_distance: usize) -> Option<usize> {
    let (n, m) = (a.len(), b.len());
    if n.abs_diff(m) > max_distance {
        return None;
    }
    if n == 0 {
        return Some(m);
    }
    if m == 0 {
        return Some(n);
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        let mut best = i;
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = min(min(prev[j] + 1, curr[j - 1] + 1), prev[j - 1] + cost);
            best = min(best, curr[j]);
        }
        if best > max_distance {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[m];
    (distance <= max_distance).then_some(distance)
}
