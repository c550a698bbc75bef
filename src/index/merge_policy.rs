//! Merge policies for segment management.
//!
//! A merge policy looks at the current segment list and picks runs of
//! adjacent segments to merge into one. Merged segments always replace the
//! run in place, so document order is preserved.

use std::collections::HashMap;
use std::ops::Range;

use crate::index::segment_info::SegmentInfo;

/// Trait for defining merge policies.
pub trait MergePolicy: Send + Sync + std::fmt::Debug {
    /// Runs of adjacent segments to merge after a flush, in increasing order
    /// and without overlap.
    fn find_merges(&self, segments: &[SegmentInfo]) -> Vec<Range<usize>>;

    /// Runs to merge so that at most `max_segments` remain.
    fn find_merges_for_optimize(&self, segments: &[SegmentInfo], max_segments: usize) -> Vec<Range<usize>>;

    /// Get policy configuration as key-value pairs for debugging.
    fn get_config(&self) -> HashMap<String, String>;
}

/// Width of a level on the log scale.
const LEVEL_LOG_SPAN: f64 = 0.75;

/// Groups segments into levels by the logarithm of their document count and
/// merges `merge_factor` segments of the same level at a time.
#[derive(Debug, Clone)]
pub struct LogDocMergePolicy {
    /// Number of same-level segments merged at once.
    pub merge_factor: usize,

    /// Segments smaller than this all count as the lowest level.
    pub min_merge_docs: u32,

    /// Segments at or above this size are never merged.
    pub max_merge_docs: u32,
}

impl Default for LogDocMergePolicy {
    fn default() -> Self {
        LogDocMergePolicy {
            merge_factor: 10,
            min_merge_docs: 10,
            max_merge_docs: u32::MAX,
        }
    }
}

impl LogDocMergePolicy {
    /// Create a policy with the given merge factor and lowest level size.
    pub fn new(merge_factor: usize, min_merge_docs: u32) -> Self {
        LogDocMergePolicy {
            merge_factor: merge_factor.max(2),
            min_merge_docs,
            ..Default::default()
        }
    }

    fn level(&self, doc_count: u32) -> f64 {
        let norm = (self.merge_factor as f64).ln();
        (doc_count.max(1) as f64).ln() / norm
    }
}

impl MergePolicy for LogDocMergePolicy {
    fn find_merges(&self, segments: &[SegmentInfo]) -> Vec<Range<usize>> {
        let levels: Vec<f64> = segments.iter().map(|s| self.level(s.doc_count)).collect();
        let level_floor = if self.min_merge_docs == 0 {
            0.0
        } else {
            self.level(self.min_merge_docs)
        };

        let mut merges = Vec::new();
        let mut start = 0;
        while start < segments.len() {
            // Highest level among the remaining segments.
            let max_level = levels[start..]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);

            let level_bottom = if max_level < level_floor {
                -1.0
            } else {
                let bottom = max_level - LEVEL_LOG_SPAN;
                if bottom < level_floor { level_floor } else { bottom }
            };

            // Last segment still within the level.
            let mut upto = segments.len() - 1;
            while upto > start && levels[upto] < level_bottom {
                upto -= 1;
            }

            let mut end = start + self.merge_factor;
            while end <= upto + 1 {
                let too_large = segments[start..end]
                    .iter()
                    .any(|s| s.doc_count >= self.max_merge_docs);
                if !too_large {
                    merges.push(start..end);
                }
                start = end;
                end = start + self.merge_factor;
            }
            start = upto + 1;
        }
        merges
    }

    fn find_merges_for_optimize(&self, segments: &[SegmentInfo], max_segments: usize) -> Vec<Range<usize>> {
        let max_segments = max_segments.max(1);
        let optimized = segments.len() <= max_segments
            && (segments.len() != 1 || !segments[0].has_deletions());
        if optimized {
            return Vec::new();
        }
        // Merge the tail so that exactly `max_segments` remain.
        let keep = if segments.len() > max_segments { max_segments - 1 } else { 0 };
        vec![keep..segments.len()]
    }

    fn get_config(&self) -> HashMap<String, String> {
        let mut config = HashMap::new();
        config.insert("type".to_string(), "log_doc".to_string());
        config.insert("merge_factor".to_string(), self.merge_factor.to_string());
        config.insert("min_merge_docs".to_string(), self.min_merge_docs.to_string());
        config.insert("max_merge_docs".to_string(), self.max_merge_docs.to_string());
        config
    }
}
