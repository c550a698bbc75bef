//! Scoring formulas.
//!
//! A [`Similarity`] supplies the factors of the classic vector-space score:
//!
//! ```text
//! score(q, d) = coord(q, d) · queryNorm(q) · Σ tf(t in d) · idf(t)² · boost(t) · norm(t, d)
//! ```
//!
//! Norms are computed when a document is indexed and stored in one byte per
//! field and document, so [`encode_norm`](Similarity::encode_norm) and
//! [`decode_norm`](Similarity::decode_norm) are lossy.

use std::fmt::Debug;

use lazy_static::lazy_static;

use crate::util::small_float::{byte315_to_float, float_to_byte315};

lazy_static! {
    static ref NORM_TABLE: [f32; 256] = {
        let mut table = [0.0f32; 256];
        for (b, slot) in table.iter_mut().enumerate() {
            *slot = byte315_to_float(b as u8);
        }
        table
    };
}

/// Scoring factors used at indexing and search time.
pub trait Similarity: Send + Sync + Debug {
    /// Normalization for a field with `num_terms` tokens.
    fn length_norm(&self, field: &str, num_terms: usize) -> f32;

    /// Factor applied to every weight of a query so scores are comparable
    /// across queries.
    fn query_norm(&self, sum_of_squared_weights: f32) -> f32;

    /// Score factor for a term occurring `freq` times in a document.
    fn tf(&self, freq: f32) -> f32;

    /// Score factor for a term occurring in `doc_freq` of `max_docs`
    /// documents.
    fn idf(&self, doc_freq: u32, max_docs: u32) -> f32;

    /// Score factor for a document matching `overlap` of `max_overlap`
    /// query clauses.
    fn coord(&self, overlap: usize, max_overlap: usize) -> f32;

    /// Encode a norm into one byte.
    fn encode_norm(&self, norm: f32) -> u8 {
        float_to_byte315(norm)
    }

    /// Decode a norm byte.
    fn decode_norm(&self, norm: u8) -> f32 {
        NORM_TABLE[norm as usize]
    }
}

/// Classic TF-IDF scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSimilarity;

impl Similarity for DefaultSimilarity {
    fn length_norm(&self, _field: &str, num_terms: usize) -> f32 {
        1.0 / (num_terms as f32).sqrt()
    }

    fn query_norm(&self, sum_of_squared_weights: f32) -> f32 {
        1.0 / sum_of_squared_weights.sqrt()
    }

    fn tf(&self, freq: f32) -> f32 {
        freq.sqrt()
    }

    fn idf(&self, doc_freq: u32, max_docs: u32) -> f32 {
        ((max_docs as f64 / (doc_freq as f64 + 1.0)).ln() + 1.0) as f32
    }

    fn coord(&self, overlap: usize, max_overlap: usize) -> f32 {
        overlap as f32 / max_overlap as f32
    }
}

/// `query_norm` with degenerate sums mapped to one.
pub(crate) fn safe_query_norm(similarity: &dyn Similarity, sum_of_squared_weights: f32) -> f32 {
    let norm = similarity.query_norm(sum_of_squared_weights);
    if sum_of_squared_weights == 0.0 || !norm.is_finite() {
        1.0
    } else {
        norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factors() {
        let sim = DefaultSimilarity;
        assert_eq!(sim.tf(4.0), 2.0);
        assert_eq!(sim.length_norm("f", 4), 0.5);
        assert_eq!(sim.coord(1, 4), 0.25);
        assert!((sim.idf(0, 1) - 1.0).abs() < 1e-6);
        assert!((sim.idf(1, 10) - (5.0f32.ln() + 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_norm_round_trip_is_lossy() {
        let sim = DefaultSimilarity;
        assert_eq!(sim.encode_norm(1.0), 124);
        assert_eq!(sim.decode_norm(124), 1.0);
        let decoded = sim.decode_norm(sim.encode_norm(0.7));
        assert!(decoded <= 0.7 && decoded > 0.6);
    }

    #[test]
    fn test_safe_query_norm() {
        assert_eq!(safe_query_norm(&DefaultSimilarity, 0.0), 1.0);
        assert_eq!(safe_query_norm(&DefaultSimilarity, 4.0), 0.5);
    }
}
