//! Shared utility modules used across Pilum components.

pub mod levenshtein;
pub mod priority_queue;
pub mod small_float;
pub mod varint;
