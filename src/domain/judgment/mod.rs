// src/domain/judgment/mod.rs
//
// Judgment Domain
//
// Pure value objects for pairwise comparison results.
// No I/O, no persistence, no event emission.

pub mod value_objects;

pub use value_objects::{Judgment, JudgmentSet, PairKey, PathMoves, Verdict};
