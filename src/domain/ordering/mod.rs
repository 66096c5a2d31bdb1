// src/domain/ordering/mod.rs
//
// Ordering Domain
//
// Value objects describing the outcome of order resolution.
// Deterministic: same judgments and items produce the same result.

pub mod value_objects;

pub use value_objects::{ConflictEdge, OrderResult, PlacedItem, PlacementSource};
