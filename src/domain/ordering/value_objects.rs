// src/domain/ordering/value_objects.rs
//
// Ordering Value Objects
//
// CRITICAL INVARIANTS:
// - `OrderResult::items` is a permutation of the input items
// - `position` equals the index in `items`
// - Conflict flags are derived only from stored judgments

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::item::Item;

// ============================================================================
// PLACED ITEM
// ============================================================================

/// How an item received its final position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementSource {
    /// All predecessors were already placed
    Topological,

    /// Forced out of a cycle by net score
    NetScore,
}

impl std::fmt::Display for PlacementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementSource::Topological => write!(f, "topological"),
            PlacementSource::NetScore => write!(f, "net_score"),
        }
    }
}

/// An item at its final position in the resolved order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedItem {
    pub item: Item,

    /// Zero-based final position
    pub position: usize,

    /// Sum of outgoing minus incoming edge weights
    pub net_score: f64,

    /// Share of incident edge weight that agrees with the final placement.
    /// 0.0 when no judgment orders this item.
    pub confidence: f64,

    /// True when at least one stored judgment disagrees with the placement
    pub conflict: bool,

    pub placement: PlacementSource,
}

// ============================================================================
// CONFLICT EDGE
// ============================================================================

/// A stored judgment contradicted by the final order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEdge {
    /// Path the judgment placed first
    pub expected_before: PathBuf,

    /// Path the judgment placed second
    pub expected_after: PathBuf,

    pub weight: f64,
}

// ============================================================================
// ORDER RESULT
// ============================================================================

/// Total order over all items plus the per-item conflict report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub items: Vec<PlacedItem>,

    /// Judgments contradicted by the final order, in placement order
    pub conflicts: Vec<ConflictEdge>,

    /// Edges evicted while breaking cycles, in eviction order
    pub evicted_edges: Vec<ConflictEdge>,

    /// True when cycles survived the break budget
    pub fell_back_to_net_score: bool,
}

impl OrderResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in final order
    pub fn ordered_items(&self) -> Vec<&Item> {
        self.items.iter().map(|p| &p.item).collect()
    }

    pub fn ordered_paths(&self) -> Vec<PathBuf> {
        self.items.iter().map(|p| p.item.path.clone()).collect()
    }

    pub fn conflicted_items(&self) -> Vec<&PlacedItem> {
        self.items.iter().filter(|p| p.conflict).collect()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}
