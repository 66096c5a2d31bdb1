// src/domain/mod.rs
//
// Domain Root - The Single Source of Truth for Domain API
//
// All other modules import from `crate::domain::*`

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod item;
pub mod judgment;
pub mod ordering;
pub mod rename;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Item Domain
pub use item::{validate_items, Item};

// Judgment Domain
pub use judgment::{Judgment, JudgmentSet, PairKey, PathMoves, Verdict};

// Ordering Domain (derived data)
pub use ordering::{ConflictEdge, OrderResult, PlacedItem, PlacementSource};

// Rename Domain
pub use rename::{
    validate_plan, EntryStatus, NamingConfig, RenameEntry, RenamePlan, StateTransition,
    TransactionState,
};

// ============================================================================
// DOMAIN ERROR TYPES
// ============================================================================

use thiserror::Error;

/// Domain-level errors
/// These represent violations of business rules and invariants
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid naming configuration: {0}")]
    InvalidNaming(String),

    #[error("Target collision: {0}")]
    Collision(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: TransactionState,
        to: TransactionState,
    },
}

/// Domain result type
pub type DomainResult<T> = Result<T, DomainError>;
