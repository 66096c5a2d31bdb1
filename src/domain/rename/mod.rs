// src/domain/rename/mod.rs
//
// Rename Domain
//
// Plans and the transaction state machine. Execution lives in
// services::rename_transaction.

pub mod invariants;
pub mod plan;
pub mod state;

pub use invariants::validate_plan;
pub use plan::{EntryStatus, NamingConfig, RenameEntry, RenamePlan};
pub use state::{StateTransition, TransactionState};
