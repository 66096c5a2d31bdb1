// src/domain/rename/state.rs
//
// Rename Transaction State Machine
//
// PLANNED -> BACKED_UP -> RENAMING -> COMMITTED
// ABORTED is reachable from every non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Planned,
    BackedUp,
    Renaming,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }

    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;

        match (self, next) {
            (Planned, BackedUp) | (BackedUp, Renaming) | (Renaming, Committed) => true,
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Checked transition; returns the recorded step
    pub fn transition(self, next: TransactionState) -> DomainResult<StateTransition> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self,
                to: next,
            });
        }

        Ok(StateTransition {
            from: self,
            to: next,
            at: Utc::now(),
        })
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Planned => write!(f, "PLANNED"),
            TransactionState::BackedUp => write!(f, "BACKED_UP"),
            TransactionState::Renaming => write!(f, "RENAMING"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// One recorded step of the state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TransactionState,
    pub to: TransactionState,
    pub at: DateTime<Utc>,
}
