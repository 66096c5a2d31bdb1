// src/events/types.rs
//
// Domain events for a reordering run.
// Each event represents an immutable fact that has already occurred.
//
// CRITICAL RULES:
// - Events are facts, not commands
// - Events carry only the data needed to react
// - No business logic in event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::TransactionState;

/// Trait that all domain events must implement
pub trait DomainEvent: std::fmt::Debug + Clone {
    /// Unique identifier for this event instance
    fn event_id(&self) -> Uuid;

    /// When this event occurred
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Human-readable event type name
    fn event_type(&self) -> &'static str;
}

// ============================================================================
// COMPARISON EVENTS
// ============================================================================

/// Emitted once the pair set is known, before any oracle call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonStarted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub total_pairs: usize,
    pub cached_pairs: usize,
}

impl ComparisonStarted {
    pub fn new(total_pairs: usize, cached_pairs: usize) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            total_pairs,
            cached_pairs,
        }
    }
}

impl DomainEvent for ComparisonStarted {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "ComparisonStarted" }
}

/// Emitted each time a pair is resolved. `resolved` never decreases
/// within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonProgressed {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub resolved: usize,
    pub total: usize,
}

impl ComparisonProgressed {
    pub fn new(resolved: usize, total: usize) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            resolved,
            total,
        }
    }
}

impl DomainEvent for ComparisonProgressed {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "ComparisonProgressed" }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonCompleted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub resolved: usize,
    pub oracle_calls: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl ComparisonCompleted {
    pub fn new(resolved: usize, oracle_calls: usize, failed: usize, cancelled: bool) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            resolved,
            oracle_calls,
            failed,
            cancelled,
        }
    }
}

impl DomainEvent for ComparisonCompleted {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "ComparisonCompleted" }
}

// ============================================================================
// RESOLUTION EVENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResolved {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub item_count: usize,
    pub conflict_count: usize,
    pub evicted_edges: usize,
    pub fell_back_to_net_score: bool,
}

impl OrderResolved {
    pub fn new(
        item_count: usize,
        conflict_count: usize,
        evicted_edges: usize,
        fell_back_to_net_score: bool,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            item_count,
            conflict_count,
            evicted_edges,
            fell_back_to_net_score,
        }
    }
}

impl DomainEvent for OrderResolved {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "OrderResolved" }
}

// ============================================================================
// TRANSACTION EVENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStateChanged {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub transaction_id: Uuid,
    pub from: TransactionState,
    pub to: TransactionState,
}

impl TransactionStateChanged {
    pub fn new(transaction_id: Uuid, from: TransactionState, to: TransactionState) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            transaction_id,
            from,
            to,
        }
    }
}

impl DomainEvent for TransactionStateChanged {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "TransactionStateChanged" }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameCommitted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub transaction_id: Uuid,
    pub directory: PathBuf,
    pub renamed: usize,
    pub snapshot_id: String,
}

impl RenameCommitted {
    pub fn new(transaction_id: Uuid, directory: PathBuf, renamed: usize, snapshot_id: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            transaction_id,
            directory,
            renamed,
            snapshot_id,
        }
    }
}

impl DomainEvent for RenameCommitted {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "RenameCommitted" }
}

/// Emitted after a rollback attempt, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRolledBack {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub transaction_id: Uuid,
    pub snapshot_id: String,
    pub reason: String,
    pub restored: bool,
}

impl RenameRolledBack {
    pub fn new(transaction_id: Uuid, snapshot_id: String, reason: String, restored: bool) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            transaction_id,
            snapshot_id,
            reason,
            restored,
        }
    }
}

impl DomainEvent for RenameRolledBack {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "RenameRolledBack" }
}
