// src/services/pipeline_types.rs
//
// Pipeline Types
//
// Options and report for one end-to-end run.
//
// CRITICAL RULES:
// - No business logic in types
// - The report is serializable as-is; every FAILED/UNCERTAIN pair and every
//   conflict flag ends up in it
// - A failed transaction still fills the report up to where it stopped

use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::{
    ConflictEdge, Judgment, NamingConfig, PlacedItem, RenameEntry, StateTransition,
    TransactionState, Verdict,
};

use super::comparison_orchestrator::ComparisonStats;
use super::rename_transaction::TransactionReport;
use super::sequence_service::SequenceReport;

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub naming: NamingConfig,

    /// Stop after planning; nothing on disk changes
    pub dry_run: bool,

    /// Refuse to rename when any judgment contradicts the resolved order
    pub strict: bool,

    /// Directory the renamed files land in. Defaults to the items' shared
    /// parent; required when items come from several directories.
    pub target_directory: Option<PathBuf>,
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OracleCallCounts {
    /// Oracle calls, retries included
    pub made: usize,
    pub cached: usize,
    pub failed: usize,
    pub retried: usize,
    pub uncertain: usize,
}

impl From<&ComparisonStats> for OracleCallCounts {
    fn from(stats: &ComparisonStats) -> Self {
        Self {
            made: stats.oracle_calls,
            cached: stats.cached,
            failed: stats.failed,
            retried: stats.retries,
            uncertain: stats.uncertain,
        }
    }
}

/// A pair the oracle could not order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedPair {
    pub first: PathBuf,
    pub second: PathBuf,
    pub verdict: Verdict,
    pub attempts: u32,
}

impl From<&Judgment> for UnresolvedPair {
    fn from(judgment: &Judgment) -> Self {
        Self {
            first: judgment.key.first().to_path_buf(),
            second: judgment.key.second().to_path_buf(),
            verdict: judgment.verdict,
            attempts: judgment.attempts,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub directory: Option<PathBuf>,

    /// Final order with net score, confidence and conflict flag
    pub items: Vec<PlacedItem>,
    pub conflicts: Vec<ConflictEdge>,
    pub evicted_edges: Vec<ConflictEdge>,
    pub fell_back_to_net_score: bool,
    pub unresolved: Vec<UnresolvedPair>,

    pub plan: Vec<RenameEntry>,
    pub transaction_id: Option<Uuid>,

    /// None when there was nothing to rename
    pub state: Option<TransactionState>,
    pub snapshot_id: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub transitions: Vec<StateTransition>,

    pub oracle_calls: OracleCallCounts,
    pub sequence: SequenceReport,
    pub dry_run: bool,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn conflict_count(&self) -> usize {
        self.items.iter().filter(|p| p.conflict).count()
    }

    /// Copies what a transaction established, successful or not
    pub fn absorb(&mut self, tx: TransactionReport) {
        self.directory = Some(tx.directory);
        self.transaction_id = Some(tx.transaction_id);
        self.state = Some(tx.state);
        self.snapshot_id = tx.snapshot_id;
        self.snapshot_path = tx.snapshot_path;
        self.plan = tx.entries;
        self.transitions = tx.transitions;
    }
}
