// src/services/pipeline_service.rs
//
// Pipeline Service
//
// compare -> resolve -> plan -> execute, for one folder of items.
//
// CRITICAL RULES:
// - Where the files land is settled before the oracle is asked anything
// - A cancelled comparison stops the run before planning
// - Dry runs stop at PLANNED
// - A failed transaction returns the run report inside the error
// - After COMMITTED the judgment cache follows the renamed files

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::domain::{validate_items, Item, PathMoves, TransactionState};
use crate::error::{AppError, AppResult};

use super::comparison_orchestrator::ComparisonOrchestrator;
use super::order_resolution_service::OrderResolutionService;
use super::pipeline_types::{OracleCallCounts, RunOptions, RunReport, UnresolvedPair};
use super::rename_transaction::RenameTransactionManager;
use super::sequence_service::SequenceService;

pub struct PipelineService {
    orchestrator: Arc<ComparisonOrchestrator>,
    resolver: Arc<OrderResolutionService>,
    transactions: Arc<RenameTransactionManager>,
    sequence: SequenceService,
}

impl PipelineService {
    pub fn new(
        orchestrator: Arc<ComparisonOrchestrator>,
        resolver: Arc<OrderResolutionService>,
        transactions: Arc<RenameTransactionManager>,
    ) -> Self {
        Self {
            orchestrator,
            resolver,
            transactions,
            sequence: SequenceService::new(),
        }
    }

    pub async fn run(
        &self,
        items: &[Item],
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> AppResult<RunReport> {
        let started = Instant::now();
        validate_items(items)?;

        let mut report = RunReport {
            dry_run: options.dry_run,
            sequence: self.sequence.validate_sequence(items),
            ..Default::default()
        };

        if items.is_empty() {
            log::info!("No items to order");
            report.elapsed_ms = elapsed_ms(started);
            return Ok(report);
        }

        // Items spread over several folders need somewhere to go
        let sources: Vec<_> = items.iter().map(|item| item.path.clone()).collect();
        let directory = self
            .transactions
            .ensure_target_directory(&sources, options.target_directory.as_deref())?;
        report.directory = Some(directory);

        // ====================================================================
        // COMPARE
        // ====================================================================

        let outcome = self.orchestrator.compare_all(items, cancel).await?;
        report.oracle_calls = OracleCallCounts::from(&outcome.stats);
        report.unresolved = outcome
            .judgments
            .unresolved()
            .into_iter()
            .map(UnresolvedPair::from)
            .collect();

        if outcome.stats.cancelled {
            log::warn!(
                "Run cancelled during comparison after {} oracle calls; nothing planned",
                report.oracle_calls.made
            );
            return Err(AppError::Cancelled);
        }

        // ====================================================================
        // RESOLVE
        // ====================================================================

        let order = self.resolver.resolve(items, &outcome.judgments)?;
        report.items = order.items.clone();
        report.conflicts = order.conflicts.clone();
        report.evicted_edges = order.evicted_edges.clone();
        report.fell_back_to_net_score = order.fell_back_to_net_score;

        if options.strict {
            OrderResolutionService::check_consistency(&order)?;
        }

        // ====================================================================
        // PLAN
        // ====================================================================

        let plan = match self.transactions.plan_into(
            &order.ordered_paths(),
            options.target_directory.as_deref(),
            &options.naming,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                log::error!(
                    "Planning failed for {} ordered items ({} conflicts): {}",
                    report.items.len(),
                    report.conflict_count(),
                    e
                );
                return Err(e);
            }
        };
        report.directory = Some(plan.directory.clone());

        if options.dry_run {
            report.plan = plan.entries;
            report.state = Some(TransactionState::Planned);
            report.elapsed_ms = elapsed_ms(started);
            log::info!("Dry run: {} renames planned, nothing changed", report.plan.len());
            return Ok(report);
        }

        // ====================================================================
        // EXECUTE
        // ====================================================================

        let transactions = Arc::clone(&self.transactions);
        let token = cancel.clone();
        let executed =
            tokio::task::spawn_blocking(move || transactions.execute_reported(&plan, &token))
                .await
                .map_err(|e| AppError::Other(format!("Rename task failed: {}", e)))?;

        match executed {
            Ok(tx) => {
                let moves = PathMoves::new(tx.applied_moves());
                report.absorb(tx);

                if let Err(e) = self.orchestrator.follow_renames(&moves) {
                    log::warn!("Judgment cache not carried over to the new names: {}", e);
                }

                report.elapsed_ms = elapsed_ms(started);
                Ok(report)
            }
            Err(failure) => {
                let cause = failure.error;
                report.absorb(failure.report);
                report.elapsed_ms = elapsed_ms(started);

                log::error!(
                    "Rename transaction failed after ordering {} items ({} conflicts, {} unresolved pairs): {}",
                    report.items.len(),
                    report.conflict_count(),
                    report.unresolved.len(),
                    cause
                );
                if cause.requires_manual_recovery() {
                    if let Some(snapshot_id) = cause.snapshot_id() {
                        log::error!(
                            "Restore manually from snapshot {} under {:?}",
                            snapshot_id,
                            self.transactions.backup_root()
                        );
                    }
                }

                Err(AppError::TransactionFailed {
                    cause: Box::new(cause),
                    report: Box::new(report),
                })
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
