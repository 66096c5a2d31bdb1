// src/services/comparison_orchestrator.rs
//
// Comparison Orchestrator
//
// Drives the oracle over every unordered pair of items and fills the
// comparison cache.
//
// CRITICAL RULES:
// - Each pair is enumerated once; cached pairs never reach the oracle
// - At most `workers` oracle calls are in flight
// - Transient failures are retried, then recorded as FAILED; never fatal
// - Every judgment is written to the cache, FAILED and UNCERTAIN included
// - Cancellation stops dispatch; in-flight calls are allowed to finish
// - Progress counts only go up

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::domain::{validate_items, Item, Judgment, JudgmentSet, PairKey, PathMoves, Verdict};
use crate::error::{AppError, AppResult};
use crate::events::{ComparisonCompleted, ComparisonProgressed, ComparisonStarted, EventBus};
use crate::integrations::Oracle;
use crate::repositories::JudgmentRepository;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Concurrent oracle calls
    pub workers: usize,

    /// Upper bound for a single oracle call
    pub call_timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,

    /// Re-ask the oracle for pairs cached as FAILED
    pub retry_failed_cached: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            call_timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
            retry_failed_cached: false,
        }
    }
}

impl OrchestratorSettings {
    /// Delay before retry number `retry` (1-based)
    fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_backoff)
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonStats {
    pub total_pairs: usize,

    /// Pairs answered from the cache
    pub cached: usize,

    /// Oracle calls made, retries included
    pub oracle_calls: usize,

    pub retries: usize,

    /// Pairs recorded as FAILED in this run
    pub failed: usize,

    /// Pairs the oracle answered as UNCERTAIN in this run
    pub uncertain: usize,

    /// Pairs never dispatched because of cancellation
    pub undispatched: usize,

    pub cache_write_errors: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub judgments: JudgmentSet,
    pub stats: ComparisonStats,
}

/// Result of one worker task
struct PairOutcome {
    judgment: Judgment,
    calls: u32,
    cache_error: bool,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct ComparisonOrchestrator {
    oracle: Arc<dyn Oracle>,
    cache: Arc<dyn JudgmentRepository>,
    event_bus: Arc<EventBus>,
    settings: OrchestratorSettings,
}

impl ComparisonOrchestrator {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        cache: Arc<dyn JudgmentRepository>,
        event_bus: Arc<EventBus>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            oracle,
            cache,
            event_bus,
            settings,
        }
    }

    /// Produce a judgment for every unordered pair of `items`.
    ///
    /// When `cancel` fires, undispatched pairs are left out of the set and
    /// `stats.cancelled` is set; the caller decides what to do next.
    pub async fn compare_all(
        &self,
        items: &[Item],
        cancel: &CancellationToken,
    ) -> AppResult<ComparisonOutcome> {
        validate_items(items)?;

        let total_pairs = PairKey::pair_count(items.len());
        let mut stats = ComparisonStats {
            total_pairs,
            ..Default::default()
        };
        let mut judgments = JudgmentSet::new();
        let mut pending: Vec<(Item, Item)> = Vec::new();

        for (i, first) in items.iter().enumerate() {
            for second in &items[i + 1..] {
                let key = PairKey::new(&first.path, &second.path);

                match self.cache.get(&key)? {
                    Some(cached) if !self.should_retry(&cached) => {
                        judgments.insert(cached);
                        stats.cached += 1;
                    }
                    _ => pending.push((first.clone(), second.clone())),
                }
            }
        }

        log::info!(
            "Comparing {} items: {} pairs, {} cached, {} to ask",
            items.len(),
            total_pairs,
            stats.cached,
            pending.len()
        );

        self.event_bus
            .emit(ComparisonStarted::new(total_pairs, stats.cached));

        let mut resolved = stats.cached;
        if resolved > 0 {
            self.event_bus
                .emit(ComparisonProgressed::new(resolved, total_pairs));
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks: JoinSet<PairOutcome> = JoinSet::new();
        let mut dispatched: Vec<PairKey> = Vec::with_capacity(pending.len());

        for (first, second) in pending.iter().cloned() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stats.cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit
                    .map_err(|_| AppError::Other("Oracle worker pool closed".to_string()))?,
            };

            dispatched.push(PairKey::new(&first.path, &second.path));

            let oracle = Arc::clone(&self.oracle);
            let cache = Arc::clone(&self.cache);
            let settings = self.settings.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let (judgment, calls) = judge_pair(oracle.as_ref(), &first, &second, &settings).await;
                let cache_error = match cache.save(&judgment) {
                    Ok(()) => false,
                    Err(e) => {
                        log::warn!("Could not cache judgment for {}: {}", judgment.key, e);
                        true
                    }
                };

                PairOutcome {
                    judgment,
                    calls,
                    cache_error,
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                if let Some(outcome) = Self::unwrap_joined(joined) {
                    self.record(outcome, &mut judgments, &mut stats, &mut resolved);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Some(outcome) = Self::unwrap_joined(joined) {
                self.record(outcome, &mut judgments, &mut stats, &mut resolved);
            }
        }

        // A worker that panicked left its pair without a judgment
        let answered: HashSet<PairKey> = judgments.iter().map(|j| j.key.clone()).collect();
        for key in dispatched.iter().filter(|k| !answered.contains(*k)) {
            let judgment = Judgment::failed(key.first(), key.second(), 0);
            let cache_error = self.cache.save(&judgment).is_err();
            self.record(
                PairOutcome {
                    judgment,
                    calls: 0,
                    cache_error,
                },
                &mut judgments,
                &mut stats,
                &mut resolved,
            );
        }

        stats.undispatched = pending.len() - dispatched.len();

        if stats.cancelled {
            log::warn!(
                "Comparison cancelled: {} of {} pairs resolved, {} never dispatched",
                resolved,
                total_pairs,
                stats.undispatched
            );
        } else {
            log::info!(
                "Comparison finished: {} oracle calls, {} retries, {} failed, {} uncertain",
                stats.oracle_calls,
                stats.retries,
                stats.failed,
                stats.uncertain
            );
        }

        self.event_bus.emit(ComparisonCompleted::new(
            resolved,
            stats.oracle_calls,
            stats.failed,
            stats.cancelled,
        ));

        Ok(ComparisonOutcome { judgments, stats })
    }

    /// Moves cached judgments along with renamed files, so the next run
    /// over the same directory hits the cache. A cache that cannot be
    /// rekeyed is cleared rather than left pointing at the wrong files.
    pub fn follow_renames(&self, moves: &PathMoves) -> AppResult<usize> {
        if moves.is_empty() {
            return Ok(0);
        }

        match self.cache.rekey(moves) {
            Ok(rewritten) => {
                log::debug!(
                    "Rekeyed {} cached judgments after {} renames",
                    rewritten,
                    moves.len()
                );
                Ok(rewritten)
            }
            Err(e) => {
                log::warn!("Could not rekey the judgment cache, clearing it: {}", e);
                self.cache.clear()?;
                Err(e)
            }
        }
    }

    fn should_retry(&self, cached: &Judgment) -> bool {
        self.settings.retry_failed_cached && cached.verdict == Verdict::Failed
    }

    fn unwrap_joined(joined: Result<PairOutcome, tokio::task::JoinError>) -> Option<PairOutcome> {
        match joined {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::error!("Oracle worker terminated abnormally: {}", e);
                None
            }
        }
    }

    fn record(
        &self,
        outcome: PairOutcome,
        judgments: &mut JudgmentSet,
        stats: &mut ComparisonStats,
        resolved: &mut usize,
    ) {
        stats.oracle_calls += outcome.calls as usize;
        stats.retries += outcome.calls.saturating_sub(1) as usize;
        match outcome.judgment.verdict {
            Verdict::Failed => stats.failed += 1,
            Verdict::Uncertain => stats.uncertain += 1,
            _ => {}
        }
        if outcome.cache_error {
            stats.cache_write_errors += 1;
        }

        judgments.insert(outcome.judgment);
        *resolved += 1;

        self.event_bus
            .emit(ComparisonProgressed::new(*resolved, stats.total_pairs));
    }
}

/// Asks the oracle with a per-call timeout, retrying with exponential
/// backoff. Returns the judgment and the number of calls made.
async fn judge_pair(
    oracle: &dyn Oracle,
    first: &Item,
    second: &Item,
    settings: &OrchestratorSettings,
) -> (Judgment, u32) {
    let attempts = settings.max_retries + 1;

    for attempt in 1..=attempts {
        let error = match tokio::time::timeout(settings.call_timeout, oracle.compare(first, second)).await {
            Ok(Ok(answer)) => {
                if attempt > 1 {
                    log::debug!("{} / {} succeeded after {} retries", first, second, attempt - 1);
                }
                let judgment = Judgment::oriented(
                    &first.path,
                    &second.path,
                    answer.verdict.into(),
                    answer.confidence,
                    attempt,
                );
                return (judgment, attempt);
            }
            Ok(Err(e)) => AppError::OracleTransientFailure(e.to_string()),
            Err(_) => AppError::OracleTimeout {
                pair: format!("{} / {}", first, second),
                timeout_ms: settings.call_timeout.as_millis() as u64,
            },
        };

        if attempt == attempts {
            log::warn!(
                "{} / {} failed after {} attempts, recording FAILED: {}",
                first,
                second,
                attempts,
                error
            );
            break;
        }

        let delay = settings.backoff_for(attempt);
        log::warn!(
            "{} / {} attempt {}/{} failed: {}. Retrying in {:?}",
            first,
            second,
            attempt,
            attempts,
            error,
            delay
        );
        tokio::time::sleep(delay).await;
    }

    (Judgment::failed(&first.path, &second.path, attempts), attempts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let settings = OrchestratorSettings {
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_millis(350),
            ..Default::default()
        };

        assert_eq!(settings.backoff_for(1), Duration::from_millis(100));
        assert_eq!(settings.backoff_for(2), Duration::from_millis(200));
        assert_eq!(settings.backoff_for(3), Duration::from_millis(350));
    }
}
