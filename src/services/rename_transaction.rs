// src/services/rename_transaction.rs
//
// Rename Transaction Manager
//
// Applies a resolved order to disk as an all-or-nothing rename.
//
// CRITICAL RULES:
// - Planning never touches the disk
// - No rename happens before a verified backup snapshot exists
// - Moves are serialized and journaled; a failure reverses the journal
//   and then checks every source against the snapshot
// - COMMITTED only after every target is verified by content
// - Cancellation is honored up to BACKED_UP; after that it waits for a
//   terminal state
// - Every execution yields a report, failed ones included

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{
    validate_plan, EntryStatus, NamingConfig, OrderResult, RenameEntry, RenamePlan,
    StateTransition, TransactionState,
};
use crate::error::{AppError, AppResult, FsErrorKind};
use crate::events::{
    EventBus, RenameCommitted, RenameRolledBack, TransactionStateChanged,
};
use crate::infrastructure::{BackupSnapshot, FileSystem};

// ============================================================================
// REPORT
// ============================================================================

/// Outcome of a transaction (or of a preview, which stops at PLANNED)
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub transaction_id: Uuid,
    pub directory: PathBuf,
    pub state: TransactionState,
    pub snapshot_id: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub entries: Vec<RenameEntry>,
    pub transitions: Vec<StateTransition>,
}

impl TransactionReport {
    pub fn renamed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Renamed)
            .count()
    }

    /// (old, new) for every entry that ended up renamed
    pub fn applied_moves(&self) -> Vec<(PathBuf, PathBuf)> {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Renamed)
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect()
    }
}

/// A failed execution and the state it reached
#[derive(Debug)]
pub struct TransactionFailure {
    pub error: AppError,
    pub report: TransactionReport,
}

// ============================================================================
// INTERNALS
// ============================================================================

/// A move that has been applied and must be reversed on rollback
#[derive(Debug, Clone)]
struct AppliedMove {
    from: PathBuf,
    to: PathBuf,
    entry: usize,
}

#[derive(Debug, Clone)]
struct MoveFailure {
    kind: FsErrorKind,
    path: PathBuf,
    message: String,
}

impl MoveFailure {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self {
            kind: FsErrorKind::classify(err),
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    fn verification(path: &Path, message: impl Into<String>) -> Self {
        Self {
            kind: FsErrorKind::Other,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// State machine bookkeeping for one execution
struct Transaction<'a> {
    id: Uuid,
    state: TransactionState,
    transitions: Vec<StateTransition>,
    event_bus: &'a EventBus,
}

impl<'a> Transaction<'a> {
    fn new(event_bus: &'a EventBus) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TransactionState::Planned,
            transitions: Vec::new(),
            event_bus,
        }
    }

    fn advance(&mut self, next: TransactionState) -> AppResult<()> {
        let transition = self.state.transition(next)?;

        log::info!("Transaction {}: {} -> {}", self.id, transition.from, transition.to);
        self.event_bus
            .emit(TransactionStateChanged::new(self.id, transition.from, transition.to));

        self.state = next;
        self.transitions.push(transition);
        Ok(())
    }
}

// ============================================================================
// MANAGER
// ============================================================================

pub struct RenameTransactionManager {
    fs: Arc<dyn FileSystem>,
    event_bus: Arc<EventBus>,
    backup_root: PathBuf,
}

impl RenameTransactionManager {
    pub fn new(fs: Arc<dyn FileSystem>, event_bus: Arc<EventBus>, backup_root: PathBuf) -> Self {
        Self {
            fs,
            event_bus,
            backup_root,
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    // ------------------------------------------------------------------------
    // PLANNING
    // ------------------------------------------------------------------------

    /// Builds and validates the plan for a resolved order
    pub fn plan(&self, order: &OrderResult, naming: &NamingConfig) -> AppResult<RenamePlan> {
        self.plan_paths(&order.ordered_paths(), naming)
    }

    /// Builds and validates the plan for sources given in final order,
    /// targeting their shared directory.
    pub fn plan_paths(&self, sources: &[PathBuf], naming: &NamingConfig) -> AppResult<RenamePlan> {
        self.plan_into(sources, None, naming)
    }

    /// Builds and validates the plan with every target in
    /// `target_directory`, or in the sources' shared directory when None.
    ///
    /// Fails before any mutation on a bad digit width, on sources spread
    /// over several directories without a target, and on target collisions.
    pub fn plan_into(
        &self,
        sources: &[PathBuf],
        target_directory: Option<&Path>,
        naming: &NamingConfig,
    ) -> AppResult<RenamePlan> {
        naming.validate(sources.len())?;

        let directory = Self::target_directory(sources, target_directory)?;
        let plan = RenamePlan::build(&directory, sources, naming);
        self.check_plan(&plan)?;

        log::debug!(
            "Planned {} renames in {:?} ({} unchanged)",
            plan.moving_entries().count(),
            plan.directory,
            plan.len() - plan.moving_entries().count()
        );

        Ok(plan)
    }

    /// Plan without touching the disk, reported at PLANNED
    pub fn preview(&self, order: &OrderResult, naming: &NamingConfig) -> AppResult<TransactionReport> {
        let plan = self.plan(order, naming)?;

        Ok(TransactionReport {
            transaction_id: Uuid::new_v4(),
            directory: plan.directory.clone(),
            state: TransactionState::Planned,
            snapshot_id: None,
            snapshot_path: None,
            entries: plan.entries,
            transitions: Vec::new(),
        })
    }

    /// Where targets go: the explicit directory, otherwise the single
    /// parent shared by every source
    pub fn target_directory(sources: &[PathBuf], explicit: Option<&Path>) -> AppResult<PathBuf> {
        match explicit {
            Some(directory) => Ok(directory.to_path_buf()),
            None => common_directory(sources),
        }
    }

    /// `target_directory`, checked to exist. Lets a caller reject a run
    /// before doing any expensive work for it.
    pub fn ensure_target_directory(
        &self,
        sources: &[PathBuf],
        explicit: Option<&Path>,
    ) -> AppResult<PathBuf> {
        let directory = Self::target_directory(sources, explicit)?;
        if !self.fs.is_dir(&directory) {
            return Err(AppError::NotFound(format!(
                "target directory {:?} does not exist",
                directory
            )));
        }
        Ok(directory)
    }

    /// Collision check against the target directory as it is now
    fn check_plan(&self, plan: &RenamePlan) -> AppResult<()> {
        if !self.fs.is_dir(&plan.directory) {
            return Err(AppError::NotFound(format!(
                "target directory {:?} does not exist",
                plan.directory
            )));
        }
        let existing = self.fs.list_dir(&plan.directory)?;

        let present: HashSet<&Path> = existing.iter().map(PathBuf::as_path).collect();
        let missing = plan.sources().find(|s| {
            if s.parent() == Some(plan.directory.as_path()) {
                !present.contains(s)
            } else {
                !self.fs.exists(s)
            }
        });
        if let Some(missing) = missing {
            return Err(AppError::NotFound(format!("source {:?} does not exist", missing)));
        }

        validate_plan(plan, &existing)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // EXECUTION
    // ------------------------------------------------------------------------

    /// Runs PLANNED -> BACKED_UP -> RENAMING -> COMMITTED.
    ///
    /// Errors:
    /// - `PlanCollision` / `NotFound`: nothing touched
    /// - `BackupFailure`: ABORTED, nothing renamed
    /// - `Cancelled`: ABORTED before the first move
    /// - `RenameFailure`: rolled back, ABORTED, originals restored
    /// - `RollbackFailure`: left in RENAMING; restore from the snapshot
    pub fn execute(&self, plan: &RenamePlan, cancel: &CancellationToken) -> AppResult<TransactionReport> {
        self.execute_reported(plan, cancel).map_err(|failure| failure.error)
    }

    /// Same as `execute`, but a failure keeps the report of how far the
    /// transaction got: transitions, per-entry status and snapshot
    pub fn execute_reported(
        &self,
        plan: &RenamePlan,
        cancel: &CancellationToken,
    ) -> Result<TransactionReport, TransactionFailure> {
        let mut tx = Transaction::new(&self.event_bus);
        let mut entries = plan.entries.clone();
        let mut snapshot = None;

        let outcome = self.drive(&mut tx, plan, cancel, &mut entries, &mut snapshot);
        let report = Self::report(&tx, plan, snapshot.as_ref(), entries);

        match outcome {
            Ok(()) => Ok(report),
            Err(error) => Err(TransactionFailure { error, report }),
        }
    }

    fn drive(
        &self,
        tx: &mut Transaction<'_>,
        plan: &RenamePlan,
        cancel: &CancellationToken,
        entries: &mut [RenameEntry],
        snapshot_slot: &mut Option<BackupSnapshot>,
    ) -> AppResult<()> {
        if plan.is_empty() {
            return Err(AppError::InvalidConfiguration(
                "rename plan is empty".to_string(),
            ));
        }

        if let Err(e) = self.check_plan(plan) {
            tx.advance(TransactionState::Aborted)?;
            return Err(e);
        }

        if cancel.is_cancelled() {
            tx.advance(TransactionState::Aborted)?;
            return Err(AppError::Cancelled);
        }

        // BACKUP
        let backup_files: Vec<(PathBuf, Option<PathBuf>)> = plan
            .entries
            .iter()
            .map(|e| (e.source.clone(), (!e.is_noop()).then(|| e.target.clone())))
            .collect();

        let created = match BackupSnapshot::create(
            self.fs.as_ref(),
            &self.backup_root,
            &plan.directory,
            &backup_files,
        ) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("Backup failed, aborting before any rename: {}", e);
                tx.advance(TransactionState::Aborted)?;
                return Err(e);
            }
        };
        let snapshot: &BackupSnapshot = snapshot_slot.insert(created);
        tx.advance(TransactionState::BackedUp)?;

        if cancel.is_cancelled() {
            log::warn!(
                "Cancelled before renaming; nothing renamed, snapshot {} retained",
                snapshot.id()
            );
            tx.advance(TransactionState::Aborted)?;
            return Err(AppError::Cancelled);
        }

        // RENAMING
        tx.advance(TransactionState::Renaming)?;

        let mut journal = Vec::new();
        let outcome = self
            .apply_moves(plan, tx.id, entries, &mut journal)
            .and_then(|()| self.verify_commit(plan, snapshot));

        if cancel.is_cancelled() {
            log::info!("Cancellation deferred until transaction {} completes", tx.id);
        }

        match outcome {
            Ok(()) => {
                tx.advance(TransactionState::Committed)?;

                let renamed = entries
                    .iter()
                    .filter(|e| e.status == EntryStatus::Renamed)
                    .count();
                self.event_bus.emit(RenameCommitted::new(
                    tx.id,
                    plan.directory.clone(),
                    renamed,
                    snapshot.id().to_string(),
                ));
                log::info!(
                    "Renamed {} files in {:?}; snapshot {}",
                    renamed,
                    plan.directory,
                    snapshot.id()
                );

                Ok(())
            }
            Err(failure) => self.roll_back(tx, plan, snapshot, &journal, entries, failure),
        }
    }

    /// Moves staged entries to temporary names, then every entry to its
    /// target. An entry is staged when its target is another item's
    /// current name.
    fn apply_moves(
        &self,
        plan: &RenamePlan,
        tx_id: Uuid,
        entries: &mut [RenameEntry],
        journal: &mut Vec<AppliedMove>,
    ) -> Result<(), MoveFailure> {
        let sources: HashSet<&Path> = plan.sources().collect();
        let mut staged: Vec<(usize, PathBuf)> = Vec::new();

        for (idx, entry) in plan.entries.iter().enumerate() {
            if entry.is_noop() || !sources.contains(entry.target.as_path()) {
                continue;
            }

            let extension = entry
                .source
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            let temp = plan.directory.join(format!(
                ".pageorder_tmp_{}_{}{}",
                tx_id.simple(),
                idx,
                extension
            ));

            self.move_file(&entry.source, &temp, idx, journal)?;
            entries[idx].status = EntryStatus::Staged;
            staged.push((idx, temp));
        }

        let staged_indices: HashSet<usize> = staged.iter().map(|(idx, _)| *idx).collect();

        for (idx, entry) in plan.entries.iter().enumerate() {
            if entry.is_noop() || staged_indices.contains(&idx) {
                continue;
            }
            self.move_file(&entry.source, &entry.target, idx, journal)?;
            entries[idx].status = EntryStatus::Renamed;
        }

        for (idx, temp) in &staged {
            self.move_file(temp, &plan.entries[*idx].target, *idx, journal)?;
            entries[*idx].status = EntryStatus::Renamed;
        }

        Ok(())
    }

    fn move_file(
        &self,
        from: &Path,
        to: &Path,
        entry: usize,
        journal: &mut Vec<AppliedMove>,
    ) -> Result<(), MoveFailure> {
        self.fs
            .rename(from, to)
            .map_err(|e| MoveFailure::io(from, &e))?;

        log::debug!("Moved {:?} -> {:?}", from, to);
        journal.push(AppliedMove {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            entry,
        });
        Ok(())
    }

    /// Every target holds its source's content; renamed sources are gone
    fn verify_commit(&self, plan: &RenamePlan, snapshot: &BackupSnapshot) -> Result<(), MoveFailure> {
        let targets: HashSet<&Path> = plan.targets().collect();

        for entry in &plan.entries {
            let expected = snapshot
                .file_for(&entry.source)
                .map(|f| f.sha256.as_str())
                .ok_or_else(|| MoveFailure::verification(&entry.source, "missing from snapshot"))?;

            let actual = self
                .fs
                .sha256(&entry.target)
                .map_err(|e| MoveFailure::io(&entry.target, &e))?;

            if actual != expected {
                return Err(MoveFailure::verification(
                    &entry.target,
                    "content does not match the source",
                ));
            }

            if !entry.is_noop()
                && !targets.contains(entry.source.as_path())
                && self.fs.exists(&entry.source)
            {
                return Err(MoveFailure::verification(
                    &entry.source,
                    "renamed source still exists",
                ));
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // ROLLBACK
    // ------------------------------------------------------------------------

    /// Reverses the journal, then makes every source match the snapshot.
    /// Not retried.
    fn roll_back(
        &self,
        tx: &mut Transaction<'_>,
        plan: &RenamePlan,
        snapshot: &BackupSnapshot,
        journal: &[AppliedMove],
        entries: &mut [RenameEntry],
        failure: MoveFailure,
    ) -> AppResult<()> {
        log::error!(
            "Rename failed at {:?} ({}): {}. Rolling back {} moves",
            failure.path,
            failure.kind,
            failure.message,
            journal.len()
        );

        let mut problems: Vec<String> = Vec::new();

        for applied in journal.iter().rev() {
            if let Err(e) = self.fs.rename(&applied.to, &applied.from) {
                log::warn!(
                    "Could not move {:?} back to {:?}: {}",
                    applied.to,
                    applied.from,
                    e
                );
            }
        }

        // Snapshot is ground truth for every source path
        let mut unrestored = Vec::new();
        for entry in &plan.entries {
            if let Err(message) = self.restore_source(snapshot, &entry.source) {
                problems.push(message);
                unrestored.push(entry.source.clone());
            }
        }

        // Copies left behind by moves that could not be reversed. Kept when
        // their source is still missing.
        let sources: HashSet<&Path> = plan.sources().collect();
        for applied in journal {
            let source = &plan.entries[applied.entry].source;
            if sources.contains(applied.to.as_path())
                || unrestored.contains(source)
                || !self.fs.exists(&applied.to)
            {
                continue;
            }

            let expected = snapshot.file_for(source).map(|f| f.sha256.clone());
            let actual = self.fs.sha256(&applied.to).ok();

            if expected.is_some() && expected == actual {
                if let Err(e) = self.fs.remove_file(&applied.to) {
                    problems.push(format!("could not remove leftover {:?}: {}", applied.to, e));
                }
            } else {
                problems.push(format!("unexpected content left at {:?}", applied.to));
            }
        }

        if !problems.is_empty() {
            let message = problems.join("; ");
            log::error!(
                "Rollback incomplete, restore manually from snapshot {} ({:?}): {}",
                snapshot.id(),
                snapshot.directory,
                message
            );
            self.event_bus.emit(RenameRolledBack::new(
                tx.id,
                snapshot.id().to_string(),
                failure.message.clone(),
                false,
            ));

            return Err(AppError::RollbackFailure {
                state: tx.state,
                snapshot_id: snapshot.id().to_string(),
                message,
                unrestored,
            });
        }

        for entry in entries.iter_mut() {
            if matches!(entry.status, EntryStatus::Renamed | EntryStatus::Staged) {
                entry.status = EntryStatus::RolledBack;
            }
        }

        tx.advance(TransactionState::Aborted)?;
        self.event_bus.emit(RenameRolledBack::new(
            tx.id,
            snapshot.id().to_string(),
            failure.message.clone(),
            true,
        ));
        log::warn!(
            "Rolled back {} entries; original names restored",
            entries
                .iter()
                .filter(|e| e.status == EntryStatus::RolledBack)
                .count()
        );

        Err(AppError::RenameFailure {
            kind: failure.kind,
            path: failure.path,
            message: failure.message,
            state: tx.state,
            snapshot_id: snapshot.id().to_string(),
        })
    }

    /// Ensures `source` exists with its snapshot content
    fn restore_source(&self, snapshot: &BackupSnapshot, source: &Path) -> Result<(), String> {
        let file = snapshot
            .file_for(source)
            .ok_or_else(|| format!("{:?} is not in the snapshot", source))?;

        if self.fs.exists(source) {
            match self.fs.sha256(source) {
                Ok(digest) if digest == file.sha256 => return Ok(()),
                _ => self
                    .fs
                    .remove_file(source)
                    .map_err(|e| format!("could not clear {:?}: {}", source, e))?,
            }
        }

        let stored = snapshot.directory.join(&file.stored_name);
        self.fs
            .copy(&stored, source)
            .map_err(|e| format!("could not restore {:?} from snapshot: {}", source, e))?;

        match self.fs.sha256(source) {
            Ok(digest) if digest == file.sha256 => {
                log::info!("Restored {:?} from snapshot {}", source, snapshot.id());
                Ok(())
            }
            _ => Err(format!("restored {:?} does not match the snapshot", source)),
        }
    }

    fn report(
        tx: &Transaction<'_>,
        plan: &RenamePlan,
        snapshot: Option<&BackupSnapshot>,
        entries: Vec<RenameEntry>,
    ) -> TransactionReport {
        TransactionReport {
            transaction_id: tx.id,
            directory: plan.directory.clone(),
            state: tx.state,
            snapshot_id: snapshot.map(|s| s.id().to_string()),
            snapshot_path: snapshot.map(|s| s.directory.clone()),
            entries,
            transitions: tx.transitions.clone(),
        }
    }
}

/// The single parent directory shared by every source
fn common_directory(sources: &[PathBuf]) -> AppResult<PathBuf> {
    let mut parents = sources.iter().map(|s| s.parent());

    let first = match parents.next() {
        Some(Some(parent)) => parent,
        Some(None) => {
            return Err(AppError::InvalidConfiguration(format!(
                "{:?} has no parent directory",
                sources[0]
            )))
        }
        None => {
            return Err(AppError::InvalidConfiguration(
                "nothing to rename".to_string(),
            ))
        }
    };

    if parents.any(|p| p != Some(first)) {
        return Err(AppError::InvalidConfiguration(
            "all items must live in the same directory".to_string(),
        ));
    }

    Ok(first.to_path_buf())
}
