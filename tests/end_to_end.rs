// tests/end_to_end.rs
//
// Full pipeline runs against real temporary folders: scan, compare,
// resolve, plan, rename.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use pageorder::services::RunOptions;
use pageorder::{
    AppConfig, AppError, AppState, BackupSnapshot, Item, Oracle, OracleError, OracleJudgment,
    OracleVerdict, StdFileSystem, TransactionState,
};

// ============================================================================
// ORACLES
// ============================================================================

/// Orders by a fixed rank per file name and counts calls
struct ScriptedOracle {
    ranks: HashMap<String, u32>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    fn new(order: &[&str]) -> Self {
        Self {
            ranks: order
                .iter()
                .enumerate()
                .map(|(rank, name)| (name.to_string(), rank as u32))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn compare(&self, first: &Item, second: &Item) -> Result<OracleJudgment, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rank = |item: &Item| self.ranks.get(&item.file_name()).copied();

        match (rank(first), rank(second)) {
            (Some(a), Some(b)) if a < b => Ok(OracleJudgment::new(OracleVerdict::FirstBefore, Some(0.9))),
            (Some(a), Some(b)) if a > b => Ok(OracleJudgment::new(OracleVerdict::SecondBefore, Some(0.9))),
            _ => Ok(OracleJudgment::uncertain()),
        }
    }
}

/// Orders by the text inside each file, so it follows content across renames
struct ContentOracle {
    calls: AtomicUsize,
}

impl ContentOracle {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Oracle for ContentOracle {
    async fn compare(&self, first: &Item, second: &Item) -> Result<OracleJudgment, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let read = |item: &Item| {
            fs::read_to_string(&item.path).map_err(|e| OracleError::Transient(e.to_string()))
        };

        let verdict = if read(first)? <= read(second)? {
            OracleVerdict::FirstBefore
        } else {
            OracleVerdict::SecondBefore
        };
        Ok(OracleJudgment::new(verdict, Some(1.0)))
    }
}

/// a < b, b < c, c < a
struct CyclicOracle;

#[async_trait]
impl Oracle for CyclicOracle {
    async fn compare(&self, first: &Item, second: &Item) -> Result<OracleJudgment, OracleError> {
        let beats = |x: &str, y: &str| {
            matches!(
                (x, y),
                ("a.png", "b.png") | ("b.png", "c.png") | ("c.png", "a.png")
            )
        };
        let (x, y) = (first.file_name(), second.file_name());
        let verdict = if beats(&x, &y) {
            OracleVerdict::FirstBefore
        } else {
            OracleVerdict::SecondBefore
        };
        Ok(OracleJudgment::new(verdict, Some(0.8)))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

struct Workspace {
    _root: TempDir,
    book: PathBuf,
    config: AppConfig,
}

impl Workspace {
    fn new(names: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let book = root.path().join("book");
        fs::create_dir(&book).unwrap();
        for name in names {
            fs::write(book.join(name), format!("image {}", name)).unwrap();
        }

        let mut config = AppConfig::default();
        config.backup.root = Some(root.path().join("backups"));
        config.cache.database_path = Some(root.path().join("cache").join("judgments.db"));
        config.orchestrator.initial_backoff_ms = 1;
        config.orchestrator.max_backoff_ms = 5;

        Self {
            _root: root,
            book,
            config,
        }
    }

    fn state(&self, oracle: Arc<dyn Oracle>) -> AppState {
        AppState::build(self.config.clone(), oracle).unwrap()
    }

    fn listing(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.book)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn content(&self, name: &str) -> String {
        fs::read_to_string(self.book.join(name)).unwrap()
    }

    fn backup_root(&self) -> &Path {
        self.config.backup.root.as_deref().unwrap()
    }
}

fn options(dry_run: bool) -> RunOptions {
    RunOptions {
        dry_run,
        ..Default::default()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_orders_and_renames_folder() {
    let ws = Workspace::new(&["p1.png", "p2.png", "p3.png", "p4.png"]);
    let oracle = Arc::new(ScriptedOracle::new(&["p2.png", "p1.png", "p3.png", "p4.png"]));
    let state = ws.state(oracle.clone());

    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let report = state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, Some(TransactionState::Committed));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 6);
    assert_eq!(report.oracle_calls.made, 6);
    assert!(report.conflicts.is_empty());
    assert!(report.unresolved.is_empty());

    assert_eq!(
        ws.listing(),
        vec!["page_001.png", "page_002.png", "page_003.png", "page_004.png"]
    );
    assert_eq!(ws.content("page_001.png"), "image p2.png");
    assert_eq!(ws.content("page_002.png"), "image p1.png");
    assert_eq!(ws.content("page_003.png"), "image p3.png");
    assert_eq!(ws.content("page_004.png"), "image p4.png");

    let snapshots = BackupSnapshot::list(&StdFileSystem, ws.backup_root()).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(report.snapshot_id.as_deref(), Some(snapshots[0].id()));
    assert_eq!(snapshots[0].manifest.files.len(), 4);
}

#[tokio::test]
async fn test_restore_after_commit_brings_back_originals() {
    let ws = Workspace::new(&["p1.png", "p2.png", "p3.png"]);
    let state = ws.state(Arc::new(ScriptedOracle::new(&["p3.png", "p2.png", "p1.png"])));

    let items = state.scanner.scan_folder(&ws.book).unwrap();
    state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(ws.listing(), vec!["page_001.png", "page_002.png", "page_003.png"]);

    let snapshot = BackupSnapshot::list(&StdFileSystem, ws.backup_root())
        .unwrap()
        .remove(0);
    snapshot.restore(&StdFileSystem).unwrap();

    assert_eq!(ws.listing(), vec!["p1.png", "p2.png", "p3.png"]);
    assert_eq!(ws.content("p1.png"), "image p1.png");
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let ws = Workspace::new(&["p1.png", "p2.png", "p3.png", "p4.png"]);
    let order = ["p4.png", "p3.png", "p2.png", "p1.png"];

    let first_oracle = Arc::new(ScriptedOracle::new(&order));
    {
        let state = ws.state(first_oracle.clone());
        let items = state.scanner.scan_folder(&ws.book).unwrap();
        state
            .pipeline
            .run(&items, &options(true), &CancellationToken::new())
            .await
            .unwrap();
    }
    assert_eq!(first_oracle.calls.load(Ordering::SeqCst), 6);

    // fresh state, same database file
    let second_oracle = Arc::new(ScriptedOracle::new(&order));
    let state = ws.state(second_oracle.clone());
    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let report = state
        .pipeline
        .run(&items, &options(true), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second_oracle.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.oracle_calls.cached, 6);
    assert_eq!(report.state, Some(TransactionState::Planned));
    assert_eq!(report.plan[0].source, ws.book.join("p4.png"));
    assert_eq!(report.plan[0].target, ws.book.join("page_001.png"));
    // dry run leaves the folder alone
    assert_eq!(ws.listing(), vec!["p1.png", "p2.png", "p3.png", "p4.png"]);
}

#[tokio::test]
async fn test_cycle_is_reported_and_still_renamed() {
    let ws = Workspace::new(&["a.png", "b.png", "c.png"]);
    let state = ws.state(Arc::new(CyclicOracle));

    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let report = state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, Some(TransactionState::Committed));
    assert!(!report.conflicts.is_empty());
    assert!(report.conflict_count() >= 2);
    assert_eq!(ws.listing(), vec!["page_001.png", "page_002.png", "page_003.png"]);
}

#[tokio::test]
async fn test_strict_mode_refuses_cycles() {
    let ws = Workspace::new(&["a.png", "b.png", "c.png"]);
    let state = ws.state(Arc::new(CyclicOracle));

    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let result = state
        .pipeline
        .run(
            &items,
            &RunOptions {
                strict: true,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(AppError::InconsistentJudgmentSet { .. })));
    assert_eq!(ws.listing(), vec!["a.png", "b.png", "c.png"]);
}

#[tokio::test]
async fn test_cancelled_run_touches_nothing() {
    let ws = Workspace::new(&["p1.png", "p2.png"]);
    let oracle = Arc::new(ScriptedOracle::new(&["p2.png", "p1.png"]));
    let state = ws.state(oracle.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let result = state.pipeline.run(&items, &options(false), &cancel).await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    assert_eq!(ws.listing(), vec!["p1.png", "p2.png"]);
    assert!(BackupSnapshot::list(&StdFileSystem, ws.backup_root())
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_empty_folder_is_a_no_op() {
    let ws = Workspace::new(&[]);
    let state = ws.state(Arc::new(ScriptedOracle::new(&[])));

    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let report = state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.items.is_empty());
    assert_eq!(report.state, None);
}

#[tokio::test]
async fn test_unknown_names_stay_uncertain_and_fall_back_to_path_order() {
    let ws = Workspace::new(&["x.png", "y.png"]);
    let state = ws.state(Arc::new(ScriptedOracle::new(&[])));

    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let report = state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.oracle_calls.uncertain, 1);
    assert_eq!(ws.content("page_001.png"), "image x.png");
    assert_eq!(ws.content("page_002.png"), "image y.png");
}

#[tokio::test]
async fn test_second_run_after_commit_keeps_the_order() {
    let ws = Workspace::new(&["page_001.png", "page_002.png", "page_003.png"]);
    for (name, text) in [("page_001.png", "C"), ("page_002.png", "B"), ("page_003.png", "A")] {
        fs::write(ws.book.join(name), text).unwrap();
    }

    let first_oracle = Arc::new(ContentOracle::new());
    {
        let state = ws.state(first_oracle.clone());
        let items = state.scanner.scan_folder(&ws.book).unwrap();
        let report = state
            .pipeline
            .run(&items, &options(false), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, Some(TransactionState::Committed));
    }
    assert_eq!(first_oracle.calls.load(Ordering::SeqCst), 3);
    assert_eq!(ws.content("page_001.png"), "A");
    assert_eq!(ws.content("page_002.png"), "B");
    assert_eq!(ws.content("page_003.png"), "C");

    // Cached judgments now describe the files under their new names
    let second_oracle = Arc::new(ContentOracle::new());
    let state = ws.state(second_oracle.clone());
    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let report = state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.oracle_calls.made, 0);
    assert_eq!(report.oracle_calls.cached, 3);
    assert_eq!(second_oracle.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.state, Some(TransactionState::Committed));
    assert_eq!(ws.content("page_001.png"), "A");
    assert_eq!(ws.content("page_002.png"), "B");
    assert_eq!(ws.content("page_003.png"), "C");
}

#[tokio::test]
async fn test_items_from_several_folders_need_a_target() {
    let mut ws = Workspace::new(&["p1.png"]);
    fs::create_dir(ws.book.join("extra")).unwrap();
    fs::write(ws.book.join("extra").join("p2.png"), "image p2.png").unwrap();
    ws.config.scan.recursive = true;

    let oracle = Arc::new(ScriptedOracle::new(&["p2.png", "p1.png"]));
    let state = ws.state(oracle.clone());
    let items = state.scanner.scan_folder(&ws.book).unwrap();
    assert_eq!(items.len(), 2);

    let result = state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);

    let report = state
        .pipeline
        .run(
            &items,
            &RunOptions {
                target_directory: Some(ws.book.clone()),
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.state, Some(TransactionState::Committed));
    assert_eq!(report.directory.as_deref(), Some(ws.book.as_path()));
    assert_eq!(ws.listing(), vec!["extra", "page_001.png", "page_002.png"]);
    assert_eq!(ws.content("page_001.png"), "image p2.png");
    assert_eq!(ws.content("page_002.png"), "image p1.png");
}

#[tokio::test]
async fn test_failed_transaction_returns_the_run_report() {
    let mut ws = Workspace::new(&["p1.png", "p2.png"]);
    // A file where the backup root should be
    let blocked = ws.book.parent().unwrap().join("not_a_directory");
    fs::write(&blocked, b"").unwrap();
    ws.config.backup.root = Some(blocked);

    let state = ws.state(Arc::new(ScriptedOracle::new(&["p2.png", "p1.png"])));
    let items = state.scanner.scan_folder(&ws.book).unwrap();
    let result = state
        .pipeline
        .run(&items, &options(false), &CancellationToken::new())
        .await;

    let (cause, report) = match result {
        Err(AppError::TransactionFailed { cause, report }) => (cause, report),
        other => panic!("Expected TransactionFailed, got {:?}", other),
    };
    assert!(matches!(*cause, AppError::BackupFailure { .. }));
    assert_eq!(report.state, Some(TransactionState::Aborted));
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.oracle_calls.made, 1);
    assert_eq!(report.plan.len(), 2);
    assert_eq!(report.plan[0].source, ws.book.join("p2.png"));
    assert_eq!(
        report.transitions.iter().map(|t| t.to).collect::<Vec<_>>(),
        vec![TransactionState::Aborted]
    );
    assert_eq!(ws.listing(), vec!["p1.png", "p2.png"]);
}
