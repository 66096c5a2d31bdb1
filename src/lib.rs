// src/lib.rs
// PageOrder - order page images by pairwise judgment, rename them atomically
//
// Architecture:
// - Domain-centric: items, judgments, orders and rename plans live in `domain`
// - Event-driven: services report progress and state changes through events
// - Explicit: no rename happens without a verified backup snapshot
// - Local-first: the comparison cache and backups stay on this machine

// ============================================================================
// FOUNDATION
// ============================================================================

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod infrastructure;
pub mod repositories;
pub mod services;

// ============================================================================
// APPLICATION LAYER
// ============================================================================

pub mod application;
pub mod integrations;

// ============================================================================
// PUBLIC API - Domain
// ============================================================================

pub use domain::{
    validate_items,
    validate_plan,
    ConflictEdge,
    EntryStatus,
    // Item
    Item,
    // Judgment
    Judgment,
    JudgmentSet,
    // Rename
    NamingConfig,
    // Ordering
    OrderResult,
    PairKey,
    PlacedItem,
    PlacementSource,
    RenameEntry,
    RenamePlan,
    StateTransition,
    TransactionState,
    Verdict,
};

// ============================================================================
// PUBLIC API - Errors, Config, Events
// ============================================================================

pub use config::AppConfig;
pub use error::{AppError, AppResult, FsErrorKind};

pub use events::{create_event_bus, DomainEvent, EventBus, EventLogEntry};

// ============================================================================
// PUBLIC API - Persistence & Infrastructure
// ============================================================================

pub use db::{create_connection_pool, initialize_database, ConnectionPool};
pub use infrastructure::{BackupSnapshot, FileSystem, StdFileSystem};
pub use repositories::{InMemoryJudgmentRepository, JudgmentRepository, SqliteJudgmentRepository};

// ============================================================================
// PUBLIC API - Services & Integrations
// ============================================================================

pub use services::{
    ComparisonOrchestrator,
    OrchestratorSettings,
    OrderResolutionService,
    PipelineService,
    RenameTransactionManager,
    ResolutionSettings,
    RunOptions,
    RunReport,
    ScanService,
    SequenceService,
};

pub use application::AppState;
pub use integrations::{HintOracle, Oracle, OracleError, OracleJudgment, OracleVerdict};
