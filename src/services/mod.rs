// src/services/mod.rs
//
// Services Module - Orchestration Layer

pub mod comparison_orchestrator;
pub mod order_resolution_service;
pub mod pipeline_service;
pub mod pipeline_types;
pub mod rename_transaction;
pub mod scan_service;
pub mod sequence_service;


// Re-export all services and their types
pub use comparison_orchestrator::{
    ComparisonOrchestrator,
    ComparisonOutcome,
    ComparisonStats,
    OrchestratorSettings,
};

pub use order_resolution_service::{
    resolve_order,
    OrderResolutionService,
    ResolutionSettings,
};

pub use rename_transaction::{
    RenameTransactionManager,
    TransactionFailure,
    TransactionReport,
};

pub use scan_service::{
    FileInfo,
    HintRules,
    ScanService,
    DEFAULT_EXTENSIONS,
    DEFAULT_HINT_PATTERN,
};

pub use sequence_service::{
    SequenceReport,
    SequenceService,
};

pub use pipeline_service::PipelineService;

pub use pipeline_types::{
    OracleCallCounts,
    RunOptions,
    RunReport,
    UnresolvedPair,
};
