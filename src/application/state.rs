// src/application/state.rs
//
// Wires configuration, cache, oracle and services into one shared state.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::create_connection_pool;
use crate::error::AppResult;
use crate::events::EventBus;
use crate::infrastructure::{FileSystem, StdFileSystem};
use crate::integrations::Oracle;
use crate::repositories::{InMemoryJudgmentRepository, JudgmentRepository, SqliteJudgmentRepository};
use crate::services::{
    ComparisonOrchestrator, OrderResolutionService, PipelineService, RenameTransactionManager,
    ScanService,
};

/// Application state shared by the CLI commands.
/// All fields are Arc-wrapped for sharing with worker tasks.
pub struct AppState {
    pub config: AppConfig,
    pub event_bus: Arc<EventBus>,
    pub cache: Arc<dyn JudgmentRepository>,
    pub scanner: Arc<ScanService>,
    pub transactions: Arc<RenameTransactionManager>,
    pub pipeline: Arc<PipelineService>,
}

impl AppState {
    pub fn build(config: AppConfig, oracle: Arc<dyn Oracle>) -> AppResult<Self> {
        // 1. INFRASTRUCTURE
        let event_bus = Arc::new(EventBus::new());
        let fs: Arc<dyn FileSystem> = Arc::new(StdFileSystem);
        let cache = open_cache(&config)?;

        // 2. SERVICES
        let scanner = Arc::new(config.scan_service()?);
        let orchestrator = Arc::new(ComparisonOrchestrator::new(
            oracle,
            Arc::clone(&cache),
            Arc::clone(&event_bus),
            config.orchestrator.settings(),
        ));
        let resolver = Arc::new(OrderResolutionService::new(
            Arc::clone(&event_bus),
            config.resolution_settings(),
        ));
        let transactions = Arc::new(RenameTransactionManager::new(
            fs,
            Arc::clone(&event_bus),
            config.backup_root()?,
        ));
        let pipeline = Arc::new(PipelineService::new(
            orchestrator,
            resolver,
            Arc::clone(&transactions),
        ));

        Ok(Self {
            config,
            event_bus,
            cache,
            scanner,
            transactions,
            pipeline,
        })
    }
}

/// SQLite cache at the configured path, or a throwaway in-memory one when
/// caching is disabled
pub fn open_cache(config: &AppConfig) -> AppResult<Arc<dyn JudgmentRepository>> {
    if !config.cache.enabled {
        log::info!("Comparison cache disabled; judgments live for this run only");
        return Ok(Arc::new(InMemoryJudgmentRepository::new()));
    }

    let path = config.cache_database_path()?;
    let pool = Arc::new(create_connection_pool(&path)?);
    log::debug!("Comparison cache at {:?}", path);

    Ok(Arc::new(SqliteJudgmentRepository::new(pool)?))
}
