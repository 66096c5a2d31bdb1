// src/config.rs
//
// Application configuration
//
// Loaded from an optional JSON file, then environment overrides, then
// validated. Every field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::default_database_path;
use crate::domain::NamingConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::default_backup_root;
use crate::services::{
    HintRules, OrchestratorSettings, ResolutionSettings, ScanService, DEFAULT_EXTENSIONS,
    DEFAULT_HINT_PATTERN,
};

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub call_timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub retry_failed_cached: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            call_timeout_ms: 60_000,
            max_retries: 2,
            initial_backoff_ms: 250,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
            retry_failed_cached: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            workers: self.workers,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            retry_failed_cached: self.retry_failed_cached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub max_cycle_breaks: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_cycle_breaks: ResolutionSettings::default().max_cycle_breaks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Defaults to {CACHE_DIR}/pageorder/judgments.db
    pub database_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Defaults to {LOCAL_DATA_DIR}/pageorder/backups
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    pub recursive: bool,
    pub hint_pattern: String,

    /// Files smaller than this many bytes are skipped
    pub min_size: Option<u64>,

    /// Files larger than this many bytes are skipped
    pub max_size: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            recursive: false,
            hint_pattern: DEFAULT_HINT_PATTERN.to_string(),
            min_size: None,
            max_size: None,
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub naming: NamingConfig,
    pub orchestrator: OrchestratorConfig,
    pub resolution: ResolutionConfig,
    pub cache: CacheConfig,
    pub backup: BackupConfig,
    pub scan: ScanConfig,
}

impl AppConfig {
    /// Reads `path` when given (a missing file is an error), applies
    /// environment overrides and validates
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AppError::InvalidConfiguration(format!(
                        "cannot read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let config: Self = serde_json::from_str(&content).map_err(|e| {
                    AppError::InvalidConfiguration(format!(
                        "cannot parse config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                log::debug!("Loaded configuration from {:?}", path);
                config
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(workers) = std::env::var("PAGEORDER_WORKERS") {
            match workers.parse::<usize>() {
                Ok(value) => self.orchestrator.workers = value,
                Err(e) => log::warn!(
                    "Invalid PAGEORDER_WORKERS value '{}': {}. Using {}.",
                    workers,
                    e,
                    self.orchestrator.workers
                ),
            }
        }
        if let Ok(root) = std::env::var("PAGEORDER_BACKUP_ROOT") {
            self.backup.root = Some(PathBuf::from(root));
        }
        if let Ok(path) = std::env::var("PAGEORDER_CACHE_DB") {
            self.cache.database_path = Some(PathBuf::from(path));
        }
    }

    /// Collects every problem before failing
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();

        self.validate_naming(&mut errors);
        self.validate_orchestrator(&mut errors);
        self.validate_scan(&mut errors);

        if !errors.is_empty() {
            return Err(AppError::InvalidConfiguration(errors.join(", ")));
        }

        Ok(())
    }

    fn validate_naming(&self, errors: &mut Vec<String>) {
        // item count is unknown here; width against count is checked at planning
        if let Err(e) = self.naming.validate(0) {
            errors.push(e.to_string());
        }
    }

    fn validate_orchestrator(&self, errors: &mut Vec<String>) {
        let o = &self.orchestrator;

        if o.workers == 0 {
            errors.push("Workers must be at least 1".to_string());
        }
        if o.workers > 256 {
            errors.push("Workers is too large (>256)".to_string());
        }
        if o.call_timeout_ms == 0 {
            errors.push("Call timeout must be greater than 0".to_string());
        }
        if !o.backoff_multiplier.is_finite() || o.backoff_multiplier < 1.0 {
            errors.push("Backoff multiplier must be at least 1.0".to_string());
        }
        if o.max_backoff_ms < o.initial_backoff_ms {
            errors.push("Max backoff must not be below the initial backoff".to_string());
        }
    }

    fn validate_scan(&self, errors: &mut Vec<String>) {
        if self.scan.extensions.is_empty() {
            errors.push("At least one image extension is required".to_string());
        }
        if let Err(e) = regex::Regex::new(&self.scan.hint_pattern) {
            errors.push(format!("Invalid hint pattern: {}", e));
        }
        if let (Some(min), Some(max)) = (self.scan.min_size, self.scan.max_size) {
            if min > max {
                errors.push(format!("Minimum size {} exceeds maximum size {}", min, max));
            }
        }
    }

    // ------------------------------------------------------------------------
    // DERIVED SETTINGS
    // ------------------------------------------------------------------------

    pub fn resolution_settings(&self) -> ResolutionSettings {
        ResolutionSettings {
            max_cycle_breaks: self.resolution.max_cycle_breaks,
        }
    }

    pub fn backup_root(&self) -> AppResult<PathBuf> {
        match &self.backup.root {
            Some(root) => Ok(root.clone()),
            None => default_backup_root(),
        }
    }

    pub fn cache_database_path(&self) -> AppResult<PathBuf> {
        match &self.cache.database_path {
            Some(path) => Ok(path.clone()),
            None => default_database_path(),
        }
    }

    pub fn scan_service(&self) -> AppResult<ScanService> {
        Ok(ScanService::new(
            self.scan.extensions.iter().cloned(),
            self.scan.recursive,
            HintRules::new(&self.scan.hint_pattern)?,
        )
        .with_size_limits(self.scan.min_size, self.scan.max_size))
    }
}
