// src/error/types.rs
use crate::domain::{DomainError, TransactionState};
use crate::services::RunReport;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// FILESYSTEM ERROR KINDS
// ============================================================================

/// Filesystem failure classes surfaced by backup and rename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsErrorKind {
    DiskFull,
    PermissionDenied,
    PathTooLong,
    NotFound,
    Other,
}

impl FsErrorKind {
    pub fn classify(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::PermissionDenied => return FsErrorKind::PermissionDenied,
            ErrorKind::NotFound => return FsErrorKind::NotFound,
            _ => {}
        }

        match err.raw_os_error() {
            Some(code) if DISK_FULL_CODES.contains(&code) => FsErrorKind::DiskFull,
            Some(code) if PATH_TOO_LONG_CODES.contains(&code) => FsErrorKind::PathTooLong,
            _ => FsErrorKind::Other,
        }
    }
}

impl std::fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsErrorKind::DiskFull => write!(f, "disk full"),
            FsErrorKind::PermissionDenied => write!(f, "permission denied"),
            FsErrorKind::PathTooLong => write!(f, "path too long"),
            FsErrorKind::NotFound => write!(f, "not found"),
            FsErrorKind::Other => write!(f, "i/o failure"),
        }
    }
}

// ENOSPC, EDQUOT / ENAMETOOLONG
#[cfg(target_os = "linux")]
const DISK_FULL_CODES: &[i32] = &[28, 122];
#[cfg(target_os = "linux")]
const PATH_TOO_LONG_CODES: &[i32] = &[36];

#[cfg(target_os = "macos")]
const DISK_FULL_CODES: &[i32] = &[28, 69];
#[cfg(target_os = "macos")]
const PATH_TOO_LONG_CODES: &[i32] = &[63];

// ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL / ERROR_FILENAME_EXCED_RANGE
#[cfg(windows)]
const DISK_FULL_CODES: &[i32] = &[39, 112];
#[cfg(windows)]
const PATH_TOO_LONG_CODES: &[i32] = &[206];

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
const DISK_FULL_CODES: &[i32] = &[28];
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
const PATH_TOO_LONG_CODES: &[i32] = &[63];

// ============================================================================
// APPLICATION ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Oracle timed out after {timeout_ms} ms on {pair}")]
    OracleTimeout { pair: String, timeout_ms: u64 },

    #[error("Oracle call failed: {0}")]
    OracleTransientFailure(String),

    #[error("Judgment set is inconsistent: {conflicts} stored judgments contradict the order")]
    InconsistentJudgmentSet { conflicts: usize },

    #[error("Plan collision: {0}")]
    PlanCollision(String),

    #[error("Backup failed ({kind}) at {path:?}: {message}")]
    BackupFailure {
        kind: FsErrorKind,
        path: PathBuf,
        message: String,
    },

    #[error("Rename failed ({kind}) at {path:?}: {message}; transaction {state}, snapshot {snapshot_id}")]
    RenameFailure {
        kind: FsErrorKind,
        path: PathBuf,
        message: String,
        state: TransactionState,
        snapshot_id: String,
    },

    #[error("Rollback failed in {state}, restore manually from snapshot {snapshot_id}: {message}")]
    RollbackFailure {
        state: TransactionState,
        snapshot_id: String,
        message: String,
        unrestored: Vec<PathBuf>,
    },

    /// A transaction failure raised by a pipeline run, with everything the
    /// run established before it
    #[error("{cause}")]
    TransactionFailed {
        cause: Box<AppError>,
        report: Box<RunReport>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Domain error: {0}")]
    Domain(DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl AppError {
    /// Snapshot to recover from, for transaction-level failures
    pub fn snapshot_id(&self) -> Option<&str> {
        match self {
            AppError::RenameFailure { snapshot_id, .. }
            | AppError::RollbackFailure { snapshot_id, .. } => Some(snapshot_id),
            AppError::TransactionFailed { cause, .. } => cause.snapshot_id(),
            _ => None,
        }
    }

    /// True when the directory may be left in a mixed state
    pub fn requires_manual_recovery(&self) -> bool {
        match self {
            AppError::RollbackFailure { .. } => true,
            AppError::TransactionFailed { cause, .. } => cause.requires_manual_recovery(),
            _ => false,
        }
    }

    /// Transaction state reached, when the error carries one
    pub fn transaction_state(&self) -> Option<TransactionState> {
        match self {
            AppError::RenameFailure { state, .. } | AppError::RollbackFailure { state, .. } => {
                Some(*state)
            }
            AppError::TransactionFailed { cause, report } => {
                report.state.or_else(|| cause.transaction_state())
            }
            _ => None,
        }
    }

    /// The failure beneath any pipeline wrapper
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::TransactionFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Collision(message) => AppError::PlanCollision(message),
            DomainError::InvalidNaming(message) => AppError::InvalidConfiguration(message),
            other => AppError::Domain(other),
        }
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::Other(format!("Date parse error: {}", err))
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Pool(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::InvalidConfiguration(format!("Invalid pattern: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_classify_by_kind() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(FsErrorKind::classify(&denied), FsErrorKind::PermissionDenied);

        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(FsErrorKind::classify(&missing), FsErrorKind::NotFound);

        let other = io::Error::new(io::ErrorKind::Other, "weird");
        assert_eq!(FsErrorKind::classify(&other), FsErrorKind::Other);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_classify_by_os_code() {
        assert_eq!(
            FsErrorKind::classify(&io::Error::from_raw_os_error(28)),
            FsErrorKind::DiskFull
        );
        assert_eq!(
            FsErrorKind::classify(&io::Error::from_raw_os_error(36)),
            FsErrorKind::PathTooLong
        );
    }

    #[test]
    fn test_domain_errors_map_to_planning_kinds() {
        let err: AppError = DomainError::Collision("x".to_string()).into();
        assert!(matches!(err, AppError::PlanCollision(_)));

        let err: AppError = DomainError::InvalidNaming("y".to_string()).into();
        assert!(matches!(err, AppError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_serializes_as_message() {
        let err = AppError::RollbackFailure {
            state: TransactionState::Renaming,
            snapshot_id: "book_20260101_120000".to_string(),
            message: "disk full".to_string(),
            unrestored: vec![PathBuf::from("/book/a.png")],
        };

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("book_20260101_120000"));
        assert_eq!(err.snapshot_id(), Some("book_20260101_120000"));
        assert!(err.requires_manual_recovery());
        assert_eq!(err.transaction_state(), Some(TransactionState::Renaming));
        assert!(err.to_string().contains("RENAMING"));
    }

    #[test]
    fn test_wrapped_failure_delegates_to_cause() {
        let err = AppError::TransactionFailed {
            cause: Box::new(AppError::RenameFailure {
                kind: FsErrorKind::DiskFull,
                path: PathBuf::from("/book/p3.png"),
                message: "no space".to_string(),
                state: TransactionState::Aborted,
                snapshot_id: "book_20260101_120000".to_string(),
            }),
            report: Box::default(),
        };

        assert_eq!(err.snapshot_id(), Some("book_20260101_120000"));
        assert!(!err.requires_manual_recovery());
        assert_eq!(err.transaction_state(), Some(TransactionState::Aborted));
        assert!(matches!(err.root_cause(), AppError::RenameFailure { .. }));
        assert!(err.to_string().contains("disk full"));
    }
}
