// src/application/error_handling.rs
//
// Error presentation for the CLI
//
// ARCHITECTURE:
// - Maps internal errors to a stable category, message and exit code
// - Consistent JSON shape for `--json` output
// - A failed run keeps its report (order, plan, transitions) in the output
// - Logs the full error for debugging

use serde::Serialize;
use std::path::PathBuf;

use crate::domain::TransactionState;
use crate::error::{AppError, FsErrorKind};
use crate::services::RunReport;

/// Standard error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error_type: ErrorType,
    pub message: String,
    pub details: Option<String>,

    /// Snapshot to restore from, when one exists
    pub snapshot_id: Option<String>,

    /// Paths left without their original content
    pub unrestored: Vec<PathBuf>,

    /// Transaction state reached, for transaction failures
    pub state: Option<TransactionState>,

    /// Everything the run established before failing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Box<RunReport>>,
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Missing folder, file or snapshot
    NotFound,

    /// Bad configuration or arguments
    Validation,

    /// Targets collide with each other or with foreign files
    Collision,

    /// Judgments contradict the order (strict mode only)
    Inconsistent,

    /// Backup failed; nothing was renamed
    Backup,

    /// Rename failed and was rolled back
    RolledBack,

    /// Rollback failed; the folder needs a manual restore
    ManualRecovery,

    /// Comparison cache failure
    Database,

    FileSystem,
    Cancelled,
    Internal,
}

impl ErrorType {
    /// Process exit code for this category
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorType::Validation => 2,
            ErrorType::NotFound => 3,
            ErrorType::Collision => 4,
            ErrorType::Inconsistent => 5,
            ErrorType::Backup => 6,
            ErrorType::RolledBack => 7,
            ErrorType::ManualRecovery => 8,
            ErrorType::Cancelled => 130,
            ErrorType::Database | ErrorType::FileSystem | ErrorType::Internal => 1,
        }
    }
}

impl ErrorResponse {
    fn new(error_type: ErrorType, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            error_type,
            message: message.into(),
            details,
            snapshot_id: None,
            unrestored: Vec::new(),
            state: None,
            report: None,
        }
    }

    /// Create error response from AppError
    pub fn from_app_error(error: AppError) -> Self {
        match error {
            AppError::NotFound(what) => Self::new(ErrorType::NotFound, what, None),

            AppError::InvalidConfiguration(message) => {
                Self::new(ErrorType::Validation, "Invalid configuration", Some(message))
            }

            AppError::PlanCollision(message) => Self::new(
                ErrorType::Collision,
                "Rename targets collide; nothing was changed",
                Some(message),
            ),

            AppError::InconsistentJudgmentSet { conflicts } => Self::new(
                ErrorType::Inconsistent,
                format!("{} judgments contradict the resolved order", conflicts),
                None,
            ),

            AppError::BackupFailure {
                kind,
                path,
                message,
            } => Self::new(
                ErrorType::Backup,
                format!("Backup failed ({}); nothing was renamed", kind),
                Some(format!("{}: {}", path.display(), message)),
            ),

            AppError::RenameFailure {
                kind,
                path,
                message,
                state,
                snapshot_id,
            } => Self {
                snapshot_id: Some(snapshot_id),
                state: Some(state),
                ..Self::new(
                    ErrorType::RolledBack,
                    format!("Rename failed ({}); original names restored, transaction {}", kind, state),
                    Some(format!("{}: {}", path.display(), message)),
                )
            },

            AppError::RollbackFailure {
                state,
                snapshot_id,
                message,
                unrestored,
            } => {
                log::error!("Rollback failure in {}: {}", state, message);

                Self {
                    snapshot_id: Some(snapshot_id.clone()),
                    unrestored,
                    state: Some(state),
                    ..Self::new(
                        ErrorType::ManualRecovery,
                        format!(
                            "Rollback failed; run `pageorder restore` with snapshot {}",
                            snapshot_id
                        ),
                        Some(message),
                    )
                }
            }

            AppError::TransactionFailed { cause, report } => {
                let response = Self::from_app_error(*cause);
                Self {
                    state: response.state.or(report.state),
                    snapshot_id: response.snapshot_id.clone().or_else(|| report.snapshot_id.clone()),
                    report: Some(report),
                    ..response
                }
            }

            AppError::Cancelled => Self::new(ErrorType::Cancelled, "Cancelled", None),

            AppError::Database(db_error) => {
                log::error!("Database error: {:?}", db_error);
                Self::new(
                    ErrorType::Database,
                    "Comparison cache operation failed",
                    Some("Check logs for details".to_string()),
                )
            }

            AppError::Pool(pool_error) => {
                log::error!("Connection pool error: {}", pool_error);
                Self::new(ErrorType::Database, "Comparison cache unavailable", None)
            }

            AppError::Io(io_error) => {
                let kind = FsErrorKind::classify(&io_error);
                Self::new(
                    ErrorType::FileSystem,
                    format!("File system operation failed ({})", kind),
                    Some(io_error.to_string()),
                )
            }

            AppError::Domain(domain_error) => Self::new(
                ErrorType::Validation,
                "Invalid input",
                Some(domain_error.to_string()),
            ),

            error @ (AppError::OracleTimeout { .. }
            | AppError::OracleTransientFailure(_)
            | AppError::Serialization(_)
            | AppError::Other(_)) => {
                log::error!("Internal error: {}", error);
                Self::new(ErrorType::Internal, error.to_string(), None)
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.error_type.exit_code()
    }

    /// Create validation error
    pub fn validation(message: String) -> Self {
        Self::new(ErrorType::Validation, message, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_maps_to_collision() {
        let error = ErrorResponse::from_app_error(AppError::PlanCollision("a and b".to_string()));
        assert_eq!(error.error_type, ErrorType::Collision);
        assert_eq!(error.details.as_deref(), Some("a and b"));
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn test_rename_failure_carries_snapshot() {
        let error = ErrorResponse::from_app_error(AppError::RenameFailure {
            kind: FsErrorKind::DiskFull,
            path: PathBuf::from("/book/p3.png"),
            message: "no space".to_string(),
            state: TransactionState::Aborted,
            snapshot_id: "book_20260101_120000".to_string(),
        });

        assert_eq!(error.error_type, ErrorType::RolledBack);
        assert_eq!(error.snapshot_id.as_deref(), Some("book_20260101_120000"));
        assert!(error.message.contains("disk full"));
        assert!(error.message.contains("ABORTED"));
    }

    #[test]
    fn test_rollback_failure_lists_unrestored() {
        let error = ErrorResponse::from_app_error(AppError::RollbackFailure {
            state: TransactionState::Renaming,
            snapshot_id: "snap".to_string(),
            message: "copy failed".to_string(),
            unrestored: vec![PathBuf::from("/book/p1.png")],
        });

        assert_eq!(error.error_type, ErrorType::ManualRecovery);
        assert_eq!(error.unrestored, vec![PathBuf::from("/book/p1.png")]);
        assert_eq!(error.state, Some(TransactionState::Renaming));
    }

    #[test]
    fn test_rolled_back_run_keeps_its_report() {
        use crate::domain::{EntryStatus, RenameEntry};
        use TransactionState::*;

        let report = RunReport {
            directory: Some(PathBuf::from("/book")),
            plan: vec![RenameEntry {
                source: PathBuf::from("/book/p1.png"),
                target: PathBuf::from("/book/page_001.png"),
                index: 1,
                status: EntryStatus::RolledBack,
            }],
            state: Some(Aborted),
            snapshot_id: Some("book_20260101_120000".to_string()),
            transitions: vec![
                Planned.transition(BackedUp).unwrap(),
                BackedUp.transition(Renaming).unwrap(),
                Renaming.transition(Aborted).unwrap(),
            ],
            ..Default::default()
        };

        let error = ErrorResponse::from_app_error(AppError::TransactionFailed {
            cause: Box::new(AppError::RenameFailure {
                kind: FsErrorKind::PermissionDenied,
                path: PathBuf::from("/book/p1.png"),
                message: "read-only".to_string(),
                state: Aborted,
                snapshot_id: "book_20260101_120000".to_string(),
            }),
            report: Box::new(report),
        });

        assert_eq!(error.error_type, ErrorType::RolledBack);
        assert_eq!(error.exit_code(), 7);
        assert_eq!(error.state, Some(Aborted));

        let json: serde_json::Value = serde_json::to_value(&error).unwrap();
        assert_eq!(json["state"], "ABORTED");
        assert_eq!(json["report"]["plan"][0]["status"], "rolled_back");
        assert_eq!(json["report"]["plan"][0]["target"], "/book/page_001.png");
        assert_eq!(json["report"]["transitions"].as_array().unwrap().len(), 3);
        assert_eq!(json["report"]["transitions"][1]["to"], "RENAMING");
        assert_eq!(json["report"]["transitions"][2]["to"], "ABORTED");
    }

    #[test]
    fn test_serialization() {
        let error = ErrorResponse::validation("digits must be at least 1".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(!json.contains("\"report\""));
        assert!(json.contains("validation"));
        assert!(json.contains("digits must be at least 1"));
    }
}
