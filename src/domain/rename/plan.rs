// src/domain/rename/plan.rs
//
// Rename Plan
//
// CRITICAL INVARIANTS:
// - Targets are computed purely from order + naming config
// - Target extension is always the source extension
// - Planning never touches the filesystem

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::{DomainError, DomainResult};

// ============================================================================
// NAMING CONFIGURATION
// ============================================================================

/// How target file names are built: `{prefix}{index:0digits}{ext}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub prefix: String,

    /// Zero-padded width of the index
    pub digits: usize,

    /// Index given to the first item
    pub start_index: u64,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: "page_".to_string(),
            digits: 3,
            start_index: 1,
        }
    }
}

impl NamingConfig {
    /// Widest index a u64 can hold
    pub const MAX_DIGITS: usize = 20;

    /// Checks that `count` items can be named without overflowing the width
    pub fn validate(&self, count: usize) -> DomainResult<()> {
        if self.digits == 0 {
            return Err(DomainError::InvalidNaming(
                "digit width must be at least 1".to_string(),
            ));
        }

        if self.digits > Self::MAX_DIGITS {
            return Err(DomainError::InvalidNaming(format!(
                "digit width {} exceeds the maximum of {}",
                self.digits,
                Self::MAX_DIGITS
            )));
        }

        if self.prefix.contains(['/', '\\', '\0']) {
            return Err(DomainError::InvalidNaming(format!(
                "prefix {:?} must not contain path separators",
                self.prefix
            )));
        }

        if count == 0 {
            return Ok(());
        }

        let last_index = self
            .start_index
            .checked_add(count as u64 - 1)
            .ok_or_else(|| {
                DomainError::InvalidNaming(format!(
                    "start index {} overflows with {} items",
                    self.start_index, count
                ))
            })?;

        let needed = last_index.to_string().len();
        if needed > self.digits {
            return Err(DomainError::InvalidNaming(format!(
                "digit width {} cannot represent index {} ({} items starting at {})",
                self.digits, last_index, count, self.start_index
            )));
        }

        Ok(())
    }

    /// File name for the item at `index`, keeping the source extension
    pub fn target_name(&self, index: u64, dotted_extension: &str) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            dotted_extension,
            width = self.digits
        )
    }
}

// ============================================================================
// RENAME ENTRY
// ============================================================================

/// Progress of one entry through the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,

    /// Source already equals target
    Unchanged,

    /// Parked under a temporary name during the two-phase move
    Staged,

    Renamed,

    /// Restored to the source path after a failure
    RolledBack,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Pending => write!(f, "pending"),
            EntryStatus::Unchanged => write!(f, "unchanged"),
            EntryStatus::Staged => write!(f, "staged"),
            EntryStatus::Renamed => write!(f, "renamed"),
            EntryStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub index: u64,
    pub status: EntryStatus,
}

impl RenameEntry {
    pub fn is_noop(&self) -> bool {
        self.source == self.target
    }
}

// ============================================================================
// RENAME PLAN
// ============================================================================

/// Ordered (source, target) pairs for one directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePlan {
    pub directory: PathBuf,
    pub entries: Vec<RenameEntry>,
}

impl RenamePlan {
    /// Builds targets for `sources` in order. Pure: touches no disk.
    pub fn build(directory: &Path, sources: &[PathBuf], naming: &NamingConfig) -> Self {
        let entries = sources
            .iter()
            .enumerate()
            .map(|(offset, source)| {
                let index = naming.start_index + offset as u64;
                let extension = source
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                let target = directory.join(naming.target_name(index, &extension));
                let status = if *source == target {
                    EntryStatus::Unchanged
                } else {
                    EntryStatus::Pending
                };

                RenameEntry {
                    source: source.clone(),
                    target,
                    index,
                    status,
                }
            })
            .collect();

        Self {
            directory: directory.to_path_buf(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.source.as_path())
    }

    pub fn targets(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.target.as_path())
    }

    /// Entries that actually move
    pub fn moving_entries(&self) -> impl Iterator<Item = &RenameEntry> {
        self.entries.iter().filter(|e| !e.is_noop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name_padding() {
        let naming = NamingConfig::default();
        assert_eq!(naming.target_name(1, ".png"), "page_001.png");
        assert_eq!(naming.target_name(42, ".jpg"), "page_042.jpg");
        assert_eq!(naming.target_name(7, ""), "page_007");
    }

    #[test]
    fn test_width_too_small_fails() {
        let naming = NamingConfig {
            prefix: "p".to_string(),
            digits: 2,
            start_index: 1,
        };

        assert!(naming.validate(99).is_ok());
        assert!(matches!(
            naming.validate(100),
            Err(DomainError::InvalidNaming(_))
        ));
    }

    #[test]
    fn test_zero_digits_fails() {
        let naming = NamingConfig {
            digits: 0,
            ..NamingConfig::default()
        };
        assert!(naming.validate(1).is_err());
    }

    #[test]
    fn test_start_index_counts_towards_width() {
        let naming = NamingConfig {
            prefix: String::new(),
            digits: 1,
            start_index: 0,
        };
        assert!(naming.validate(10).is_ok());

        let naming = NamingConfig {
            start_index: 1,
            ..naming
        };
        assert!(naming.validate(10).is_err());
    }

    #[test]
    fn test_prefix_with_separator_fails() {
        let naming = NamingConfig {
            prefix: "../escape_".to_string(),
            ..NamingConfig::default()
        };
        assert!(naming.validate(3).is_err());
    }

    #[test]
    fn test_build_preserves_extension_and_order() {
        let dir = Path::new("/book");
        let sources = vec![
            PathBuf::from("/book/p2.png"),
            PathBuf::from("/book/p1.JPG"),
            PathBuf::from("/book/page_003"),
        ];

        let plan = RenamePlan::build(dir, &sources, &NamingConfig::default());

        let targets: Vec<_> = plan.targets().map(Path::to_path_buf).collect();
        assert_eq!(
            targets,
            vec![
                PathBuf::from("/book/page_001.png"),
                PathBuf::from("/book/page_002.JPG"),
                PathBuf::from("/book/page_003"),
            ]
        );
        assert_eq!(plan.entries[2].status, EntryStatus::Unchanged);
        assert_eq!(plan.moving_entries().count(), 2);
    }
}
