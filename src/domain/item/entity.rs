use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A reorderable file, identified by its original path.
/// Items are immutable once scanning completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Original path of the file (unique within a run)
    pub path: PathBuf,

    /// Numeric hint extracted from the file name, if any
    pub hint: Option<u64>,
}

impl Item {
    /// Create an item without a numeric hint
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hint: None,
        }
    }

    /// Create an item carrying a numeric hint
    pub fn with_hint(path: impl Into<PathBuf>, hint: Option<u64>) -> Self {
        Self {
            path: path.into(),
            hint,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for display and logging
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Extension including the leading dot, or an empty string
    pub fn dotted_extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_extension() {
        assert_eq!(Item::new("/pages/p1.png").dotted_extension(), ".png");
        assert_eq!(Item::new("/pages/README").dotted_extension(), "");
        assert_eq!(Item::new("/pages/scan.JPG").dotted_extension(), ".JPG");
    }

    #[test]
    fn test_file_name_display() {
        let item = Item::with_hint("/pages/p12.png", Some(12));
        assert_eq!(item.to_string(), "p12.png");
        assert_eq!(item.hint, Some(12));
    }
}
