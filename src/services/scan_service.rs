// src/services/scan_service.rs
//
// Scan Service
//
// Discovers image files in a folder and turns them into Items.
//
// CRITICAL RULES:
// - Discovery order is the lower-cased file name, then the full path
// - Extension matching ignores case
// - Size limits are inclusive
// - Reads directory entries and metadata only; never opens or modifies a file

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::domain::Item;
use crate::error::{AppError, AppResult};

/// Extensions picked up when no list is configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

pub const DEFAULT_HINT_PATTERN: &str = r"\d+";

// ============================================================================
// HINT RULES
// ============================================================================

/// Extracts the numeric hint from a file stem: the first match of the
/// pattern (or of its first capture group, when it has one)
#[derive(Debug, Clone)]
pub struct HintRules {
    pattern: Regex,
}

impl Default for HintRules {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_HINT_PATTERN).expect("default hint pattern is valid"),
        }
    }
}

impl HintRules {
    pub fn new(pattern: &str) -> AppResult<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn parse_hint(&self, path: &Path) -> Option<u64> {
        let stem = path.file_stem()?.to_str()?;
        let captures = self.pattern.captures(stem)?;
        let matched = captures.get(1).or_else(|| captures.get(0))?;
        matched.as_str().parse().ok()
    }
}

// ============================================================================
// FILE INFO
// ============================================================================

/// What the scanner knows about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,

    /// Lower-cased, without the dot
    pub extension: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub hint: Option<u64>,
}

// ============================================================================
// SCAN SERVICE
// ============================================================================

pub struct ScanService {
    extensions: Vec<String>,
    recursive: bool,
    hints: HintRules,
    min_size: Option<u64>,
    max_size: Option<u64>,
}

impl Default for ScanService {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()), false, HintRules::default())
    }
}

impl ScanService {
    /// Extensions are matched without the leading dot and without case
    pub fn new(extensions: impl IntoIterator<Item = String>, recursive: bool, hints: HintRules) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            extensions,
            recursive,
            hints,
            min_size: None,
            max_size: None,
        }
    }

    /// Skip files outside `[min, max]` bytes
    pub fn with_size_limits(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    /// Items for every matching file under `directory`, in discovery order
    pub fn scan_folder(&self, directory: &Path) -> AppResult<Vec<Item>> {
        let items: Vec<Item> = self
            .discover(directory)?
            .into_iter()
            .map(|path| {
                let hint = self.hints.parse_hint(&path);
                Item::with_hint(path, hint)
            })
            .collect();

        log::info!(
            "Found {} images in {} ({} with a numeric hint)",
            items.len(),
            directory.display(),
            items.iter().filter(|i| i.hint.is_some()).count()
        );

        Ok(items)
    }

    /// `FileInfo` for every matching file, in discovery order
    pub fn scan_info(&self, directory: &Path) -> AppResult<Vec<FileInfo>> {
        self.discover(directory)?
            .iter()
            .map(|path| self.file_info(path))
            .collect()
    }

    pub fn file_info(&self, path: &Path) -> AppResult<FileInfo> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::NotFound(format!("file does not exist: {}", path.display()))
            }
            _ => AppError::Io(e),
        })?;

        Ok(FileInfo {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            size: metadata.len(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase()),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            hint: self.hints.parse_hint(path),
        })
    }

    fn discover(&self, directory: &Path) -> AppResult<Vec<PathBuf>> {
        if !directory.exists() {
            return Err(AppError::NotFound(format!(
                "folder does not exist: {}",
                directory.display()
            )));
        }
        if !directory.is_dir() {
            return Err(AppError::InvalidConfiguration(format!(
                "path is not a directory: {}",
                directory.display()
            )));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut paths: Vec<PathBuf> = Vec::new();

        for entry in walkdir::WalkDir::new(directory)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_supported(entry.path()) {
                continue;
            }

            if self.min_size.is_some() || self.max_size.is_some() {
                let size = match entry.metadata() {
                    Ok(metadata) => metadata.len(),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", entry.path().display(), e);
                        continue;
                    }
                };
                if !self.size_allowed(size) {
                    log::debug!("Skipping {} ({} bytes)", entry.path().display(), size);
                    continue;
                }
            }

            paths.push(entry.into_path());
        }

        paths.sort_by_cached_key(|p| (lowercase_name(p), p.clone()));
        Ok(paths)
    }

    fn size_allowed(&self, size: u64) -> bool {
        self.min_size.map_or(true, |min| size >= min) && self.max_size.map_or(true, |max| size <= max)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

fn lowercase_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"img").unwrap();
    }

    fn names(items: &[Item]) -> Vec<String> {
        items.iter().map(Item::file_name).collect()
    }

    #[test]
    fn test_scan_filters_and_sorts_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "A.jpg", "notes.txt", "c.webp", "D.Gif"] {
            touch(dir.path(), name);
        }

        let items = ScanService::default().scan_folder(dir.path()).unwrap();

        assert_eq!(names(&items), vec!["A.jpg", "b.PNG", "c.webp", "D.Gif"]);
    }

    #[test]
    fn test_scan_is_flat_unless_recursive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "p1.png");
        fs::create_dir(dir.path().join("extra")).unwrap();
        touch(&dir.path().join("extra"), "p2.png");

        let flat = ScanService::default().scan_folder(dir.path()).unwrap();
        assert_eq!(names(&flat), vec!["p1.png"]);

        let deep = ScanService::new(
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()),
            true,
            HintRules::default(),
        )
        .scan_folder(dir.path())
        .unwrap();
        assert_eq!(names(&deep), vec!["p1.png", "p2.png"]);
    }

    #[test]
    fn test_hints_are_extracted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "page10.png");
        touch(dir.path(), "cover.png");

        let items = ScanService::default().scan_folder(dir.path()).unwrap();

        assert_eq!(items[0].file_name(), "cover.png");
        assert_eq!(items[0].hint, None);
        assert_eq!(items[1].hint, Some(10));
    }

    #[test]
    fn test_custom_hint_pattern_uses_capture_group() {
        let rules = HintRules::new(r"_(\d+)$").unwrap();
        assert_eq!(rules.parse_hint(Path::new("/b/vol2_page_07.png")), Some(7));
        assert_eq!(rules.parse_hint(Path::new("/b/vol2.png")), None);
    }

    #[test]
    fn test_invalid_hint_pattern_is_configuration_error() {
        assert!(matches!(
            HintRules::new("(unclosed"),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_missing_and_non_directory_paths_fail() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "file.png");
        let service = ScanService::default();

        assert!(matches!(
            service.scan_folder(&dir.path().join("nope")),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.scan_folder(&dir.path().join("file.png")),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_size_limits_are_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("thumb.png"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("page.png"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("poster.png"), vec![0u8; 1000]).unwrap();

        let service = ScanService::default().with_size_limits(Some(100), Some(999));
        assert_eq!(names(&service.scan_folder(dir.path()).unwrap()), vec!["page.png"]);

        let service = ScanService::default().with_size_limits(Some(100), None);
        assert_eq!(
            names(&service.scan_folder(dir.path()).unwrap()),
            vec!["page.png", "poster.png"]
        );
    }

    #[test]
    fn test_file_info_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Page12.PNG"), vec![0u8; 42]).unwrap();
        let service = ScanService::default();

        let info = service.file_info(&dir.path().join("Page12.PNG")).unwrap();

        assert_eq!(info.name, "Page12.PNG");
        assert_eq!(info.size, 42);
        assert_eq!(info.extension.as_deref(), Some("png"));
        assert_eq!(info.hint, Some(12));
        assert!(info.modified.is_some());

        let listed = service.scan_info(dir.path()).unwrap();
        assert_eq!(listed, vec![info]);

        assert!(matches!(
            service.file_info(&dir.path().join("gone.png")),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_extensions_accept_leading_dots() {
        let service = ScanService::new(vec![".TIF".to_string()], false, HintRules::default());
        assert!(service.is_supported(Path::new("scan.tif")));
        assert!(!service.is_supported(Path::new("scan.png")));
    }
}
