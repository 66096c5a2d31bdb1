// src/infrastructure/backup_snapshot.rs
//
// Backup Snapshot Management
//
// CRITICAL RULES:
// - A snapshot directory is freshly created; never reused
// - Snapshots live outside the directory being renamed
// - Every copy is verified by SHA-256 before the snapshot is accepted
// - Snapshots are retained after success; removal is a manual decision

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult, FsErrorKind};
use crate::infrastructure::file_system::FileSystem;

/// Manifest stored inside every snapshot directory
pub const MANIFEST_FILE: &str = ".pageorder-manifest.json";

/// Default snapshot root: {LOCAL_DATA_DIR}/pageorder/backups
pub fn default_backup_root() -> AppResult<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| AppError::Other("Could not determine local data directory".to_string()))?;

    Ok(data_dir.join("pageorder").join("backups"))
}

/// One backed-up file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Path the file had when the snapshot was taken
    pub original_path: PathBuf,

    /// Name of the copy inside the snapshot directory
    pub stored_name: String,

    /// Path the plan intends to move the file to
    pub planned_target: Option<PathBuf>,

    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub snapshot_id: String,
    pub source_directory: PathBuf,
    pub created_at: DateTime<Utc>,
    pub files: Vec<SnapshotFile>,
}

/// Outcome of a manual restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Originals written back from the snapshot
    pub restored: Vec<PathBuf>,

    /// Originals already present with the recorded content
    pub already_intact: Vec<PathBuf>,

    /// Renamed copies removed after their original came back
    pub removed_targets: Vec<PathBuf>,
}

/// A timestamped copy of the pre-rename file set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    /// Snapshot directory
    pub directory: PathBuf,
    pub manifest: SnapshotManifest,
}

impl BackupSnapshot {
    /// Copies every `(source, planned target)` into a new snapshot directory
    /// under `backup_root`.
    ///
    /// On any failure the partial snapshot is removed and `BackupFailure`
    /// is returned; the sources are never touched.
    pub fn create(
        fs: &dyn FileSystem,
        backup_root: &Path,
        source_directory: &Path,
        files: &[(PathBuf, Option<PathBuf>)],
    ) -> AppResult<Self> {
        fs.create_dir_all(backup_root)
            .map_err(|e| backup_failure(backup_root, e))?;

        let (snapshot_id, directory) = Self::allocate_directory(fs, backup_root, source_directory)?;

        match Self::copy_files(fs, &directory, files) {
            Ok(entries) => {
                let manifest = SnapshotManifest {
                    snapshot_id,
                    source_directory: source_directory.to_path_buf(),
                    created_at: Utc::now(),
                    files: entries,
                };

                let snapshot = Self {
                    directory,
                    manifest,
                };

                if let Err(e) = snapshot.write_manifest(fs) {
                    snapshot.discard(fs);
                    return Err(e);
                }

                log::info!(
                    "Backup snapshot {} created with {} files at {:?}",
                    snapshot.id(),
                    snapshot.manifest.files.len(),
                    snapshot.directory
                );

                Ok(snapshot)
            }
            Err(e) => {
                if let Err(cleanup) = fs.remove_dir_all(&directory) {
                    log::warn!("Could not remove partial snapshot {:?}: {}", directory, cleanup);
                }
                Err(e)
            }
        }
    }

    /// `{dirname}_{YYYYmmdd_HHMMSS}`, suffixed `_n` when taken
    fn allocate_directory(
        fs: &dyn FileSystem,
        backup_root: &Path,
        source_directory: &Path,
    ) -> AppResult<(String, PathBuf)> {
        let base_name = source_directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let stem = format!("{}_{}", base_name, stamp);

        for attempt in 0u32..1000 {
            let id = if attempt == 0 {
                stem.clone()
            } else {
                format!("{}_{}", stem, attempt)
            };
            let directory = backup_root.join(&id);

            match fs.create_dir(&directory) {
                Ok(()) => return Ok((id, directory)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(backup_failure(&directory, e)),
            }
        }

        Err(AppError::BackupFailure {
            kind: FsErrorKind::Other,
            path: backup_root.join(stem),
            message: "could not allocate a unique snapshot directory".to_string(),
        })
    }

    fn copy_files(
        fs: &dyn FileSystem,
        directory: &Path,
        files: &[(PathBuf, Option<PathBuf>)],
    ) -> AppResult<Vec<SnapshotFile>> {
        let mut entries = Vec::with_capacity(files.len());
        let mut used_names = HashSet::with_capacity(files.len());

        for (source, planned_target) in files {
            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| AppError::BackupFailure {
                    kind: FsErrorKind::Other,
                    path: source.clone(),
                    message: "source has no file name".to_string(),
                })?;
            // Sources from several folders may share a name
            let mut stored_name = file_name.clone();
            let mut suffix = entries.len();
            while !used_names.insert(stored_name.clone()) {
                stored_name = format!("{}_{}", suffix, file_name);
                suffix += 1;
            }
            let copy_path = directory.join(&stored_name);

            let source_digest = fs.sha256(source).map_err(|e| backup_failure(source, e))?;
            let size = fs
                .copy(source, &copy_path)
                .map_err(|e| backup_failure(&copy_path, e))?;
            let copy_digest = fs
                .sha256(&copy_path)
                .map_err(|e| backup_failure(&copy_path, e))?;

            if source_digest != copy_digest {
                return Err(AppError::BackupFailure {
                    kind: FsErrorKind::Other,
                    path: copy_path,
                    message: "copy does not match source content".to_string(),
                });
            }

            entries.push(SnapshotFile {
                original_path: source.clone(),
                stored_name,
                planned_target: planned_target.clone(),
                sha256: source_digest,
                size,
            });
        }

        Ok(entries)
    }

    fn write_manifest(&self, fs: &dyn FileSystem) -> AppResult<()> {
        let manifest_path = self.directory.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(&self.manifest)?;
        fs.write(&manifest_path, &bytes)
            .map_err(|e| backup_failure(&manifest_path, e))
    }

    fn discard(&self, fs: &dyn FileSystem) {
        if let Err(e) = fs.remove_dir_all(&self.directory) {
            log::warn!("Could not remove snapshot {:?}: {}", self.directory, e);
        }
    }

    /// Reads a snapshot from its directory
    pub fn load(fs: &dyn FileSystem, directory: &Path) -> AppResult<Self> {
        let manifest_path = directory.join(MANIFEST_FILE);
        if !fs.exists(&manifest_path) {
            return Err(AppError::NotFound(format!(
                "no snapshot manifest in {:?}",
                directory
            )));
        }

        let bytes = fs.read(&manifest_path)?;
        let manifest: SnapshotManifest = serde_json::from_slice(&bytes)?;

        Ok(Self {
            directory: directory.to_path_buf(),
            manifest,
        })
    }

    /// Snapshots under `backup_root`, newest first
    pub fn list(fs: &dyn FileSystem, backup_root: &Path) -> AppResult<Vec<Self>> {
        if !fs.is_dir(backup_root) {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs.list_dir(backup_root)? {
            if !fs.is_dir(&entry) {
                continue;
            }
            match Self::load(fs, &entry) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => log::debug!("Skipping {:?}: {}", entry, e),
            }
        }

        snapshots.sort_by(|a, b| {
            b.manifest
                .created_at
                .cmp(&a.manifest.created_at)
                .then_with(|| b.id().cmp(a.id()))
        });
        Ok(snapshots)
    }

    pub fn id(&self) -> &str {
        &self.manifest.snapshot_id
    }

    pub fn file_for(&self, original_path: &Path) -> Option<&SnapshotFile> {
        self.manifest
            .files
            .iter()
            .find(|f| f.original_path == original_path)
    }

    /// Path of the stored copy for an original path
    pub fn stored_copy(&self, original_path: &Path) -> Option<PathBuf> {
        self.file_for(original_path)
            .map(|f| self.directory.join(&f.stored_name))
    }

    /// Puts every original back and removes renamed copies whose content
    /// is now duplicated.
    pub fn restore(&self, fs: &dyn FileSystem) -> AppResult<RestoreReport> {
        let mut report = RestoreReport::default();

        for file in &self.manifest.files {
            let intact = fs.exists(&file.original_path)
                && fs
                    .sha256(&file.original_path)
                    .map(|digest| digest == file.sha256)
                    .unwrap_or(false);

            if intact {
                report.already_intact.push(file.original_path.clone());
                continue;
            }

            let stored = self.directory.join(&file.stored_name);
            if fs.exists(&file.original_path) {
                fs.remove_file(&file.original_path)?;
            }
            fs.copy(&stored, &file.original_path)?;

            let digest = fs.sha256(&file.original_path)?;
            if digest != file.sha256 {
                return Err(AppError::Other(format!(
                    "restored {:?} does not match the snapshot",
                    file.original_path
                )));
            }

            log::info!("Restored {:?}", file.original_path);
            report.restored.push(file.original_path.clone());
        }

        for file in &self.manifest.files {
            let Some(target) = &file.planned_target else {
                continue;
            };
            let is_original = self
                .manifest
                .files
                .iter()
                .any(|f| &f.original_path == target);

            if is_original || !fs.exists(target) {
                continue;
            }

            if fs.sha256(target)? == file.sha256 {
                fs.remove_file(target)?;
                report.removed_targets.push(target.clone());
            }
        }

        Ok(report)
    }
}

fn backup_failure(path: &Path, err: io::Error) -> AppError {
    AppError::BackupFailure {
        kind: FsErrorKind::classify(&err),
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::file_system::StdFileSystem;
    use std::fs;

    fn fixture(dir: &Path, names: &[&str]) -> Vec<(PathBuf, Option<PathBuf>)> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                fs::write(&path, name.as_bytes()).unwrap();
                (path, None)
            })
            .collect()
    }

    #[test]
    fn test_create_copies_and_records_digests() {
        let work = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let book = work.path().join("book");
        fs::create_dir(&book).unwrap();
        let files = fixture(&book, &["p1.png", "p2.png"]);

        let snapshot =
            BackupSnapshot::create(&StdFileSystem, backups.path(), &book, &files).unwrap();

        assert!(snapshot.id().starts_with("book_"));
        assert_eq!(snapshot.manifest.files.len(), 2);
        assert_eq!(
            fs::read(snapshot.directory.join("p1.png")).unwrap(),
            b"p1.png"
        );
        assert!(snapshot.directory.join(MANIFEST_FILE).exists());
        // originals untouched
        assert!(book.join("p1.png").exists());
    }

    #[test]
    fn test_same_named_sources_are_stored_apart() {
        let work = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let ch1 = work.path().join("ch1");
        let ch2 = work.path().join("ch2");
        fs::create_dir(&ch1).unwrap();
        fs::create_dir(&ch2).unwrap();
        fs::write(ch1.join("01.png"), b"chapter one").unwrap();
        fs::write(ch2.join("01.png"), b"chapter two").unwrap();
        let files = vec![(ch1.join("01.png"), None), (ch2.join("01.png"), None)];

        let snapshot =
            BackupSnapshot::create(&StdFileSystem, backups.path(), work.path(), &files).unwrap();

        let first = snapshot.file_for(&ch1.join("01.png")).unwrap();
        let second = snapshot.file_for(&ch2.join("01.png")).unwrap();
        assert_ne!(first.stored_name, second.stored_name);
        assert_eq!(
            fs::read(snapshot.directory.join(&first.stored_name)).unwrap(),
            b"chapter one"
        );
        assert_eq!(
            fs::read(snapshot.directory.join(&second.stored_name)).unwrap(),
            b"chapter two"
        );
    }

    #[test]
    fn test_same_second_snapshots_get_unique_ids() {
        let work = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let files = fixture(work.path(), &["a.png"]);

        let first =
            BackupSnapshot::create(&StdFileSystem, backups.path(), work.path(), &files).unwrap();
        let second =
            BackupSnapshot::create(&StdFileSystem, backups.path(), work.path(), &files).unwrap();

        assert_ne!(first.id(), second.id());
        assert_ne!(first.directory, second.directory);
    }

    #[test]
    fn test_missing_source_fails_and_leaves_nothing() {
        let work = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let files = vec![(work.path().join("ghost.png"), None)];

        match BackupSnapshot::create(&StdFileSystem, backups.path(), work.path(), &files) {
            Err(AppError::BackupFailure { kind, .. }) => assert_eq!(kind, FsErrorKind::NotFound),
            other => panic!("Expected BackupFailure, got {:?}", other),
        }

        assert!(BackupSnapshot::list(&StdFileSystem, backups.path())
            .unwrap()
            .is_empty());
        assert_eq!(fs::read_dir(backups.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_load_and_list() {
        let work = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let files = fixture(work.path(), &["a.png"]);

        let created =
            BackupSnapshot::create(&StdFileSystem, backups.path(), work.path(), &files).unwrap();
        let loaded = BackupSnapshot::load(&StdFileSystem, &created.directory).unwrap();
        assert_eq!(loaded, created);

        let listed = BackupSnapshot::list(&StdFileSystem, backups.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), created.id());
    }

    #[test]
    fn test_restore_undoes_a_rename() {
        let work = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let source = work.path().join("p1.png");
        let target = work.path().join("page_001.png");
        fs::write(&source, b"first page").unwrap();

        let snapshot = BackupSnapshot::create(
            &StdFileSystem,
            backups.path(),
            work.path(),
            &[(source.clone(), Some(target.clone()))],
        )
        .unwrap();

        fs::rename(&source, &target).unwrap();

        let report = snapshot.restore(&StdFileSystem).unwrap();
        assert_eq!(report.restored, vec![source.clone()]);
        assert_eq!(report.removed_targets, vec![target.clone()]);
        assert_eq!(fs::read(&source).unwrap(), b"first page");
        assert!(!target.exists());
    }
}
