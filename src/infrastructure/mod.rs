// src/infrastructure/mod.rs
//
// Infrastructure Layer
//
// Contains implementation details that support the domain
// but are not part of the domain itself.
//
// RULES:
// - Infrastructure serves the domain
// - Infrastructure never dictates domain behavior

pub mod backup_snapshot;
pub mod file_system;

pub use backup_snapshot::{
    default_backup_root, BackupSnapshot, RestoreReport, SnapshotFile, SnapshotManifest,
    MANIFEST_FILE,
};
pub use file_system::{sha256_file, FileSystem, StdFileSystem};
