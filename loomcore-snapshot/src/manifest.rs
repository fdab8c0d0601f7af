//! On-disk manifest and metadata structures.
//!
//! `metadata.json` and `file_manifest.json` together make a snapshot
//! directory self-describing: a recovery pass after a crash needs nothing
//! beyond what's in these two files.

use serde::{Deserialize, Serialize};

/// One captured file within a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path of the file as it exists on the live filesystem.
    pub abs_path: String,
    /// Filename of the pre-image backup, relative to the snapshot's `files/` dir.
    pub backup_file: String,
    /// SHA-256 of the pre-image, computed while copying (not in a second pass).
    pub sha256_pre: String,
    /// The dispatcher-assigned operation id this capture preceded.
    pub op_id: u64,
}

/// Ordered list of captured files for one snapshot handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Captured file entries, in capture order.
    pub entries: Vec<FileEntry>,
}

impl Manifest {
    /// Whether `abs_path` has already been captured.
    pub fn contains(&self, abs_path: &str) -> bool {
        self.entries.iter().any(|e| e.abs_path == abs_path)
    }
}

/// Snapshot directory metadata, written once at first capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// The turn this snapshot belongs to.
    pub turn_id: String,
    /// Unix millis when the snapshot directory was created.
    pub created_at: u64,
    /// How many hours an orphaned snapshot is eligible for recovery.
    pub retention_hours: u64,
}
