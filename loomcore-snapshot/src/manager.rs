//! The snapshot manager: lazy `begin`, idempotent `capture`, `commit`/`rollback`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use layer0::id::{SnapshotId, TurnId};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::SnapshotError;
use crate::manifest::{FileEntry, Manifest, Metadata};

/// Injectable wall-clock source so tests can pin `created_at` timestamps.
pub trait Clock: Send + Sync {
    /// Current time as Unix milliseconds.
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by [`std::time::SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// The three legal states a snapshot handle can be in.
///
/// `Committed` and `RolledBack` are terminal: any further `capture`,
/// `commit`, or `rollback` call on them is a logic error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Open,
    Committed,
    RolledBack,
}

impl HandleState {
    fn as_str(self) -> &'static str {
        match self {
            HandleState::Open => "open",
            HandleState::Committed => "committed",
            HandleState::RolledBack => "rolled_back",
        }
    }
}

/// A lightweight, copyable token identifying one turn's snapshot.
///
/// Carries no state itself — all mutable bookkeeping lives in the
/// [`SnapshotManager`], keyed by `snapshot_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotHandle {
    /// The turn this snapshot protects.
    pub turn_id: TurnId,
    /// The snapshot's own id, also used as its directory name suffix.
    pub snapshot_id: SnapshotId,
}

struct HandleRecord {
    state: HandleState,
    manifest: Manifest,
    dir_created: bool,
}

/// Scope of paths to restore on [`SnapshotManager::rollback`].
#[derive(Debug, Clone)]
pub enum RollbackScope {
    /// Restore every captured path.
    All,
    /// Restore only the given absolute paths.
    Paths(HashSet<PathBuf>),
    /// Restore every path captured before the given dispatcher op id.
    BeforeOp(u64),
}

/// Outcome of restoring a single path during rollback.
#[derive(Debug, Clone)]
pub enum RestoreStatus {
    /// The pre-image was restored successfully.
    Restored,
    /// The path was in scope but had no capture on record.
    Missing,
    /// Restoring the path failed with the given I/O error message.
    IoError(String),
}

/// Result of a [`SnapshotManager::rollback`] call.
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    /// Per-path restore outcome.
    pub results: HashMap<PathBuf, RestoreStatus>,
}

/// An on-disk snapshot directory left behind by a process that never
/// called `commit` or `rollback` — found by [`SnapshotManager::recover_on_start`].
#[derive(Debug, Clone)]
pub struct OrphanSnapshot {
    /// The turn the orphaned snapshot belonged to.
    pub turn_id: TurnId,
    /// The orphaned snapshot's own id.
    pub snapshot_id: SnapshotId,
    /// When the snapshot directory was created.
    pub created_at: u64,
    /// The retention window recorded at creation time.
    pub retention_hours: u64,
}

/// Provides at-most-once file modification semantics per turn.
pub struct SnapshotManager {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    handles: Mutex<HashMap<String, HandleRecord>>,
}

impl SnapshotManager {
    /// Create a manager rooted at `root`, using the real system clock.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    /// Create a manager with an injected clock, for deterministic tests.
    pub fn with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot_dir(&self, snapshot_id: &SnapshotId) -> PathBuf {
        self.root.join(format!("snap_{}", snapshot_id.as_str()))
    }

    /// Begin tracking a snapshot for `turn_id`. Lazy — no disk work happens
    /// here; the directory is created on the first `capture`.
    pub async fn begin(&self, turn_id: TurnId, snapshot_id: SnapshotId) -> SnapshotHandle {
        let mut handles = self.handles.lock().await;
        handles.insert(
            snapshot_id.as_str().to_string(),
            HandleRecord {
                state: HandleState::Open,
                manifest: Manifest::default(),
                dir_created: false,
            },
        );
        SnapshotHandle { turn_id, snapshot_id }
    }

    /// Capture the pre-image of `path` if it hasn't already been captured
    /// in this handle. Idempotent on repeat calls for the same path.
    pub async fn capture(&self, handle: &SnapshotHandle, path: &Path, op_id: u64) -> Result<(), SnapshotError> {
        let mut handles = self.handles.lock().await;
        let record = handles
            .get_mut(handle.snapshot_id.as_str())
            .ok_or_else(|| SnapshotError::UnknownHandle(handle.snapshot_id.as_str().to_string()))?;

        if record.state != HandleState::Open {
            return Err(SnapshotError::InvalidState {
                snapshot_id: handle.snapshot_id.as_str().to_string(),
                state: record.state.as_str().to_string(),
                attempted: "capture".to_string(),
            });
        }

        let abs_path = path.to_string_lossy().to_string();
        if record.manifest.contains(&abs_path) {
            return Ok(());
        }

        let dir = self.snapshot_dir(&handle.snapshot_id);
        let files_dir = dir.join("files");
        tokio::fs::create_dir_all(&files_dir)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;

        if !record.dir_created {
            write_metadata(&dir, &Metadata {
                turn_id: handle.turn_id.as_str().to_string(),
                created_at: self.clock.now_millis(),
                retention_hours: 24,
            })
            .await?;
            record.dir_created = true;
        }

        let contents = tokio::fs::read(path).await.map_err(|e| SnapshotError::CaptureFailed {
            path: abs_path.clone(),
            message: e.to_string(),
            io_kind: e.kind(),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let sha256_pre = format!("{:x}", hasher.finalize());

        let backup_file = format!("{:016x}.bak", record.manifest.entries.len() as u64);
        write_atomic(&files_dir.join(&backup_file), &contents).await.map_err(SnapshotError::Io)?;

        record.manifest.entries.push(FileEntry {
            abs_path,
            backup_file,
            sha256_pre,
            op_id,
        });
        write_manifest(&dir, &record.manifest).await?;

        Ok(())
    }

    /// Atomically remove the on-disk snapshot directory.
    pub async fn commit(&self, handle: &SnapshotHandle) -> Result<(), SnapshotError> {
        let mut handles = self.handles.lock().await;
        let record = handles
            .get_mut(handle.snapshot_id.as_str())
            .ok_or_else(|| SnapshotError::UnknownHandle(handle.snapshot_id.as_str().to_string()))?;

        if record.state != HandleState::Open {
            return Err(SnapshotError::InvalidState {
                snapshot_id: handle.snapshot_id.as_str().to_string(),
                state: record.state.as_str().to_string(),
                attempted: "commit".to_string(),
            });
        }

        if record.dir_created {
            let dir = self.snapshot_dir(&handle.snapshot_id);
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(SnapshotError::Io(e.to_string()));
                }
            }
        }
        record.state = HandleState::Committed;
        Ok(())
    }

    /// Restore pre-images for the selected scope; paths outside the scope
    /// stay as-is.
    pub async fn rollback(&self, handle: &SnapshotHandle, scope: RollbackScope) -> Result<RollbackReport, SnapshotError> {
        let mut handles = self.handles.lock().await;
        let record = handles
            .get_mut(handle.snapshot_id.as_str())
            .ok_or_else(|| SnapshotError::UnknownHandle(handle.snapshot_id.as_str().to_string()))?;

        if record.state != HandleState::Open {
            return Err(SnapshotError::InvalidState {
                snapshot_id: handle.snapshot_id.as_str().to_string(),
                state: record.state.as_str().to_string(),
                attempted: "rollback".to_string(),
            });
        }

        let dir = self.snapshot_dir(&handle.snapshot_id);
        let mut report = RollbackReport::default();

        for entry in &record.manifest.entries {
            let in_scope = match &scope {
                RollbackScope::All => true,
                RollbackScope::Paths(paths) => paths.contains(Path::new(&entry.abs_path)),
                RollbackScope::BeforeOp(op_id) => entry.op_id < *op_id,
            };
            if !in_scope {
                continue;
            }

            let backup_path = dir.join("files").join(&entry.backup_file);
            let status = match tokio::fs::read(&backup_path).await {
                Ok(contents) => match tokio::fs::write(&entry.abs_path, &contents).await {
                    Ok(()) => RestoreStatus::Restored,
                    Err(e) => RestoreStatus::IoError(e.to_string()),
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => RestoreStatus::Missing,
                Err(e) => RestoreStatus::IoError(e.to_string()),
            };
            report.results.insert(PathBuf::from(&entry.abs_path), status);
        }

        record.state = HandleState::RolledBack;
        Ok(report)
    }

    /// Scan `root` for snapshot directories left behind by a process that
    /// never committed or rolled back. Directories older than their
    /// recorded retention window are skipped — they're cleanup's problem,
    /// not recovery's.
    pub async fn recover_on_start(&self) -> Result<Vec<OrphanSnapshot>, SnapshotError> {
        let mut orphans = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(orphans),
            Err(e) => return Err(SnapshotError::Io(e.to_string())),
        };

        let now = self.clock.now_millis();

        while let Some(entry) = entries.next_entry().await.map_err(|e| SnapshotError::Io(e.to_string()))? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(snapshot_id) = name.strip_prefix("snap_") else {
                continue;
            };

            let metadata_path = path.join("metadata.json");
            let Ok(contents) = tokio::fs::read_to_string(&metadata_path).await else {
                continue;
            };
            let Ok(metadata): Result<Metadata, _> = serde_json::from_str(&contents) else {
                continue;
            };

            let retention_millis = metadata.retention_hours.saturating_mul(3_600_000);
            let age_millis = now.saturating_sub(metadata.created_at);
            if age_millis > retention_millis {
                continue;
            }

            orphans.push(OrphanSnapshot {
                turn_id: TurnId::new(metadata.turn_id),
                snapshot_id: SnapshotId::new(snapshot_id),
                created_at: metadata.created_at,
                retention_hours: metadata.retention_hours,
            });
        }

        Ok(orphans)
    }

    /// Every path this handle has captured a pre-image for, in capture
    /// order — used to offer the user a selective-rollback choice.
    pub async fn captured_paths(&self, handle: &SnapshotHandle) -> Result<Vec<String>, SnapshotError> {
        let handles = self.handles.lock().await;
        let record = handles
            .get(handle.snapshot_id.as_str())
            .ok_or_else(|| SnapshotError::UnknownHandle(handle.snapshot_id.as_str().to_string()))?;
        Ok(record.manifest.entries.iter().map(|e| e.abs_path.clone()).collect())
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), String> {
    let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(|e| e.to_string())?;
    file.write_all(contents).await.map_err(|e| e.to_string())?;
    file.sync_all().await.map_err(|e| e.to_string())?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn write_metadata(dir: &Path, metadata: &Metadata) -> Result<(), SnapshotError> {
    let json = serde_json::to_vec_pretty(metadata).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    write_atomic(&dir.join("metadata.json"), &json).await.map_err(SnapshotError::Io)
}

async fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<(), SnapshotError> {
    let json = serde_json::to_vec_pretty(manifest).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    write_atomic(&dir.join("file_manifest.json"), &json).await.map_err(SnapshotError::Io)
}
