#![deny(missing_docs)]
//! At-most-once file modification snapshots with a guaranteed rollback path.
//!
//! Every mutating filesystem operation a tool performs during a turn must be
//! preceded by a [`SnapshotManager::capture`] call. The manager keeps a
//! pre-image of the file on disk so the turn can be rolled back in whole or
//! in part if something goes wrong downstream.

mod error;
mod manager;
mod manifest;

pub use error::SnapshotError;
pub use manager::{OrphanSnapshot, RestoreStatus, RollbackReport, RollbackScope, SnapshotHandle, SnapshotManager};
pub use manifest::{FileEntry, Manifest, Metadata};
