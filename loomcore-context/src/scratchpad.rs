//! Scratchpad exchange: tool outputs too large to inline are written to a
//! scratch file, leaving only a short pointer in context.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from scratchpad writes.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ScratchpadError {
    /// Writing the scratch file failed.
    #[error("scratch write failed: {0}")]
    WriteFailed(String),
}

/// In-context stand-in for a tool output that was too large to inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchPointer {
    /// Absolute path to the scratch file holding the full content.
    pub path: PathBuf,
    /// Short human-readable summary of the content.
    pub summary: String,
    /// Rough shape description (e.g. "json array, 340 rows" or "text, 12000 chars").
    pub shape: String,
}

/// Writes oversized tool outputs to a scratch directory and hands back
/// pointers instead. Subsequent tool calls can dereference the path rather
/// than re-consuming the content into context.
pub struct Scratchpad {
    dir: PathBuf,
    cap_bytes: usize,
}

impl Scratchpad {
    /// Create a scratchpad rooted at `dir`, with outputs over `cap_bytes`
    /// routed to disk instead of inlined.
    pub fn new(dir: impl Into<PathBuf>, cap_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            cap_bytes,
        }
    }

    /// Whether `content` exceeds the inline cap and should be spilled.
    pub fn exceeds_cap(&self, content: &str) -> bool {
        content.len() > self.cap_bytes
    }

    /// Spill `content` to a scratch file named after `tool_use_id`, returning
    /// a pointer describing it. Uses the same write-then-fsync-then-rename
    /// discipline as the rest of the workspace's filesystem writers, so a
    /// crash never leaves a half-written scratch file behind.
    pub async fn spill(
        &self,
        tool_use_id: &str,
        content: &str,
    ) -> Result<ScratchPointer, ScratchpadError> {
        use tokio::io::AsyncWriteExt;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ScratchpadError::WriteFailed(e.to_string()))?;

        let path = self.dir.join(format!("{tool_use_id}.txt"));
        let tmp_path = self.dir.join(format!("{tool_use_id}.tmp-{}", std::process::id()));

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| ScratchpadError::WriteFailed(e.to_string()))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| ScratchpadError::WriteFailed(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| ScratchpadError::WriteFailed(e.to_string()))?;
        drop(file);
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ScratchpadError::WriteFailed(e.to_string()))?;

        Ok(ScratchPointer {
            path,
            summary: summarize(content),
            shape: shape_of(content),
        })
    }

    /// Read back the full content behind a pointer.
    pub async fn read(&self, pointer: &ScratchPointer) -> Result<String, ScratchpadError> {
        tokio::fs::read_to_string(&pointer.path)
            .await
            .map_err(|e| ScratchpadError::WriteFailed(e.to_string()))
    }

    /// Directory this scratchpad writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn summarize(content: &str) -> String {
    let trimmed = content.trim();
    let preview: String = trimmed.chars().take(120).collect();
    if trimmed.chars().count() > 120 {
        format!("{preview}...")
    } else {
        preview
    }
}

fn shape_of(content: &str) -> String {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        format!("json array, {} bytes", content.len())
    } else if trimmed.starts_with('{') {
        format!("json object, {} bytes", content.len())
    } else {
        format!("text, {} chars", content.chars().count())
    }
}
