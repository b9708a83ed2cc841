//! # Run Checkpoint
//!
//! Persistent progress of the current run (`RunCheckpoint`): which list is being worked,
//! how far the cursor got, and when the rate gate last granted a turn.
//! Saved as JSON after every advance so a restarted process can resume without
//! re-sending or breaking the pacing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCheckpoint {
    #[serde(default)]
    pub customer_ids: Vec<String>,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub last_grant_at: Option<DateTime<Utc>>,
}

impl RunCheckpoint {
    /// True when this checkpoint was taken over `ids`, possibly with requeued
    /// recipients appended after them.
    pub fn matches_list(&self, ids: &[String]) -> bool {
        !ids.is_empty() && self.customer_ids.starts_with(ids)
    }

    /// Ids that were requeued past the end of the original list.
    pub fn requeued_tail(&self, original_len: usize) -> &[String] {
        self.customer_ids.get(original_len..).unwrap_or(&[])
    }
}

/// File-backed checkpoint. A store without a path keeps nothing.
#[derive(Debug, Clone, Default)]
pub struct CheckpointStore {
    path: Option<PathBuf>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Loads the checkpoint, or returns default when missing or unreadable.
    pub fn load(&self) -> RunCheckpoint {
        let Some(path) = &self.path else {
            return RunCheckpoint::default();
        };
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable checkpoint {}: {}", path.display(), e);
                RunCheckpoint::default()
            }),
            Err(_) => RunCheckpoint::default(),
        }
    }

    /// Writes through a temp file and rename so a crash never leaves half a checkpoint.
    pub fn save(&self, checkpoint: &RunCheckpoint) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(checkpoint)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}
