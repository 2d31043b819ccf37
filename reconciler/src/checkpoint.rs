//! The marker `start` leaves behind for `end`.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE: &str = ".cursor-efficiency.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub branch: String,
    pub start_sha: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_usage_count: Option<u64>,
}

/// `<state_dir>/<basename of working_dir>/.cursor-efficiency.json`.
///
/// Two projects with the same directory name share a checkpoint.
pub fn checkpoint_path(state_dir: &Path, working_dir: &Path) -> PathBuf {
    let name = working_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    state_dir.join(name).join(CHECKPOINT_FILE)
}

pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let body = serde_json::to_string_pretty(checkpoint)?;
    fs::write(path, body)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Checkpoint> {
    if !path.is_file() {
        return Err(Error::CheckpointNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
