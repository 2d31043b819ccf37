//! Which conversations happened in this workspace during the window.

use crate::collect::best_effort;
use crate::error::Result;
use crate::legacy::{
    is_usable_log_record, parse_generation_log, select_generations, Generation, LEGACY_LOG_KEYS,
};
use crate::parse::parse_timestamp_value;
use crate::store::{open_read_only, read_value, Table};
use crate::types::TimeWindow;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Workspace-store record listing every composer opened in the workspace.
pub const COMPOSER_INDEX_KEY: &str = "composer.composerData";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerHead {
    pub composer_id: String,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Per-workspace view of the editor's conversations.
pub trait SessionIndex {
    /// `None` when the store holds no composer index record at all.
    fn composer_heads(&self) -> Result<Option<Vec<ComposerHead>>>;

    /// Flat prompt log from older editor builds.
    fn legacy_generations(&self) -> Result<Vec<Generation>>;
}

/// What the selector found for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Index order, duplicates preserved.
    pub session_ids: Vec<String>,
    /// Only filled when the workspace has no composer index.
    pub legacy: Vec<Generation>,
}

pub fn select<I: SessionIndex + ?Sized>(index: &I, window: &TimeWindow) -> Result<Selection> {
    match index.composer_heads()? {
        Some(heads) => Ok(Selection {
            session_ids: filter_heads(heads, window),
            legacy: Vec::new(),
        }),
        None => {
            let legacy = select_generations(index.legacy_generations()?, window);
            debug!(count = legacy.len(), "no composer index, using legacy generation log");
            Ok(Selection {
                session_ids: Vec::new(),
                legacy,
            })
        }
    }
}

pub fn select_session_ids<I: SessionIndex + ?Sized>(
    index: &I,
    window: &TimeWindow,
) -> Result<Vec<String>> {
    let heads = index.composer_heads()?.unwrap_or_default();
    Ok(filter_heads(heads, window))
}

fn filter_heads(heads: Vec<ComposerHead>, window: &TimeWindow) -> Vec<String> {
    heads
        .into_iter()
        .filter(|head| head.last_activity.is_some_and(|ts| window.contains(ts)))
        .map(|head| head.composer_id)
        .collect()
}

// ── SQLite implementation ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawComposerIndex {
    #[serde(default, rename = "allComposers")]
    all_composers: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComposerHead {
    composer_id: String,
    #[serde(default)]
    last_updated_at: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
}

/// Index backed by `<workspaceStorage>/<identity>/state.vscdb`.
#[derive(Debug, Clone)]
pub struct WorkspaceIndex {
    db_path: PathBuf,
}

impl WorkspaceIndex {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Runs `f` against a fresh read-only handle that is dropped before
    /// returning. `None` when the store file doesn't exist yet.
    fn with_store<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<Option<T>> {
        if !self.db_path.is_file() {
            debug!(path = ?self.db_path, "workspace store absent");
            return Ok(None);
        }
        let conn = open_read_only(&self.db_path)?;
        f(&conn).map(Some)
    }
}

impl SessionIndex for WorkspaceIndex {
    fn composer_heads(&self) -> Result<Option<Vec<ComposerHead>>> {
        let raw = self.with_store(|conn| read_value(conn, Table::Item, COMPOSER_INDEX_KEY))?;
        let Some(raw) = raw.flatten() else {
            return Ok(None);
        };
        Ok(Some(parse_composer_index(&raw)))
    }

    fn legacy_generations(&self) -> Result<Vec<Generation>> {
        let raw = self.with_store(|conn| {
            for key in LEGACY_LOG_KEYS {
                if let Some(value) = read_value(conn, Table::Item, key)? {
                    if is_usable_log_record(&value) {
                        debug!(key, "found legacy generation log");
                        return Ok(Some(value));
                    }
                }
            }
            Ok(None)
        })?;
        Ok(raw
            .flatten()
            .map(|raw| parse_generation_log(&raw))
            .unwrap_or_default())
    }
}

pub(crate) fn parse_composer_index(raw: &str) -> Vec<ComposerHead> {
    let index: RawComposerIndex = match serde_json::from_str(raw) {
        Ok(index) => index,
        Err(e) => {
            warn!(key = COMPOSER_INDEX_KEY, err = %e, "failed to parse composer index");
            return Vec::new();
        }
    };

    let entries = index.all_composers.unwrap_or_default();
    best_effort("composer head", entries.into_iter().map(parse_head)).into_items()
}

fn parse_head(value: Value) -> std::result::Result<ComposerHead, serde_json::Error> {
    let raw: RawComposerHead = serde_json::from_value(value)?;
    let last_activity = raw
        .last_updated_at
        .as_ref()
        .and_then(parse_timestamp_value)
        .or_else(|| raw.created_at.as_ref().and_then(parse_timestamp_value));
    Ok(ComposerHead {
        composer_id: raw.composer_id,
        last_activity,
    })
}
