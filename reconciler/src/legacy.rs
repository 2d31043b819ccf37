//! Flat prompt log kept by editor builds that predate the composer index.

use crate::collect::best_effort;
use crate::parse::{count_from_value, parse_timestamp_value};
use crate::records::{Direction, Message};
use crate::types::{IoCount, TimeWindow};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Probed in order; the first usable record wins.
pub const LEGACY_LOG_KEYS: [&str; 4] = [
    "aiService.generations",
    "aiService.prompts",
    "workbench.panel.chatSidebar",
    "workbench.panel.chat",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub text: String,
    pub input_tokens: u64,
}

/// Session id given to messages rebuilt from the flat log.
pub const LEGACY_SESSION_ID: &str = "legacy";

impl Generation {
    /// Every logged generation was a user prompt.
    pub fn into_message(self, position: usize) -> Message {
        Message {
            session_id: LEGACY_SESSION_ID.to_string(),
            message_id: format!("{}-{position}", self.kind),
            direction: Direction::Input,
            text: self.text,
            tokens: IoCount {
                input: self.input_tokens,
                output: 0,
            },
            code: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGeneration {
    unix_ms: Value,
    #[serde(default)]
    text_description: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    input_tokens: Option<Value>,
}

/// Empty arrays and panel layout state live under the same keys and carry
/// no prompts.
pub fn is_usable_log_record(raw: &str) -> bool {
    let trimmed = raw.trim();
    !trimmed.is_empty() && trimmed != "[]" && !raw.contains("\"collapsed\"")
}

pub fn parse_generation_log(raw: &str) -> Vec<Generation> {
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            warn!("legacy generation log is not an array");
            return Vec::new();
        }
        Err(e) => {
            warn!(err = %e, "failed to parse legacy generation log");
            return Vec::new();
        }
    };

    best_effort("generation", items.into_iter().map(parse_generation)).into_items()
}

fn parse_generation(item: Value) -> Result<Generation, String> {
    let raw: RawGeneration = serde_json::from_value(item).map_err(|e| e.to_string())?;
    let timestamp = parse_timestamp_value(&raw.unix_ms)
        .ok_or_else(|| format!("unusable unixMs {}", raw.unix_ms))?;
    let text = raw.text_description.unwrap_or_default();
    let input_tokens = match raw.input_tokens.as_ref().map(count_from_value) {
        Some(count) if count > 0 => count,
        _ => estimate_tokens(&text),
    };
    Ok(Generation {
        timestamp,
        kind: raw.kind.unwrap_or_else(|| "unknown".to_string()),
        text,
        input_tokens,
    })
}

/// gpt-4 token count for `text`, used when a record carries no count of its
/// own. The figure is an estimate; Cursor may have used another model.
pub fn estimate_tokens(text: &str) -> u64 {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    let encoder = ENCODER.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            warn!(err = %e, "token encoder unavailable, legacy estimates will be 0");
            None
        }
    });
    encoder
        .as_ref()
        .map(|bpe| bpe.encode_with_special_tokens(text).len() as u64)
        .unwrap_or(0)
}

pub fn select_generations(generations: Vec<Generation>, window: &TimeWindow) -> Vec<Generation> {
    generations
        .into_iter()
        .filter(|g| window.contains(g.timestamp))
        .collect()
}
