//! Expands selected composers into their messages and code-block ledgers
//! using the global store.
//!
//! The global store is keyed differently from the workspace store:
//!
//! - `composerData:<composerId>` holds the session payload (usage counters,
//!   ordered message headers, code-block ledger);
//! - `bubbleId:<composerId>:<bubbleId>` holds one message each.
//!
//! Message lookups depend on the headers returned by the session lookup, so
//! [`aggregate`] always issues exactly two batched queries, in order.

use crate::collect::best_effort;
use crate::error::{Error, Result};
use crate::parse::{amount_from_value, count_from_value};
use crate::store::{open_read_only, read_values, Table};
use crate::types::{ChatEntry, IoCount};
use rusqlite::Connection;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const COMPOSER_KEY_PREFIX: &str = "composerData:";
pub const BUBBLE_KEY_PREFIX: &str = "bubbleId:";

pub fn composer_key(composer_id: &str) -> String {
    format!("{COMPOSER_KEY_PREFIX}{composer_id}")
}

pub fn bubble_key(composer_id: &str, bubble_id: &str) -> String {
    format!("{BUBBLE_KEY_PREFIX}{composer_id}:{bubble_id}")
}

/// Batched point lookups against the global store.
pub trait RecordStore {
    /// Returns the rows that exist, in any order. Missing keys are not an
    /// error.
    fn fetch(&self, keys: &[String]) -> Result<Vec<(String, String)>>;
}

/// `cursorDiskKV` in `<globalStorage>/state.vscdb`.
pub struct GlobalStore {
    conn: Connection,
    path: PathBuf,
}

impl GlobalStore {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::StorageUnavailable {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }
        let conn = open_read_only(path).map_err(|e| Error::StorageUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for GlobalStore {
    fn fetch(&self, keys: &[String]) -> Result<Vec<(String, String)>> {
        read_values(&self.conn, Table::DiskKv, keys)
    }
}

// ── Records ─────────────────────────────────────────────────────────────

/// Conversation direction, stored as a small integer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Input,
    Output,
    Other(i64),
}

impl Direction {
    pub const INPUT_TAG: i64 = 1;
    pub const OUTPUT_TAG: i64 = 2;

    pub fn from_tag(tag: i64) -> Self {
        match tag {
            Self::INPUT_TAG => Direction::Input,
            Self::OUTPUT_TAG => Direction::Output,
            other => Direction::Other(other),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::Other(_) => "unknown",
        }
    }
}

/// One turn of a conversation, joined back to its composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub session_id: String,
    pub message_id: String,
    pub direction: Direction,
    pub text: String,
    pub tokens: IoCount,
    pub code: Vec<String>,
}

impl Message {
    pub fn to_chat_entry(&self) -> ChatEntry {
        ChatEntry {
            r#type: self.direction.label().to_string(),
            text: self.text.clone(),
            code: self.code.clone(),
        }
    }
}

/// One proposed code edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlockEntry {
    #[serde(default)]
    pub status: Option<String>,
}

impl CodeBlockEntry {
    pub fn is_accepted(&self) -> bool {
        self.status.as_deref() == Some("accepted")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub usage_amount: u64,
    /// Message ids in conversation order.
    pub headers: Vec<String>,
    pub ledger: Vec<CodeBlockEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub sessions: Vec<Session>,
    /// Session by session, each in header order.
    pub messages: Vec<Message>,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.messages.is_empty()
    }

    pub fn ledger_entries(&self) -> Vec<&CodeBlockEntry> {
        self.sessions.iter().flat_map(|s| s.ledger.iter()).collect()
    }

    pub fn transcript(&self) -> Vec<ChatEntry> {
        self.messages.iter().map(Message::to_chat_entry).collect()
    }
}

// ── Payload shapes ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComposer {
    #[serde(default)]
    usage_data: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    full_conversation_headers_only: Vec<RawHeader>,
    #[serde(default, deserialize_with = "null_as_default")]
    code_block_data: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHeader {
    bubble_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBubble {
    #[serde(default, rename = "type")]
    tag: Option<i64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    token_count: Option<RawTokenCount>,
    #[serde(default, deserialize_with = "null_as_default")]
    code_blocks: Vec<RawCodeBlock>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenCount {
    #[serde(default)]
    input_tokens: Option<Value>,
    #[serde(default)]
    output_tokens: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawCodeBlock {
    #[serde(default)]
    content: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `usageData` is either `{ "amount": n }` or keyed per model:
/// `{ "<model>": { "amount": n, "costInCents": c } }`.
pub fn usage_amount(usage: &Value) -> u64 {
    match usage {
        Value::Object(map) => match map.get("amount") {
            Some(amount) => count_from_value(amount),
            None => {
                let total: f64 = map
                    .values()
                    .filter_map(|v| v.get("amount"))
                    .filter_map(amount_from_value)
                    .sum();
                if total > 0.0 {
                    total.round() as u64
                } else {
                    0
                }
            }
        },
        other => count_from_value(other),
    }
}

/// Ledger groups are lists in some editor builds and id-keyed maps in others.
fn flatten_ledger(session_id: &str, groups: BTreeMap<String, Value>) -> Vec<CodeBlockEntry> {
    let raw_entries = groups.into_values().flat_map(|group| match group {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    });
    best_effort(
        "code block",
        raw_entries.map(|v| {
            serde_json::from_value::<CodeBlockEntry>(v).map_err(|e| format!("{session_id}: {e}"))
        }),
    )
    .into_items()
}

fn parse_session(id: &str, raw: &str) -> std::result::Result<Session, String> {
    let payload: RawComposer =
        serde_json::from_str(raw).map_err(|e| format!("{}: {e}", composer_key(id)))?;
    Ok(Session {
        id: id.to_string(),
        usage_amount: payload.usage_data.as_ref().map(usage_amount).unwrap_or(0),
        headers: payload
            .full_conversation_headers_only
            .into_iter()
            .map(|h| h.bubble_id)
            .collect(),
        ledger: flatten_ledger(id, payload.code_block_data),
    })
}

fn parse_message(key: &str, raw: &str) -> std::result::Result<Message, String> {
    let (session_id, message_id) = key
        .strip_prefix(BUBBLE_KEY_PREFIX)
        .and_then(|rest| rest.split_once(':'))
        .ok_or_else(|| format!("unexpected message key {key}"))?;
    let bubble: RawBubble = serde_json::from_str(raw).map_err(|e| format!("{key}: {e}"))?;
    let tokens = bubble.token_count.unwrap_or_default();
    Ok(Message {
        session_id: session_id.to_string(),
        message_id: message_id.to_string(),
        direction: Direction::from_tag(bubble.tag.unwrap_or(0)),
        text: bubble.text.unwrap_or_default(),
        tokens: IoCount {
            input: tokens.input_tokens.as_ref().map(count_from_value).unwrap_or(0),
            output: tokens.output_tokens.as_ref().map(count_from_value).unwrap_or(0),
        },
        code: bubble
            .code_blocks
            .into_iter()
            .filter_map(|b| b.content)
            .collect(),
    })
}

// ── Aggregation ─────────────────────────────────────────────────────────

/// First occurrence wins.
pub fn dedupe_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

pub fn aggregate<S: RecordStore + ?Sized>(store: &S, session_ids: &[String]) -> Result<Aggregate> {
    if session_ids.is_empty() {
        return Ok(Aggregate::default());
    }
    let ids = dedupe_ids(session_ids);

    // Lookup 1: session payloads.
    let composer_keys: Vec<String> = ids.iter().map(|id| composer_key(id)).collect();
    let mut session_rows: HashMap<String, String> =
        store.fetch(&composer_keys)?.into_iter().collect();
    let sessions = best_effort(
        "composer",
        ids.iter().filter_map(|id| {
            let raw = session_rows.remove(&composer_key(id))?;
            Some(parse_session(id, &raw))
        }),
    )
    .into_items();

    // Lookup 2: every message named by the headers returned above.
    let mut seen = HashSet::new();
    let bubble_keys: Vec<String> = sessions
        .iter()
        .flat_map(|s| s.headers.iter().map(move |h| bubble_key(&s.id, h)))
        .filter(|key| seen.insert(key.clone()))
        .collect();
    let message_rows = if bubble_keys.is_empty() {
        Vec::new()
    } else {
        store.fetch(&bubble_keys)?
    };
    let by_key: HashMap<String, Message> = best_effort(
        "bubble",
        message_rows
            .into_iter()
            .map(|(key, raw)| parse_message(&key, &raw).map(|m| (key, m))),
    )
    .into_items()
    .into_iter()
    .collect();

    // Join in header order; headers whose message was pruned are dropped.
    let mut messages = Vec::new();
    for session in &sessions {
        let mut missing = 0usize;
        for header in &session.headers {
            match by_key.get(&bubble_key(&session.id, header)) {
                Some(message) => messages.push(message.clone()),
                None => missing += 1,
            }
        }
        if missing > 0 {
            debug!(session = %session.id, missing, "headers without stored message");
        }
    }

    debug!(
        sessions = sessions.len(),
        messages = messages.len(),
        "aggregated composer records"
    );
    Ok(Aggregate { sessions, messages })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// In-memory store that records every batch it is asked for.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub rows: BTreeMap<String, String>,
        pub calls: RefCell<Vec<Vec<String>>>,
    }

    impl MemoryStore {
        pub fn put(&mut self, key: String, value: Value) {
            self.rows.insert(key, value.to_string());
        }
    }

    impl RecordStore for MemoryStore {
        fn fetch(&self, keys: &[String]) -> Result<Vec<(String, String)>> {
            self.calls.borrow_mut().push(keys.to_vec());
            // Reverse to make sure callers don't rely on row order.
            Ok(keys
                .iter()
                .rev()
                .filter_map(|k| self.rows.get(k).map(|v| (k.clone(), v.clone())))
                .collect())
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn bubble(tag: i64, text: &str, input: u64, output: u64) -> Value {
        json!({
            "type": tag,
            "text": text,
            "tokenCount": { "inputTokens": input, "outputTokens": output },
        })
    }

    #[test]
    fn empty_selection_never_touches_the_store() {
        let store = MemoryStore::default();
        let agg = aggregate(&store, &[]).unwrap();
        assert!(agg.is_empty());
        assert!(store.calls.borrow().is_empty());
    }

    #[test]
    fn transcript_preserves_header_order_and_skips_gaps() {
        let mut store = MemoryStore::default();
        store.put(
            composer_key("s1"),
            json!({
                "fullConversationHeadersOnly": [
                    {"bubbleId": "h1", "type": 1},
                    {"bubbleId": "h2", "type": 2},
                    {"bubbleId": "h3", "type": 2}
                ]
            }),
        );
        store.put(bubble_key("s1", "h1"), bubble(1, "first", 10, 0));
        store.put(bubble_key("s1", "h3"), bubble(2, "third", 0, 30));

        let agg = aggregate(&store, &ids(&["s1"])).unwrap();
        let texts: Vec<&str> = agg.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "third"]);
        assert!(agg.messages.iter().all(|m| m.session_id == "s1"));
    }

    #[test]
    fn issues_two_dependent_batches_with_deduped_ids() {
        let mut store = MemoryStore::default();
        store.put(
            composer_key("a"),
            json!({"fullConversationHeadersOnly": [{"bubbleId": "m1"}]}),
        );
        store.put(
            composer_key("b"),
            json!({"fullConversationHeadersOnly": [{"bubbleId": "m2"}]}),
        );
        store.put(bubble_key("a", "m1"), bubble(1, "hi", 1, 0));
        store.put(bubble_key("b", "m2"), bubble(2, "yo", 0, 1));

        let agg = aggregate(&store, &ids(&["b", "a", "b"])).unwrap();

        let calls = store.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec![composer_key("b"), composer_key("a")]);
        assert_eq!(calls[1], vec![bubble_key("b", "m2"), bubble_key("a", "m1")]);

        let order: Vec<&str> = agg.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        let texts: Vec<&str> = agg.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["yo", "hi"]);
    }

    #[test]
    fn sessions_without_headers_skip_the_message_lookup() {
        let mut store = MemoryStore::default();
        store.put(composer_key("a"), json!({"usageData": {"amount": 2}}));

        let agg = aggregate(&store, &ids(&["a"])).unwrap();
        assert_eq!(agg.sessions.len(), 1);
        assert_eq!(agg.sessions[0].usage_amount, 2);
        assert_eq!(store.calls.borrow().len(), 1);
    }

    #[test]
    fn missing_and_malformed_payloads_are_dropped() {
        let mut store = MemoryStore::default();
        store.rows.insert(composer_key("broken"), "{ not json".to_string());
        store.put(
            composer_key("ok"),
            json!({"fullConversationHeadersOnly": [{"bubbleId": "m1"}, {"bubbleId": "m2"}]}),
        );
        store.rows.insert(bubble_key("ok", "m1"), "[[[".to_string());
        store.put(bubble_key("ok", "m2"), bubble(2, "fine", 0, 5));

        let agg = aggregate(&store, &ids(&["gone", "broken", "ok"])).unwrap();
        assert_eq!(agg.sessions.len(), 1);
        assert_eq!(agg.sessions[0].id, "ok");
        assert_eq!(agg.messages.len(), 1);
        assert_eq!(agg.messages[0].message_id, "m2");
    }

    #[test]
    fn ledger_flattens_every_group_shape() {
        let mut store = MemoryStore::default();
        store.put(
            composer_key("a"),
            json!({
                "codeBlockData": {
                    "file:///src/lib.rs": [
                        {"status": "accepted"},
                        {"status": "rejected"}
                    ],
                    "file:///src/main.rs": {
                        "cb-1": {"status": "accepted", "languageId": "rust"},
                        "cb-2": {"status": "completed"}
                    },
                    "file:///odd": "ignored"
                }
            }),
        );

        let agg = aggregate(&store, &ids(&["a"])).unwrap();
        let ledger = agg.ledger_entries();
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.iter().filter(|e| e.is_accepted()).count(), 2);
    }

    #[test]
    fn usage_amount_handles_flat_and_per_model_shapes() {
        assert_eq!(usage_amount(&json!({"amount": 3})), 3);
        assert_eq!(
            usage_amount(&json!({
                "claude-4-sonnet": {"amount": 2, "costInCents": 8},
                "gpt-4.1": {"amount": 1.6}
            })),
            4
        );
        // Rounded once per session, not per model.
        assert_eq!(
            usage_amount(&json!({"a": {"amount": 0.5}, "b": {"amount": 0.5}, "c": {"amount": 0.5}})),
            2
        );
        assert_eq!(usage_amount(&json!({})), 0);
        assert_eq!(usage_amount(&json!(null)), 0);
    }

    #[test]
    fn null_collections_read_as_empty() {
        let session = parse_session(
            "a",
            r#"{"fullConversationHeadersOnly": null, "codeBlockData": null, "usageData": null}"#,
        )
        .unwrap();
        assert!(session.headers.is_empty());
        assert!(session.ledger.is_empty());
        assert_eq!(session.usage_amount, 0);

        let message = parse_message(&bubble_key("a", "m"), r#"{"type": 7, "codeBlocks": null}"#)
            .unwrap();
        assert_eq!(message.direction, Direction::Other(7));
        assert!(message.code.is_empty());
        assert_eq!(message.tokens, IoCount::default());
    }

    #[test]
    fn null_rows_in_the_global_store_are_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(crate::store::STATE_DB_FILE);
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE cursorDiskKV (key TEXT PRIMARY KEY, value BLOB)", [])
                .unwrap();
            conn.execute(
                "INSERT INTO cursorDiskKV (key, value) VALUES (?1, ?2)",
                (composer_key("good"), r#"{"usageData": {"amount": 3}}"#),
            )
            .unwrap();
            conn.execute(
                "INSERT INTO cursorDiskKV (key, value) VALUES (?1, NULL)",
                [composer_key("nulled")],
            )
            .unwrap();
        }

        let store = GlobalStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        let agg = aggregate(&store, &ids(&["good", "nulled"])).unwrap();
        assert_eq!(agg.sessions.len(), 1);
        assert_eq!(agg.sessions[0].id, "good");
        assert_eq!(agg.sessions[0].usage_amount, 3);
    }

    #[test]
    fn message_carries_embedded_code_blocks() {
        let raw = json!({
            "type": 2,
            "text": "try this",
            "codeBlocks": [{"content": "fn main() {}"}, {"languageId": "rust"}]
        });
        let message = parse_message(&bubble_key("s", "m"), &raw.to_string()).unwrap();
        assert_eq!(message.session_id, "s");
        assert_eq!(message.code, vec!["fn main() {}".to_string()]);
        assert_eq!(message.to_chat_entry().r#type, "output");
    }
}
