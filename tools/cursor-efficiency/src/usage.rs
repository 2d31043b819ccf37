//! Account-wide request quota counter, recorded by `start` for reference.

use anyhow::{Context, Result};
use reconciler::store::read_item_at;
use reconciler::StorageRoots;
use serde_json::Value;
use tracing::{debug, warn};

const REFRESH_TOKEN_KEY: &str = "cursorAuth/refreshToken";

/// Sum of `numRequests` across every model, or `0` when anything goes wrong.
pub fn fetch_request_usage_count(roots: &StorageRoots, url: &str) -> u64 {
    match try_fetch(roots, url) {
        Ok(count) => count,
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(err = %reason, "request usage unavailable, recording 0");
            0
        }
    }
}

fn try_fetch(roots: &StorageRoots, url: &str) -> Result<u64> {
    let Some(token) = read_refresh_token(roots)? else {
        debug!("no Cursor refresh token, skipping usage lookup");
        return Ok(0);
    };

    let client = reqwest::blocking::Client::new();
    let resp = client
        .get(url)
        .bearer_auth(token)
        .send()
        .context("Cursor usage request failed")?;

    if !resp.status().is_success() {
        anyhow::bail!("Cursor usage request failed: HTTP {}", resp.status());
    }

    let body: Value = resp.json().context("parse Cursor usage JSON")?;
    Ok(sum_request_counts(&body))
}

fn read_refresh_token(roots: &StorageRoots) -> Result<Option<String>> {
    let db_path = roots.global_db();
    if !db_path.is_file() {
        return Ok(None);
    }
    let raw = read_item_at(&db_path, REFRESH_TOKEN_KEY)
        .with_context(|| format!("read {REFRESH_TOKEN_KEY} from {}", db_path.display()))?;
    Ok(raw.map(|v| clean_token(&v)).filter(|t| !t.is_empty()))
}

// Some builds store the token JSON-encoded.
fn clean_token(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

/// Entries that aren't per-model objects (e.g. `startOfMonth`) are ignored.
pub fn sum_request_counts(body: &Value) -> u64 {
    let Value::Object(map) = body else {
        return 0;
    };
    map.values()
        .filter_map(|model| model.get("numRequests"))
        .filter_map(Value::as_u64)
        .sum()
}
