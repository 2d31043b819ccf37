//! Best-effort collection: keep what parses, log and drop what doesn't.
//!
//! Every place that reads editor-owned records (workspace metadata, composer
//! index entries, composer and bubble payloads) funnels its per-record
//! results through [`best_effort`], so the skip policy is applied the same
//! way everywhere.

use std::fmt::Display;
use tracing::warn;

/// Successes from a best-effort pass plus how many records were dropped.
#[derive(Debug)]
pub struct BestEffort<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

impl<T> BestEffort<T> {
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Collect every `Ok`, logging each `Err` under `kind` and skipping it.
pub fn best_effort<T, E, I>(kind: &str, results: I) -> BestEffort<T>
where
    I: IntoIterator<Item = Result<T, E>>,
    E: Display,
{
    let mut items = Vec::new();
    let mut skipped = 0usize;
    for result in results {
        match result {
            Ok(item) => items.push(item),
            Err(e) => {
                skipped += 1;
                warn!(kind, err = %e, "skipping malformed record");
            }
        }
    }
    BestEffort { items, skipped }
}
