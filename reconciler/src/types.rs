use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// A count split by conversation direction.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCount {
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub r#type: String,
    pub text: String,
    pub code: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitSummary {
    pub branch: String,
    pub lines_changed: u64,
    pub commit: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub used_tokens: IoCount,
    pub usage_request_amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_request_usage_count: Option<u64>,
    pub chat_count: IoCount,
    pub git: GitSummary,
    pub proposed_code_count: u64,
    pub accepted_code_count: u64,
    pub adoption_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_entries: Option<Vec<ChatEntry>>,
}

impl Report {
    /// Structural checks only. A skewed clock (`endTime` before `startTime`)
    /// is logged by the assembler and does not fail the report.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.adoption_rate.is_finite() && (0.0..=1.0).contains(&self.adoption_rate),
            "adoptionRate must be within [0, 1], got {}",
            self.adoption_rate
        );
        ensure!(
            self.accepted_code_count <= self.proposed_code_count,
            "acceptedCodeCount exceeds proposedCodeCount"
        );
        if let Some(entries) = &self.chat_entries {
            for entry in entries {
                ensure!(
                    matches!(entry.r#type.as_str(), "input" | "output" | "unknown"),
                    "chat entry type {:?} is not recognized",
                    entry.r#type
                );
            }
        }
        Ok(())
    }
}
