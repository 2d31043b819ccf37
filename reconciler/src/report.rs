use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::locator::{resolve_workspace_identity, StorageRoots};
use crate::metrics::MetricsSummary;
use crate::records::{aggregate, Aggregate, GlobalStore, RecordStore};
use crate::sessions::{select, SessionIndex, WorkspaceIndex};
use crate::types::{ChatEntry, GitSummary, Report, TimeWindow};
use crate::vcs::VersionControl;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

/// Metrics plus the transcript they were computed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub metrics: MetricsSummary,
    pub transcript: Vec<ChatEntry>,
}

/// Runs the workspace-store → global-store join for one project directory.
#[derive(Debug, Clone)]
pub struct Reconciler {
    roots: StorageRoots,
}

impl Reconciler {
    pub fn new(roots: StorageRoots) -> Self {
        Self { roots }
    }

    pub fn reconcile(&self, workspace_dir: &Path, window: &TimeWindow) -> Result<Reconciliation> {
        let identity = resolve_workspace_identity(&self.roots.workspace, workspace_dir)?;
        let index = WorkspaceIndex::new(self.roots.workspace_db(&identity));
        let global_db = self.roots.global_db();
        let open_global = || {
            GlobalStore::open(&global_db)
                .inspect(|store| debug!(path = ?store.path(), "opened global store"))
        };
        reconcile_with(&index, open_global, window)
    }
}

/// The global store is only opened when there is something to look up, and
/// is released before this returns.
pub fn reconcile_with<I, S, F>(index: &I, open_store: F, window: &TimeWindow) -> Result<Reconciliation>
where
    I: SessionIndex + ?Sized,
    S: RecordStore,
    F: FnOnce() -> Result<S>,
{
    let selection = select(index, window)?;
    debug!(
        sessions = selection.session_ids.len(),
        legacy = selection.legacy.len(),
        "selected activity in window"
    );

    let mut aggregated = if selection.session_ids.is_empty() {
        Aggregate::default()
    } else {
        let store = open_store()?;
        aggregate(&store, &selection.session_ids)?
    };
    aggregated.messages.extend(
        selection
            .legacy
            .into_iter()
            .enumerate()
            .map(|(i, g)| g.into_message(i)),
    );

    Ok(Reconciliation {
        metrics: MetricsSummary::from_aggregate(&aggregated),
        transcript: aggregated.transcript(),
    })
}

/// History between the checkpoint and `end_sha`.
pub fn git_summary<V: VersionControl + ?Sized>(
    vcs: &V,
    checkpoint: &Checkpoint,
    end_sha: &str,
    include_diff: bool,
) -> Result<GitSummary> {
    let from = checkpoint.start_sha.as_str();
    let diff = if include_diff {
        let diff = vcs.diff(from, end_sha)?;
        info!(stat = %diff.summary.trim_end(), "collected diff");
        Some(diff.patch)
    } else {
        None
    };
    Ok(GitSummary {
        branch: checkpoint.branch.clone(),
        lines_changed: vcs.changed_line_count(from, end_sha)?,
        commit: vcs.commit_list(from, end_sha)?,
        diff,
    })
}

/// Logs a warning when `end` runs on a different branch than `start` did.
pub fn check_branch(checkpoint: &Checkpoint, current: &str) -> bool {
    if checkpoint.branch == current {
        return true;
    }
    warn!(
        started = %checkpoint.branch,
        now = %current,
        "branch mismatch: started on {}, now on {}",
        checkpoint.branch,
        current
    );
    false
}

pub struct ReportInputs {
    pub checkpoint: Checkpoint,
    pub end_time: DateTime<Utc>,
    pub reconciliation: Reconciliation,
    pub git: GitSummary,
    pub include_chat_entries: bool,
}

pub fn assemble(inputs: ReportInputs) -> Report {
    let ReportInputs {
        checkpoint,
        end_time,
        reconciliation,
        git,
        include_chat_entries,
    } = inputs;
    let metrics = reconciliation.metrics;

    if end_time < checkpoint.start_time {
        warn!(
            start = %checkpoint.start_time,
            end = %end_time,
            "session ends before it started, check the system clock"
        );
    }

    info!(
        usage = metrics.usage_amount,
        proposed = metrics.proposed_code_count,
        accepted = metrics.accepted_code_count,
        "assembled report"
    );

    Report {
        start_time: checkpoint.start_time,
        end_time,
        used_tokens: metrics.tokens,
        usage_request_amount: metrics.usage_amount,
        start_request_usage_count: checkpoint.request_usage_count,
        chat_count: metrics.chat_count,
        git,
        proposed_code_count: metrics.proposed_code_count,
        accepted_code_count: metrics.accepted_code_count,
        adoption_rate: metrics.adoption_rate,
        chat_entries: include_chat_entries.then_some(reconciliation.transcript),
    }
}
