use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// `git diff --stat` output.
    pub summary: String,
    /// Unified patch text.
    pub patch: String,
}

/// The history queries a report needs.
pub trait VersionControl {
    fn current_branch(&self) -> Result<String>;
    fn resolve_revision(&self, rev: &str) -> Result<String>;
    /// Added plus removed lines across every file changed between `from` and `to`.
    fn changed_line_count(&self, from: &str, to: &str) -> Result<u64>;
    /// Commits reachable from `to` but not `from`, oldest first.
    fn commit_list(&self, from: &str, to: &str) -> Result<Vec<String>>;
    fn diff(&self, from: &str, to: &str) -> Result<Diff>;
}

/// Shells out to the `git` on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn output(&self, args: &[&str]) -> Result<String> {
        git_output(&self.repo_root, args)
    }
}

impl VersionControl for GitCli {
    fn current_branch(&self) -> Result<String> {
        Ok(self.output(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    fn resolve_revision(&self, rev: &str) -> Result<String> {
        Ok(self.output(&["rev-parse", rev])?.trim().to_string())
    }

    fn changed_line_count(&self, from: &str, to: &str) -> Result<u64> {
        let range = format!("{from}..{to}");
        let raw = self.output(&["diff", "--numstat", &range])?;
        Ok(sum_numstat(&raw))
    }

    fn commit_list(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let range = format!("{from}..{to}");
        let raw = self.output(&["rev-list", "--reverse", &range])?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn diff(&self, from: &str, to: &str) -> Result<Diff> {
        let range = format!("{from}..{to}");
        Ok(Diff {
            summary: self.output(&["diff", "--stat", &range])?,
            patch: self.output(&["diff", &range])?,
        })
    }
}

/// Binary files report `-` for both columns and count as zero.
pub fn sum_numstat(raw: &str) -> u64 {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut cols = line.split('\t');
            let added = cols.next().and_then(|c| c.trim().parse::<u64>().ok());
            let removed = cols.next().and_then(|c| c.trim().parse::<u64>().ok());
            added.unwrap_or(0) + removed.unwrap_or(0)
        })
        .sum()
}

fn git_output(repo_root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()?;

    if !output.status.success() {
        return Err(Error::Git {
            command: args.join(" "),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
