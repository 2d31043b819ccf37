use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use reconciler::checkpoint::{self, checkpoint_path, Checkpoint};
use reconciler::{EfficiencyConfig, GitCli, StorageRoots, VersionControl};
use tracing::info;

use crate::usage;

pub fn run_start(config: &EfficiencyConfig) -> Result<()> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let git = GitCli::new(&cwd);

    let branch = git.current_branch().context("read current branch")?;
    let start_sha = git.resolve_revision("HEAD").context("resolve HEAD")?;
    let start_time = Utc::now();

    let request_usage_count = if config.fetch_usage {
        let roots = StorageRoots::from_config(config);
        Some(usage::fetch_request_usage_count(&roots, &config.usage_url))
    } else {
        None
    };

    let path = checkpoint_path(&config.state_dir, &cwd);
    let marker = Checkpoint {
        branch,
        start_sha,
        start_time,
        request_usage_count,
    };
    checkpoint::save(&path, &marker)
        .with_context(|| format!("write checkpoint {}", path.display()))?;
    info!(path = %path.display(), "saved checkpoint");

    println!(
        "Started on {} @ {} ({})",
        marker.branch,
        marker.start_sha,
        marker.start_time.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    Ok(())
}
