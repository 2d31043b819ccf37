use anyhow::{Context, Result};
use chrono::Utc;
use reconciler::checkpoint::{self, checkpoint_path};
use reconciler::report::{assemble, check_branch, git_summary};
use reconciler::{
    EfficiencyConfig, GitCli, Reconciler, ReportInputs, StorageRoots, TimeWindow, VersionControl,
};

pub fn run_end(
    config: &EfficiencyConfig,
    branch: Option<&str>,
    include_chat_entries: bool,
    include_diff: bool,
) -> Result<()> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let git = GitCli::new(&cwd);

    // Left untouched by `context` so main can recognise it.
    let marker = checkpoint::load(&checkpoint_path(&config.state_dir, &cwd))?;

    let current = match branch {
        Some(name) => name.to_string(),
        None => git.current_branch().context("read current branch")?,
    };
    check_branch(&marker, &current);

    let end_sha = git.resolve_revision("HEAD").context("resolve HEAD")?;
    let end_time = Utc::now();
    let window = TimeWindow::new(marker.start_time, end_time);

    let reconciler = Reconciler::new(StorageRoots::from_config(config));
    let reconciliation = reconciler
        .reconcile(&cwd, &window)
        .context("read Cursor session data")?;
    let history =
        git_summary(&git, &marker, &end_sha, include_diff).context("summarise git history")?;

    let report = assemble(ReportInputs {
        checkpoint: marker,
        end_time,
        reconciliation,
        git: history,
        include_chat_entries,
    });
    report.validate()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
