use crate::agent::{AgentAdvisor, ConsoleReporter, ProcessAgent};
use crate::output;
use anyhow::{bail, Context, Result};
use prdloop_core::backlog::Backlog;
use prdloop_core::config::Config;
use prdloop_core::git::GitClient;
use prdloop_core::paths;
use prdloop_core::scheduler::{Scheduler, StopReason};
use prdloop_core::validate::validate;
use std::path::Path;
use tracing::warn;

/// Exit status for an operator interrupt, distinct from both success and
/// fatal configuration errors.
const INTERRUPT_EXIT_CODE: i32 = 130;

pub fn run(
    root: &Path,
    backlog_path: Option<&Path>,
    max_iterations: Option<u64>,
    phase: Option<i64>,
    advisor: bool,
    json: bool,
) -> Result<()> {
    paths::require_initialized(root)?;

    let mut config = Config::load(root).context("failed to load config")?;
    for warning in config.validate() {
        warn!("config: {}", warning.message);
    }
    if let Some(n) = max_iterations {
        config.limits.max_iterations = n;
    }

    let path = backlog_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths::backlog_path(root));
    let mut backlog = Backlog::load(&path)
        .with_context(|| format!("could not load backlog {}", path.display()))?;

    // A structurally broken backlog is a fatal configuration error; the loop
    // never starts.
    let report = validate(&backlog);
    if !report.valid {
        output::print_validation(&report);
        bail!("backlog invalid: {} error(s)", report.errors.len());
    }

    let agent = ProcessAgent {
        executable: config.agent.executable.clone(),
    };
    let vcs = GitClient::new(root);
    let reporter = ConsoleReporter;
    let agent_advisor = advisor.then(|| AgentAdvisor {
        executable: config.agent.executable.clone(),
        model: config.agent.model.clone(),
    });

    let mut scheduler = Scheduler::new(root, config, &agent, &vcs)
        .with_backlog_path(&path)
        .with_phase(phase)
        .with_reporter(&reporter);
    if let Some(a) = agent_advisor.as_ref() {
        scheduler = scheduler.with_advisor(a);
    }

    let summary = scheduler.run(&mut backlog)?;

    if json {
        output::print_json(&summary)?;
    } else {
        output::print_summary(&summary);
    }

    if summary.stop_reason == StopReason::Interrupted {
        std::process::exit(INTERRUPT_EXIT_CODE);
    }
    Ok(())
}
