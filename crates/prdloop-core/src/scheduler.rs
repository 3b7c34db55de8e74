use crate::backlog::{Backlog, Story};
use crate::config::Config;
use crate::error::Result;
use crate::gate::{run_gates, GateReport};
use crate::git::Vcs;
use crate::paths;
use crate::progress::{self, GuardrailRecord, GUARDRAIL_CONTEXT_LINES};
use crate::prompt;
use crate::report::{build_summary, CompletedStory, SessionSummary};
use crate::select::{select_story, Advisor};
use crate::types::StoryStatus;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// StopReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    BacklogExhausted,
    FailureBudget,
    Interrupted,
}

impl StopReason {
    pub fn message(self) -> &'static str {
        match self {
            StopReason::MaxIterations => "max iterations reached",
            StopReason::BacklogExhausted => "no selectable stories remain",
            StopReason::FailureBudget => "failure threshold reached",
            StopReason::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

// ---------------------------------------------------------------------------
// Agent collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub workdir: PathBuf,
    pub model: String,
    pub skip_confirmations: bool,
    pub timeout: Duration,
}

/// Outcome of one delegation. Only the exit code carries the pass/fail
/// signal; the output is kept for logging and guardrail context.
#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
    pub interrupted: bool,
}

impl AgentRun {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.interrupted && self.exit_code == Some(0)
    }
}

/// External coding-agent collaborator. Implementations must not panic;
/// spawn problems are folded into a failed [`AgentRun`].
pub trait AgentInvoker {
    fn implement_story(&self, request: &AgentRequest) -> AgentRun;
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Presentation events. All methods default to no-ops so library callers and
/// tests run silently; the CLI installs a console implementation.
pub trait Reporter {
    fn session_started(&self, _remaining: usize) {}
    fn iteration_started(&self, _iteration: u64, _story: &Story) {}
    fn gates_finished(&self, _report: &GateReport) {}
    fn story_completed(&self, _story: &Story, _duration_seconds: f64) {}
    fn story_failed(&self, _story: &Story, _failure_count: u64, _max_failures: u64) {}
    fn stopping(&self, _reason: StopReason) {}
}

pub struct NullReporter;

impl Reporter for NullReporter {}

static NULL_REPORTER: NullReporter = NullReporter;

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The iteration loop. Strictly sequential: one story in flight at a time,
/// because every iteration mutates the shared working tree and backlog file.
pub struct Scheduler<'a> {
    root: PathBuf,
    backlog_path: PathBuf,
    config: Config,
    phase: Option<i64>,
    agent: &'a dyn AgentInvoker,
    vcs: &'a dyn Vcs,
    advisor: Option<&'a dyn Advisor>,
    reporter: &'a dyn Reporter,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        config: Config,
        agent: &'a dyn AgentInvoker,
        vcs: &'a dyn Vcs,
    ) -> Self {
        let root = root.into();
        let backlog_path = paths::backlog_path(&root);
        Scheduler {
            root,
            backlog_path,
            config,
            phase: None,
            agent,
            vcs,
            advisor: None,
            reporter: &NULL_REPORTER,
        }
    }

    pub fn with_backlog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backlog_path = path.into();
        self
    }

    pub fn with_phase(mut self, phase: Option<i64>) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_advisor(mut self, advisor: &'a dyn Advisor) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Drive the loop until a stop condition fires, then summarize.
    ///
    /// The backlog is persisted after every state transition: once when a
    /// story enters in_progress (before delegation, so observers see live
    /// state) and again when it completes. An interrupt therefore leaves at
    /// worst an in_progress story on disk, which is recoverable.
    pub fn run(&self, backlog: &mut Backlog) -> Result<SessionSummary> {
        let session_start = Instant::now();
        let progress_path = paths::progress_path(&self.root);
        let guardrails_path = paths::guardrails_path(&self.root);

        let mut iteration: u64 = 0;
        let mut failure_count: u64 = 0;
        let mut last_story_id: Option<String> = None;
        let mut session_completed: Vec<CompletedStory> = Vec::new();
        let max_iterations = self.config.limits.max_iterations;
        let max_failures = self.config.limits.max_failures;

        self.reporter
            .session_started(backlog.remaining(self.phase).len());

        let stop = loop {
            // Stop conditions, in order.
            if max_iterations > 0 && iteration >= max_iterations {
                break StopReason::MaxIterations;
            }
            if backlog.remaining(self.phase).is_empty() {
                break StopReason::BacklogExhausted;
            }
            if failure_count >= max_failures {
                break StopReason::FailureBudget;
            }

            let tree_summary = tree_listing(&self.root);
            let story_id = {
                let candidates = backlog.remaining(self.phase);
                match select_story(&candidates, backlog, self.advisor, &tree_summary) {
                    Some(story) => story.id.clone(),
                    None => break StopReason::BacklogExhausted,
                }
            };
            iteration += 1;

            // Persist in_progress before delegating so external viewers see
            // live state. This write is blocking by design.
            backlog.metadata.current_iteration = iteration;
            backlog.start_story(&story_id)?;
            backlog.save(&self.backlog_path)?;

            let story_snapshot = match backlog.story(&story_id) {
                Some(story) => story.clone(),
                None => break StopReason::BacklogExhausted,
            };
            self.reporter.iteration_started(iteration, &story_snapshot);
            info!(iteration, story = %story_id, "delegating story");

            let tail = progress::progress_tail(&progress_path, GUARDRAIL_CONTEXT_LINES)?;
            let guardrails = progress::load_guardrails(&guardrails_path)?;
            let request = AgentRequest {
                prompt: prompt::build_story_prompt(
                    &story_snapshot,
                    backlog,
                    &tail,
                    &guardrails,
                    &self.root,
                ),
                workdir: self.root.clone(),
                model: self.config.agent.model.clone(),
                skip_confirmations: self.config.agent.skip_confirmations,
                timeout: Duration::from_secs(self.config.agent.iteration_timeout_seconds),
            };
            let run = self.agent.implement_story(&request);
            if run.interrupted {
                break StopReason::Interrupted;
            }

            // Gates only run after a clean agent exit.
            let mut failure_output = String::new();
            let passed = if !run.succeeded() {
                failure_output = if run.timed_out {
                    "execution timed out".to_string()
                } else {
                    run.output.clone()
                };
                false
            } else {
                let report = run_gates(&self.config.gates, &self.root);
                self.reporter.gates_finished(&report);
                if report.passed() {
                    true
                } else {
                    failure_output = report
                        .gates
                        .last()
                        .map(|g| format!("Gate '{}' failed:\n{}", g.name, g.output))
                        .unwrap_or_default();
                    false
                }
            };

            if passed {
                failure_count = 0;
                let duration_seconds = story_snapshot
                    .started_at
                    .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
                    .unwrap_or(0.0);
                if let Some(story) = backlog.story_mut(&story_id) {
                    story.status = StoryStatus::Complete;
                    story.actual_duration = Some(duration_seconds);
                    story.iteration_number = Some(iteration);
                }
                backlog.save(&self.backlog_path)?;
                self.commit_story(backlog, &story_snapshot);
                progress::append_progress(
                    &progress_path,
                    iteration,
                    &story_snapshot,
                    true,
                    &run.output,
                )?;
                session_completed.push(CompletedStory {
                    id: story_snapshot.id.clone(),
                    title: story_snapshot.title.clone(),
                    duration_seconds,
                });
                self.reporter.story_completed(&story_snapshot, duration_seconds);
            } else {
                failure_count += 1;
                progress::append_progress(
                    &progress_path,
                    iteration,
                    &story_snapshot,
                    false,
                    &failure_output,
                )?;
                // Same story failing twice in a row earns a guardrail note.
                if failure_count >= 2 && last_story_id.as_deref() == Some(story_id.as_str()) {
                    let context = progress::progress_tail(&progress_path, GUARDRAIL_CONTEXT_LINES)?;
                    let record = GuardrailRecord::new(&story_snapshot, failure_count, context);
                    progress::append_guardrail(&guardrails_path, &record)?;
                }
                self.reporter
                    .story_failed(&story_snapshot, failure_count, max_failures);
            }

            last_story_id = Some(story_id);
            std::thread::sleep(Duration::from_secs(self.config.limits.pause_seconds));
        };

        self.reporter.stopping(stop);
        info!(reason = %stop, iterations = iteration, "loop stopped");

        let changed_files = self.vcs.changed_files().unwrap_or_else(|e| {
            warn!(error = %e, "could not list changed files");
            Vec::new()
        });
        Ok(build_summary(
            stop,
            session_start.elapsed().as_secs_f64(),
            iteration,
            session_completed,
            changed_files,
            backlog,
            self.phase,
        ))
    }

    /// Best-effort branch + commit; failures are logged, never fatal.
    fn commit_story(&self, backlog: &Backlog, story: &Story) {
        if !self.config.git.auto_commit {
            return;
        }
        let branch = backlog.project.branch_identifier.as_str();
        if !branch.is_empty() {
            if let Err(e) = self.vcs.ensure_branch(branch) {
                warn!(branch, error = %e, "branch switch failed");
            }
        }
        match self.vcs.has_changes() {
            Ok(true) => {
                let message = self.config.commit_message(&story.id, &story.title);
                if let Err(e) = self.vcs.commit_all(&message) {
                    warn!(story = %story.id, error = %e, "commit failed");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not check working tree"),
        }
    }
}

/// Coarse working-tree snapshot handed to the selection advisor: the sorted
/// top-level entry names, nothing recursive.
fn tree_listing(root: &std::path::Path) -> String {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::git::NoVcs;
    use crate::select::AdvisorChoice;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Agent that replays a scripted list of outcomes and records what the
    /// on-disk backlog looked like at delegation time.
    struct ScriptedAgent {
        outcomes: RefCell<VecDeque<AgentRun>>,
        backlog_path: PathBuf,
        observed_statuses: RefCell<Vec<String>>,
    }

    impl ScriptedAgent {
        fn new(backlog_path: PathBuf, outcomes: Vec<AgentRun>) -> Self {
            ScriptedAgent {
                outcomes: RefCell::new(outcomes.into()),
                backlog_path,
                observed_statuses: RefCell::new(Vec::new()),
            }
        }
    }

    impl AgentInvoker for ScriptedAgent {
        fn implement_story(&self, request: &AgentRequest) -> AgentRun {
            assert!(!request.prompt.is_empty());
            // What does a concurrent observer see mid-delegation?
            let on_disk = Backlog::load(&self.backlog_path).unwrap();
            for story in on_disk.stories() {
                if story.status == StoryStatus::InProgress {
                    self.observed_statuses.borrow_mut().push(story.id.clone());
                }
            }
            self.outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| AgentRun {
                    exit_code: Some(1),
                    output: "script exhausted".into(),
                    ..Default::default()
                })
        }
    }

    struct QueueAdvisor {
        picks: RefCell<VecDeque<String>>,
    }

    impl Advisor for QueueAdvisor {
        fn choose(
            &self,
            _candidates: &[&Story],
            _completed: &[String],
            _tree: &str,
        ) -> crate::error::Result<AdvisorChoice> {
            match self.picks.borrow_mut().pop_front() {
                Some(id) => Ok(AdvisorChoice {
                    selected_story_id: id,
                    reasoning: String::new(),
                }),
                None => Err(CoreError::Advisor("script exhausted".into())),
            }
        }
    }

    fn success() -> AgentRun {
        AgentRun {
            exit_code: Some(0),
            output: "done".into(),
            ..Default::default()
        }
    }

    fn failure() -> AgentRun {
        AgentRun {
            exit_code: Some(1),
            output: "agent error".into(),
            ..Default::default()
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.limits.pause_seconds = 0;
        config.limits.max_failures = 3;
        config.limits.max_iterations = 20;
        config
    }

    fn setup(stories: Vec<Story>) -> (TempDir, PathBuf, Backlog) {
        let dir = TempDir::new().unwrap();
        let path = paths::backlog_path(dir.path());
        let mut backlog = Backlog {
            stories: Some(stories),
            ..Default::default()
        };
        backlog.save(&path).unwrap();
        (dir, path, backlog)
    }

    #[test]
    fn completes_backlog_and_reports() {
        let (dir, path, mut backlog) =
            setup(vec![Story::new("US-001", "a"), Story::new("US-002", "b")]);
        let agent = ScriptedAgent::new(path, vec![success(), success()]);
        let vcs = NoVcs;
        let scheduler = Scheduler::new(dir.path(), test_config(), &agent, &vcs);
        let summary = scheduler.run(&mut backlog).unwrap();

        assert_eq!(summary.stop_reason, StopReason::BacklogExhausted);
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.completed.len(), 2);
        assert_eq!(summary.remaining_stories, 0);
        for story in backlog.stories() {
            assert_eq!(story.status, StoryStatus::Complete);
            assert!(story.actual_duration.is_some());
            assert!(story.iteration_number.is_some());
        }
        assert_eq!(backlog.metadata.completed_stories, 2);
    }

    #[test]
    fn backlog_persisted_before_delegation() {
        let (dir, path, mut backlog) = setup(vec![Story::new("US-001", "a")]);
        let agent = ScriptedAgent::new(path, vec![success()]);
        let vcs = NoVcs;
        Scheduler::new(dir.path(), test_config(), &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        // The agent saw the story in_progress on disk while it was running.
        assert_eq!(*agent.observed_statuses.borrow(), vec!["US-001"]);
    }

    #[test]
    fn failure_budget_stops_loop_with_stories_remaining() {
        let (dir, path, mut backlog) = setup(vec![Story::new("US-001", "a")]);
        let agent = ScriptedAgent::new(path, vec![failure(), failure(), failure(), failure()]);
        let vcs = NoVcs;
        let summary = Scheduler::new(dir.path(), test_config(), &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::FailureBudget);
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.remaining_stories, 1);
        assert!(summary.completed.is_empty());
    }

    #[test]
    fn max_iterations_stops_first() {
        let (dir, path, mut backlog) =
            setup(vec![Story::new("US-001", "a"), Story::new("US-002", "b")]);
        let agent = ScriptedAgent::new(path, vec![success(), success()]);
        let vcs = NoVcs;
        let mut config = test_config();
        config.limits.max_iterations = 1;
        let summary = Scheduler::new(dir.path(), config, &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::MaxIterations);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.remaining_stories, 1);
    }

    #[test]
    fn success_resets_failure_counter() {
        let (dir, path, mut backlog) = setup(vec![Story::new("US-001", "a")]);
        // Two consecutive failures reach 2/3 of the budget; the success on
        // the third iteration must reset the counter and finish the story.
        let agent = ScriptedAgent::new(path, vec![failure(), failure(), success()]);
        let vcs = NoVcs;
        let summary = Scheduler::new(dir.path(), test_config(), &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::BacklogExhausted);
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.completed.len(), 1);
    }

    #[test]
    fn same_story_failing_twice_writes_one_guardrail() {
        let (dir, path, mut backlog) = setup(vec![Story::new("US-001", "Tricky story")]);
        let agent = ScriptedAgent::new(path, vec![failure(), failure()]);
        let vcs = NoVcs;
        let mut config = test_config();
        config.limits.max_failures = 2;
        Scheduler::new(dir.path(), config, &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        let guardrails =
            std::fs::read_to_string(paths::guardrails_path(dir.path())).unwrap();
        assert_eq!(guardrails.matches("## US-001: Tricky story").count(), 1);
    }

    #[test]
    fn different_stories_failing_write_no_guardrail() {
        let (dir, path, mut backlog) =
            setup(vec![Story::new("US-001", "a"), Story::new("US-002", "b")]);
        let agent = ScriptedAgent::new(path, vec![failure(), failure()]);
        let vcs = NoVcs;
        let advisor = QueueAdvisor {
            picks: RefCell::new(vec!["US-001".to_string(), "US-002".to_string()].into()),
        };
        let mut config = test_config();
        config.limits.max_failures = 2;
        Scheduler::new(dir.path(), config, &agent, &vcs)
            .with_advisor(&advisor)
            .run(&mut backlog)
            .unwrap();
        assert!(!paths::guardrails_path(dir.path()).exists());
    }

    #[test]
    fn agent_timeout_counts_as_failure() {
        let (dir, path, mut backlog) = setup(vec![Story::new("US-001", "a")]);
        let timed_out = AgentRun {
            exit_code: None,
            timed_out: true,
            ..Default::default()
        };
        let agent = ScriptedAgent::new(path, vec![timed_out, success()]);
        let vcs = NoVcs;
        let summary = Scheduler::new(dir.path(), test_config(), &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::BacklogExhausted);
        let progress =
            std::fs::read_to_string(paths::progress_path(dir.path())).unwrap();
        assert!(progress.contains("execution timed out"));
    }

    #[test]
    fn interrupt_exits_with_in_progress_snapshot() {
        let (dir, path, mut backlog) = setup(vec![Story::new("US-001", "a")]);
        let interrupted = AgentRun {
            interrupted: true,
            ..Default::default()
        };
        let agent = ScriptedAgent::new(path.clone(), vec![interrupted]);
        let vcs = NoVcs;
        let summary = Scheduler::new(dir.path(), test_config(), &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        // The last persisted snapshot shows the story in_progress, which is
        // a recoverable state for the next run.
        let on_disk = Backlog::load(&path).unwrap();
        assert_eq!(
            on_disk.story("US-001").unwrap().status,
            StoryStatus::InProgress
        );
    }

    #[test]
    fn phase_filter_limits_selection() {
        let (dir, path, mut backlog) = setup(vec![
            Story {
                phase: Some(1),
                ..Story::new("US-001", "a")
            },
            Story {
                phase: Some(2),
                ..Story::new("US-002", "b")
            },
        ]);
        backlog.save(&path).unwrap();
        let agent = ScriptedAgent::new(path, vec![success()]);
        let vcs = NoVcs;
        let summary = Scheduler::new(dir.path(), test_config(), &agent, &vcs)
            .with_phase(Some(1))
            .run(&mut backlog)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::BacklogExhausted);
        assert_eq!(backlog.story("US-001").unwrap().status, StoryStatus::Complete);
        assert_eq!(
            backlog.story("US-002").unwrap().status,
            StoryStatus::Incomplete
        );
    }

    #[test]
    fn gate_failure_fails_iteration() {
        let (dir, path, mut backlog) = setup(vec![Story::new("US-001", "a")]);
        let agent = ScriptedAgent::new(path, vec![success(), success()]);
        let vcs = NoVcs;
        let mut config = test_config();
        config.limits.max_failures = 1;
        config
            .gates
            .push(crate::gate::GateDefinition::new("check", "exit 1"));
        let summary = Scheduler::new(dir.path(), config, &agent, &vcs)
            .run(&mut backlog)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::FailureBudget);
        let progress =
            std::fs::read_to_string(paths::progress_path(dir.path())).unwrap();
        assert!(progress.contains("Gate 'check' failed"));
    }
}
