use agent_harness::{run_agent, HarnessOptions};
use prdloop_core::backlog::Story;
use prdloop_core::error::{CoreError, Result as CoreResult};
use prdloop_core::gate::GateReport;
use prdloop_core::report::format_duration;
use prdloop_core::scheduler::{AgentInvoker, AgentRequest, AgentRun, Reporter, StopReason};
use prdloop_core::select::{Advisor, AdvisorChoice};
use prdloop_core::types::GateStatus;
use std::future::Future;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Runtime plumbing
// ---------------------------------------------------------------------------

/// Block on a future whether or not we are already inside a tokio runtime
/// (the loop itself is synchronous; integration tests may wrap it in one).
fn block_on<F: Future>(fut: F) -> F::Output {
    match tokio::runtime::Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(fut)
        }),
        Err(_) => tokio::runtime::Runtime::new()
            .expect("tokio runtime")
            .block_on(fut),
    }
}

// ---------------------------------------------------------------------------
// ProcessAgent
// ---------------------------------------------------------------------------

/// Drives the configured coding-agent binary through `agent-harness`,
/// echoing its output live and racing it against Ctrl-C.
pub struct ProcessAgent {
    pub executable: String,
}

impl AgentInvoker for ProcessAgent {
    fn implement_story(&self, request: &AgentRequest) -> AgentRun {
        let opts = HarnessOptions {
            executable: self.executable.clone(),
            model: (!request.model.is_empty()).then(|| request.model.clone()),
            skip_confirmations: request.skip_confirmations,
            cwd: Some(request.workdir.clone()),
            timeout: request.timeout,
        };

        let result = block_on(async {
            tokio::select! {
                outcome = run_agent(&request.prompt, &opts, |line| eprintln!("  {line}")) => {
                    outcome.map(|o| AgentRun {
                        exit_code: o.exit_code,
                        output: o.output,
                        timed_out: o.timed_out,
                        interrupted: false,
                    })
                }
                // Dropping the run future kills the child (kill_on_drop).
                _ = tokio::signal::ctrl_c() => Ok(AgentRun {
                    interrupted: true,
                    ..Default::default()
                }),
            }
        });

        match result {
            Ok(run) => run,
            Err(e) => AgentRun {
                exit_code: None,
                output: e.to_string(),
                ..Default::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// AgentAdvisor
// ---------------------------------------------------------------------------

const ADVISOR_TIMEOUT: Duration = Duration::from_secs(120);

/// Optional delegated story selection: a one-shot agent call that must reply
/// with a single JSON object. Any malformed reply falls back to the
/// heuristic inside the selector.
pub struct AgentAdvisor {
    pub executable: String,
    pub model: String,
}

impl Advisor for AgentAdvisor {
    fn choose(
        &self,
        candidates: &[&Story],
        completed_ids: &[String],
        tree_summary: &str,
    ) -> CoreResult<AdvisorChoice> {
        let prompt = advisor_prompt(candidates, completed_ids, tree_summary);
        let opts = HarnessOptions {
            executable: self.executable.clone(),
            model: (!self.model.is_empty()).then(|| self.model.clone()),
            skip_confirmations: true,
            cwd: None,
            timeout: ADVISOR_TIMEOUT,
        };

        let outcome = block_on(run_agent(&prompt, &opts, |_| {}))
            .map_err(|e| CoreError::Advisor(e.to_string()))?;
        if !outcome.succeeded() {
            return Err(CoreError::Advisor(format!(
                "advisor exited with {:?}",
                outcome.exit_code
            )));
        }
        parse_choice(&outcome.output)
            .ok_or_else(|| CoreError::Advisor("no JSON object in advisor reply".into()))
    }
}

fn advisor_prompt(candidates: &[&Story], completed_ids: &[String], tree_summary: &str) -> String {
    let mut prompt = String::from(
        "Pick the single best story to implement next. Reply with one JSON object \
         {\"selectedStoryId\": \"...\", \"reasoning\": \"...\"} and nothing else.\n\nCandidates:\n",
    );
    for story in candidates {
        prompt.push_str(&format!(
            "- {} (priority {}): {}\n",
            story.id,
            story
                .priority
                .map(|p| p.to_string())
                .unwrap_or_else(|| "none".into()),
            story.title
        ));
    }
    prompt.push_str(&format!("\nCompleted: {}\n", completed_ids.join(", ")));
    if !tree_summary.is_empty() {
        prompt.push_str(&format!("\nWorking tree:\n{tree_summary}\n"));
    }
    prompt
}

/// Scan the reply for the last parseable `{…}` line; agents often wrap the
/// JSON in prose.
fn parse_choice(output: &str) -> Option<AdvisorChoice> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str::<AdvisorChoice>(l).ok())
}

// ---------------------------------------------------------------------------
// ConsoleReporter
// ---------------------------------------------------------------------------

pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn session_started(&self, remaining: usize) {
        eprintln!("Starting loop: {remaining} selectable stories");
    }

    fn iteration_started(&self, iteration: u64, story: &Story) {
        eprintln!("\n=== Iteration {iteration}: {} - {} ===", story.id, story.title);
    }

    fn gates_finished(&self, report: &GateReport) {
        for gate in &report.gates {
            let mark = match gate.status {
                GateStatus::Pass => "ok",
                GateStatus::Fail => "FAIL",
            };
            eprintln!(
                "  gate {} … {mark} ({})",
                gate.name,
                format_duration(gate.duration_seconds)
            );
        }
    }

    fn story_completed(&self, story: &Story, duration_seconds: f64) {
        eprintln!(
            "  {} complete in {}",
            story.id,
            format_duration(duration_seconds)
        );
    }

    fn story_failed(&self, story: &Story, failure_count: u64, max_failures: u64) {
        eprintln!(
            "  {} failed ({failure_count}/{max_failures} consecutive failures)",
            story.id
        );
    }

    fn stopping(&self, reason: StopReason) {
        eprintln!("\nStopping: {reason}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
