use crate::types::GateStatus;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// GateDefinition
// ---------------------------------------------------------------------------

/// One named verification command, executed through the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDefinition {
    pub name: String,
    pub command: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_required() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    300
}

impl GateDefinition {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        GateDefinition {
            name: name.into(),
            command: command.into(),
            required: default_required(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateOutcome {
    pub name: String,
    pub status: GateStatus,
    pub duration_seconds: f64,
    pub output: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateReport {
    pub status: GateStatus,
    /// Per-gate outcomes in declaration order; gates never reached because
    /// of fail-fast have no entry.
    pub gates: Vec<GateOutcome>,
    pub total_duration_seconds: f64,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Pass
    }

    pub fn gate(&self, name: &str) -> Option<&GateOutcome> {
        self.gates.iter().find(|g| g.name == name)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Run gates in declaration order against `workdir`, stopping at the first
/// required gate that fails. Non-required gates are skipped entirely.
pub fn run_gates(gates: &[GateDefinition], workdir: &Path) -> GateReport {
    let started = Instant::now();
    let mut outcomes = Vec::new();
    let mut status = GateStatus::Pass;

    for gate in gates {
        if !gate.required {
            debug!(gate = %gate.name, "skipping non-required gate");
            continue;
        }
        let outcome = run_gate(gate, workdir);
        let failed = outcome.status == GateStatus::Fail;
        outcomes.push(outcome);
        if failed {
            status = GateStatus::Fail;
            break;
        }
    }

    GateReport {
        status,
        gates: outcomes,
        total_duration_seconds: started.elapsed().as_secs_f64(),
    }
}

/// Execute one gate with its deadline. Timeouts and spawn failures are both
/// reported as FAIL with a synthetic exit code of -1, never as an error.
fn run_gate(gate: &GateDefinition, workdir: &Path) -> GateOutcome {
    let started = Instant::now();
    debug!(gate = %gate.name, command = %gate.command, "running gate");

    let spawned = Command::new("sh")
        .arg("-c")
        .arg(&gate.command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            warn!(gate = %gate.name, error = %e, "gate failed to spawn");
            return GateOutcome {
                name: gate.name.clone(),
                status: GateStatus::Fail,
                duration_seconds: started.elapsed().as_secs_f64(),
                output: e.to_string(),
                exit_code: -1,
            };
        }
    };

    // Drain both pipes on threads so a chatty child can't block on a full
    // pipe buffer while we poll for exit.
    let stdout_handle = child.stdout.take().map(drain_pipe);
    let stderr_handle = child.stderr.take().map(drain_pipe);

    let deadline = started + Duration::from_secs(gate.timeout_seconds);
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(exit)) => break Some(exit),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                warn!(gate = %gate.name, error = %e, "gate wait failed");
                let _ = child.kill();
                let _ = child.wait();
                return GateOutcome {
                    name: gate.name.clone(),
                    status: GateStatus::Fail,
                    duration_seconds: started.elapsed().as_secs_f64(),
                    output: e.to_string(),
                    exit_code: -1,
                };
            }
        }
    };

    let mut output = String::new();
    for handle in [stdout_handle, stderr_handle].into_iter().flatten() {
        if let Ok(text) = handle.join() {
            output.push_str(&text);
        }
    }

    match exit_status {
        Some(exit) => {
            let exit_code = exit.code().unwrap_or(-1);
            GateOutcome {
                name: gate.name.clone(),
                status: if exit.success() {
                    GateStatus::Pass
                } else {
                    GateStatus::Fail
                },
                duration_seconds: started.elapsed().as_secs_f64(),
                output,
                exit_code,
            }
        }
        None => GateOutcome {
            name: gate.name.clone(),
            status: GateStatus::Fail,
            duration_seconds: gate.timeout_seconds as f64,
            output: format!("Gate timed out after {}s", gate.timeout_seconds),
            exit_code: -1,
        },
    }
}

fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
