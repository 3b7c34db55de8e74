use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::Instant;
use tracing::debug;

use crate::{HarnessError, Result};

// ─── Options ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Agent executable, e.g. `claude`.
    pub executable: String,
    pub model: Option<String>,
    /// Pass the skip-confirmation flag; required for unattended runs.
    pub skip_confirmations: bool,
    pub cwd: Option<PathBuf>,
    /// Wall-clock budget for the whole delegation.
    pub timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        HarnessOptions {
            executable: "claude".into(),
            model: None,
            skip_confirmations: true,
            cwd: None,
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Outcome of one agent run. `exit_code` is `None` when the process was
/// killed (timeout) or terminated by a signal.
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
}

impl AgentOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

// ─── AgentProcess ─────────────────────────────────────────────────────────

/// A running agent subprocess. Stdout is read line by line; stderr is
/// drained by a background task and folded into the combined output at the
/// end so a full pipe can never wedge the child.
pub struct AgentProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl AgentProcess {
    /// Spawn the real agent binary with the prompt as its final argument.
    pub fn spawn(prompt: &str, opts: &HarnessOptions) -> Result<Self> {
        Self::from_command(build_command(prompt, opts))
    }

    /// Spawn an arbitrary command as a mock agent. Used in tests to inject
    /// scripted shell processes.
    pub fn spawn_command(cmd: Command) -> Result<Self> {
        Self::from_command(cmd)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(HarnessError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Process("stdout not captured".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        let lines = BufReader::new(stdout).lines();
        Ok(Self {
            child,
            lines,
            stderr_buf,
        })
    }

    /// Next stdout line, `None` on EOF.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line().await.map_err(HarnessError::Io)
    }

    /// Kill the subprocess (best-effort; errors are silently ignored).
    pub async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }

    /// Wait for exit and return the code (`None` if killed by a signal).
    pub async fn wait_code(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await.map_err(HarnessError::Io)?;
        Ok(status.code())
    }

    fn take_stderr(&self) -> String {
        self.stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default()
    }
}

// ─── Run loop ─────────────────────────────────────────────────────────────

/// Drive one delegation to completion: stream stdout lines to `on_line`
/// until EOF or the deadline, then collect the exit code. On timeout the
/// child is killed and the outcome is marked `timed_out` — the caller treats
/// that as an ordinary failure, never an error.
pub async fn run_agent(
    prompt: &str,
    opts: &HarnessOptions,
    mut on_line: impl FnMut(&str),
) -> Result<AgentOutcome> {
    let mut process = AgentProcess::spawn(prompt, opts)?;
    run_process(&mut process, opts.timeout, &mut on_line).await
}

pub(crate) async fn run_process(
    process: &mut AgentProcess,
    timeout: Duration,
    on_line: &mut impl FnMut(&str),
) -> Result<AgentOutcome> {
    let deadline = Instant::now() + timeout;
    let mut output = String::new();

    loop {
        tokio::select! {
            line = process.next_line() => match line? {
                Some(line) => {
                    on_line(&line);
                    output.push_str(&line);
                    output.push('\n');
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline) => {
                debug!("agent deadline exceeded, killing subprocess");
                process.kill().await;
                let _ = process.child.wait().await;
                return Ok(AgentOutcome {
                    exit_code: None,
                    output,
                    timed_out: true,
                });
            }
        }
    }

    let exit_code = process.wait_code().await?;
    let stderr = process.take_stderr();
    if !stderr.is_empty() {
        output.push_str(&stderr);
        output.push('\n');
    }

    Ok(AgentOutcome {
        exit_code,
        output,
        timed_out: false,
    })
}

// ─── Command builder ──────────────────────────────────────────────────────

fn build_command(prompt: &str, opts: &HarnessOptions) -> Command {
    let mut cmd = Command::new(&opts.executable);

    if opts.skip_confirmations {
        cmd.arg("--dangerously-skip-permissions");
    }
    if let Some(model) = &opts.model {
        cmd.arg("--model").arg(model);
    }
    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }
    cmd.arg("-p").arg(prompt);

    cmd
}

// ─── Tests ────────────────────────────────────────────────────────────────
