//! `agent-harness` — deadline-enforced driver for the external coding agent.
//!
//! The loop hands the agent a prompt and only ever interprets its exit code;
//! the combined output stream is forwarded line by line for logging. This
//! crate owns the subprocess mechanics: spawn, stream, enforce the deadline,
//! kill on timeout or cancellation.
//!
//! ```text
//! HarnessOptions
//!     │
//!     ▼
//! AgentProcess   ← spawns `<executable> --model … -p <prompt>`
//!     │             stdout line reader + stderr drain task
//!     ▼
//! run_agent      ← select! { next line, deadline, cancellation }
//!     │
//!     ▼
//! AgentOutcome   ← exit code, combined output, timed_out flag
//! ```

pub mod error;
pub mod process;

pub use error::HarnessError;
pub use process::{run_agent, AgentOutcome, AgentProcess, HarnessOptions};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, HarnessError>;
