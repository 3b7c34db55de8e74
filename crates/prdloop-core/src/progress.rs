use crate::backlog::Story;
use crate::error::Result;
use crate::io::{append_text, read_tail, write_if_missing};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Characters of subprocess output carried into a log entry.
const OUTPUT_EXCERPT_CHARS: usize = 500;

/// Progress-log lines summarized into a guardrail record.
pub const GUARDRAIL_CONTEXT_LINES: usize = 20;

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Progress log
// ---------------------------------------------------------------------------

pub fn init_progress(path: &Path) -> Result<()> {
    write_if_missing(path, b"# Progress Log\n")?;
    Ok(())
}

pub fn append_progress(
    path: &Path,
    iteration: u64,
    story: &Story,
    passed: bool,
    output: &str,
) -> Result<()> {
    init_progress(path)?;
    let status = if passed { "PASSED" } else { "FAILED" };
    let entry = format!(
        "\n## Iteration {iteration} - {id} - {timestamp}\n\n- Story: {title}\n- Status: {status}\n\n```\n{excerpt}\n```\n",
        id = story.id,
        timestamp = Utc::now().to_rfc3339(),
        title = story.title,
        excerpt = truncate_chars(output.trim(), OUTPUT_EXCERPT_CHARS),
    );
    append_text(path, &entry)
}

/// Last `n` lines of the progress log; empty when the log doesn't exist yet.
pub fn progress_tail(path: &Path, n: usize) -> Result<String> {
    read_tail(path, n)
}

// ---------------------------------------------------------------------------
// Guardrails
// ---------------------------------------------------------------------------

/// One learned-failure note, written only after the same story fails twice
/// in a row. The file is append-only; records are never edited or removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailRecord {
    pub story_id: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub failure_count: u64,
    pub issue_summary: String,
}

impl GuardrailRecord {
    pub fn new(story: &Story, failure_count: u64, issue_summary: impl Into<String>) -> Self {
        GuardrailRecord {
            story_id: story.id.clone(),
            title: story.title.clone(),
            timestamp: Utc::now(),
            failure_count,
            issue_summary: issue_summary.into(),
        }
    }
}

pub fn append_guardrail(path: &Path, record: &GuardrailRecord) -> Result<()> {
    write_if_missing(path, b"# Guardrails\n")?;
    let entry = format!(
        "\n## {id}: {title}\n\n- Recorded: {timestamp}\n- Consecutive failures: {count}\n\n{summary}\n",
        id = record.story_id,
        title = record.title,
        timestamp = record.timestamp.to_rfc3339(),
        count = record.failure_count,
        summary = truncate_chars(record.issue_summary.trim(), OUTPUT_EXCERPT_CHARS),
    );
    append_text(path, &entry)
}

/// Full guardrail text, fed back into future prompts for the same backlog.
pub fn load_guardrails(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    Ok(std::fs::read_to_string(path)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
