use crate::backlog::{Backlog, Story};
use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Advisory text references
// ---------------------------------------------------------------------------

static STORY_ID_RE: OnceLock<Regex> = OnceLock::new();

fn story_id_re() -> &'static Regex {
    STORY_ID_RE.get_or_init(|| Regex::new(r"\b[A-Z]+-\d+\b").unwrap())
}

/// Scan a story's free-text fields for references to other story IDs.
///
/// This is the advisory ordering heuristic only; it is deliberately separate
/// from the declared `dependencies` list the validator checks. A backlog with
/// no declared dependencies still gets sensible ordering when stories mention
/// each other by ID in prose.
pub fn referenced_story_ids(story: &Story) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for field in story.text_fields() {
        for m in story_id_re().find_iter(field) {
            let id = m.as_str();
            if id != story.id && seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

// ---------------------------------------------------------------------------
// Heuristic selection
// ---------------------------------------------------------------------------

/// Pick the next story from pre-filtered candidates (neither complete nor
/// skipped). Sort by priority (missing sorts last), prefer the first
/// candidate whose advisory references are all terminal, and fall back to
/// the first by priority so selection never stalls on an unsatisfiable
/// heuristic.
pub fn select_heuristic<'a>(candidates: &[&'a Story], backlog: &Backlog) -> Option<&'a Story> {
    if candidates.is_empty() {
        return None;
    }

    let mut sorted: Vec<&Story> = candidates.to_vec();
    sorted.sort_by_key(|s| s.priority.unwrap_or(i64::MAX));

    for story in &sorted {
        if references_satisfied(story, backlog) {
            return Some(*story);
        }
    }
    debug!("all candidates blocked by advisory references, taking first by priority");
    Some(sorted[0])
}

/// A referenced story blocks selection only if it exists in the backlog and
/// is not yet terminal; dangling references never block.
fn references_satisfied(story: &Story, backlog: &Backlog) -> bool {
    referenced_story_ids(story).iter().all(|id| {
        backlog
            .story(id)
            .map(|s| s.status.is_terminal())
            .unwrap_or(true)
    })
}

// ---------------------------------------------------------------------------
// Advisor delegation
// ---------------------------------------------------------------------------

/// Reply expected from an external selection advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorChoice {
    pub selected_story_id: String,
    #[serde(default)]
    pub reasoning: String,
}

/// External advisory selector. Implementations may call out to an agent;
/// any failure simply routes selection back to the heuristic.
pub trait Advisor {
    fn choose(
        &self,
        candidates: &[&Story],
        completed_ids: &[String],
        tree_summary: &str,
    ) -> Result<AdvisorChoice>;
}

/// Full selection: consult the advisor when present, validate its reply
/// against the candidate set, and fall back to the heuristic on any
/// failure. Total for non-empty candidates.
pub fn select_story<'a>(
    candidates: &[&'a Story],
    backlog: &Backlog,
    advisor: Option<&dyn Advisor>,
    tree_summary: &str,
) -> Option<&'a Story> {
    if candidates.is_empty() {
        return None;
    }

    if let Some(advisor) = advisor {
        let completed = backlog.terminal_ids();
        match advisor.choose(candidates, &completed, tree_summary) {
            Ok(choice) => {
                if let Some(story) = candidates
                    .iter()
                    .copied()
                    .find(|s| s.id == choice.selected_story_id)
                {
                    debug!(story = %story.id, reasoning = %choice.reasoning, "advisor selected story");
                    return Some(story);
                }
                warn!(
                    id = %choice.selected_story_id,
                    "advisor returned unknown story ID, falling back to heuristic"
                );
            }
            Err(e) => {
                warn!(error = %e, "advisor failed, falling back to heuristic");
            }
        }
    }

    select_heuristic(candidates, backlog)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
