use crate::backlog::{Backlog, Story};
use crate::types::{Severity, StoryStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ---------------------------------------------------------------------------
// Issue codes
// ---------------------------------------------------------------------------

pub mod codes {
    pub const MISSING_PROJECT: &str = "MISSING_PROJECT";
    pub const MISSING_DESCRIPTION: &str = "MISSING_DESCRIPTION";
    pub const MISSING_STORIES: &str = "MISSING_STORIES";
    pub const EMPTY_STORIES: &str = "EMPTY_STORIES";
    pub const INVALID_PHASE: &str = "INVALID_PHASE";
    pub const MISSING_PHASE_NAME: &str = "MISSING_PHASE_NAME";
    pub const DUPLICATE_ID: &str = "DUPLICATE_ID";
    pub const MISSING_ID: &str = "MISSING_ID";
    pub const MISSING_TITLE: &str = "MISSING_TITLE";
    pub const INVALID_STATUS: &str = "INVALID_STATUS";
    pub const MULTIPLE_IN_PROGRESS: &str = "MULTIPLE_IN_PROGRESS";
    pub const INVALID_PHASE_REF: &str = "INVALID_PHASE_REF";
    pub const MISSING_CRITERIA: &str = "MISSING_CRITERIA";
    pub const MISSING_TYPECHECK: &str = "MISSING_TYPECHECK";
    pub const LARGE_STORY: &str = "LARGE_STORY";
    pub const MANY_CRITERIA: &str = "MANY_CRITERIA";
    pub const INVALID_DEPENDENCY: &str = "INVALID_DEPENDENCY";
    pub const CIRCULAR_DEPENDENCY: &str = "CIRCULAR_DEPENDENCY";
}

const LARGE_DESCRIPTION_CHARS: usize = 500;
const MAX_CRITERIA: usize = 8;

// ---------------------------------------------------------------------------
// ValidationIssue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<i64>,
}

impl ValidationIssue {
    fn error(code: &str, message: impl Into<String>) -> Self {
        ValidationIssue {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
            story_id: None,
            phase: None,
        }
    }

    fn warning(code: &str, message: impl Into<String>) -> Self {
        ValidationIssue {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
            story_id: None,
            phase: None,
        }
    }

    fn for_story(mut self, id: impl Into<String>) -> Self {
        self.story_id = Some(id.into());
        self
    }

    fn for_phase(mut self, number: i64) -> Self {
        self.phase = Some(number);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn has_code(&self, code: &str) -> bool {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .any(|i| i.code == code)
    }

    pub fn count_code(&self, code: &str) -> usize {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(|i| i.code == code)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural and graph validation over a backlog. Pure: never mutates and
/// never fails on malformed-but-parseable input; problems become issues.
/// `valid` is true iff no error-severity issue was produced.
pub fn validate(backlog: &Backlog) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if backlog.project.name.is_empty() {
        warnings.push(ValidationIssue::warning(
            codes::MISSING_PROJECT,
            "Missing project name",
        ));
    }
    if backlog.project.description.is_empty() {
        warnings.push(ValidationIssue::warning(
            codes::MISSING_DESCRIPTION,
            "Missing project description",
        ));
    }

    let Some(stories) = backlog.stories.as_deref() else {
        errors.push(ValidationIssue::error(
            codes::MISSING_STORIES,
            "No stories defined",
        ));
        return finish(errors, warnings);
    };
    if stories.is_empty() {
        errors.push(ValidationIssue::error(
            codes::EMPTY_STORIES,
            "Stories array is empty",
        ));
    }

    for phase in &backlog.phases {
        if phase.number < 1 {
            errors.push(
                ValidationIssue::error(
                    codes::INVALID_PHASE,
                    format!("Phase has invalid number {}", phase.number),
                )
                .for_phase(phase.number),
            );
        }
        if phase.name.is_empty() {
            warnings.push(
                ValidationIssue::warning(
                    codes::MISSING_PHASE_NAME,
                    format!("Phase {} missing name", phase.number),
                )
                .for_phase(phase.number),
            );
        }
    }

    let phase_numbers: HashSet<i64> = backlog.phases.iter().map(|p| p.number).collect();
    let all_ids: HashSet<&str> = stories
        .iter()
        .filter(|s| !s.id.is_empty())
        .map(|s| s.id.as_str())
        .collect();

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut in_progress = 0usize;

    for (index, story) in stories.iter().enumerate() {
        // Placeholder keeps issues attributable when the ID itself is missing.
        let story_ref = if story.id.is_empty() {
            format!("story[{index}]")
        } else {
            story.id.clone()
        };

        if story.id.is_empty() {
            warnings.push(
                ValidationIssue::warning(
                    codes::MISSING_ID,
                    format!("Story at index {index} missing ID"),
                )
                .for_story(&story_ref),
            );
        } else if !seen_ids.insert(story.id.as_str()) {
            // First occurrence is unflagged; each later duplicate is an error.
            errors.push(
                ValidationIssue::error(
                    codes::DUPLICATE_ID,
                    format!("Duplicate story ID: {}", story.id),
                )
                .for_story(&story_ref),
            );
        }

        if story.title.is_empty() {
            errors.push(
                ValidationIssue::error(
                    codes::MISSING_TITLE,
                    format!("Story {story_ref} missing title"),
                )
                .for_story(&story_ref),
            );
        }

        if !story.status.is_valid() {
            errors.push(
                ValidationIssue::error(
                    codes::INVALID_STATUS,
                    format!("Story {story_ref} has invalid status '{}'", story.status),
                )
                .for_story(&story_ref),
            );
        }
        if story.status == StoryStatus::InProgress {
            in_progress += 1;
        }

        if !phase_numbers.is_empty() {
            if let Some(phase) = story.phase {
                if !phase_numbers.contains(&phase) {
                    errors.push(
                        ValidationIssue::error(
                            codes::INVALID_PHASE_REF,
                            format!("Story {story_ref} references undeclared phase {phase}"),
                        )
                        .for_story(&story_ref)
                        .for_phase(phase),
                    );
                }
            }
        }

        if story.acceptance_criteria.is_empty() {
            warnings.push(
                ValidationIssue::warning(
                    codes::MISSING_CRITERIA,
                    format!("Story {story_ref} has no acceptance criteria"),
                )
                .for_story(&story_ref),
            );
        } else if !story
            .acceptance_criteria
            .iter()
            .any(|c| c.to_lowercase().contains("typecheck"))
        {
            warnings.push(
                ValidationIssue::warning(
                    codes::MISSING_TYPECHECK,
                    format!("Story {story_ref} acceptance criteria missing a typecheck check"),
                )
                .for_story(&story_ref),
            );
        }

        if story.description.chars().count() > LARGE_DESCRIPTION_CHARS {
            warnings.push(
                ValidationIssue::warning(
                    codes::LARGE_STORY,
                    format!(
                        "Story {story_ref} description exceeds {LARGE_DESCRIPTION_CHARS} characters"
                    ),
                )
                .for_story(&story_ref),
            );
        }

        if story.acceptance_criteria.len() > MAX_CRITERIA {
            warnings.push(
                ValidationIssue::warning(
                    codes::MANY_CRITERIA,
                    format!("Story {story_ref} has more than {MAX_CRITERIA} acceptance criteria"),
                )
                .for_story(&story_ref),
            );
        }

        for dep in &story.dependencies {
            if !all_ids.contains(dep.as_str()) {
                errors.push(
                    ValidationIssue::error(
                        codes::INVALID_DEPENDENCY,
                        format!("Story {story_ref} depends on unknown story {dep}"),
                    )
                    .for_story(&story_ref),
                );
            }
        }
    }

    if in_progress > 1 {
        warnings.push(ValidationIssue::warning(
            codes::MULTIPLE_IN_PROGRESS,
            format!("{in_progress} stories are in_progress simultaneously"),
        ));
    }

    if let Some(cycle) = find_cycle(stories) {
        errors.push(
            ValidationIssue::error(
                codes::CIRCULAR_DEPENDENCY,
                format!("Circular dependency detected: {}", cycle.join(" → ")),
            )
            .for_story(cycle[0].clone()),
        );
    }

    finish(errors, warnings)
}

fn finish(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> ValidationReport {
    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Depth-first search over the declared dependency graph. Returns the first
/// cycle found as the slice of the recursion path from the first occurrence
/// of the repeated node through its repetition, inclusive. At most one cycle
/// is ever reported per validation pass.
fn find_cycle(stories: &[Story]) -> Option<Vec<String>> {
    let deps: HashMap<&str, &[String]> = stories
        .iter()
        .filter(|s| !s.id.is_empty())
        .map(|s| (s.id.as_str(), s.dependencies.as_slice()))
        .collect();

    let mut visited: HashSet<String> = HashSet::new();
    for story in stories {
        if story.id.is_empty() {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = dfs(&story.id, &deps, &mut visited, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn dfs(
    id: &str,
    deps: &HashMap<&str, &[String]>,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|p| p == id) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(id.to_string());
        return Some(cycle);
    }
    if visited.contains(id) {
        return None;
    }
    visited.insert(id.to_string());
    path.push(id.to_string());
    if let Some(children) = deps.get(id) {
        for child in *children {
            if let Some(cycle) = dfs(child, deps, visited, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
