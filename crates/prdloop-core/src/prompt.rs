use crate::backlog::{Backlog, Story};
use crate::types::StoryStatus;
use std::fmt::Write;
use std::path::Path;

/// Prose summary of completed work, grouped by phase when phases exist.
/// Fed to the agent so it builds on prior stories instead of redoing them.
pub fn completed_summary(backlog: &Backlog) -> String {
    let completed: Vec<&Story> = backlog
        .stories()
        .iter()
        .filter(|s| s.status == StoryStatus::Complete)
        .collect();
    if completed.is_empty() {
        return "No stories completed yet.".to_string();
    }

    let mut out = String::new();
    if backlog.phases.is_empty() {
        for story in &completed {
            let _ = writeln!(out, "- {}: {}", story.id, story.title);
        }
    } else {
        for phase in &backlog.phases {
            let in_phase: Vec<&&Story> = completed
                .iter()
                .filter(|s| s.phase == Some(phase.number))
                .collect();
            if in_phase.is_empty() {
                continue;
            }
            let _ = writeln!(out, "Phase {} ({}):", phase.number, phase.name);
            for story in in_phase {
                let _ = writeln!(out, "- {}: {}", story.id, story.title);
            }
        }
        let unphased: Vec<&&Story> = completed.iter().filter(|s| s.phase.is_none()).collect();
        if !unphased.is_empty() {
            let _ = writeln!(out, "Unphased:");
            for story in unphased {
                let _ = writeln!(out, "- {}: {}", story.id, story.title);
            }
        }
    }
    out.trim_end().to_string()
}

/// Assemble the delegation prompt for one story.
pub fn build_story_prompt(
    story: &Story,
    backlog: &Backlog,
    progress_tail: &str,
    guardrails: &str,
    workdir: &Path,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are implementing one story from a product backlog, working in {}.",
        workdir.display()
    );
    let _ = writeln!(prompt, "\n# Story {}: {}", story.id, story.title);
    if !story.description.is_empty() {
        let _ = writeln!(prompt, "\n{}", story.description);
    }
    if !story.acceptance_criteria.is_empty() {
        let _ = writeln!(prompt, "\n## Acceptance criteria");
        for criterion in &story.acceptance_criteria {
            let _ = writeln!(prompt, "- {criterion}");
        }
    }
    if !story.notes.is_empty() {
        let _ = writeln!(prompt, "\n## Notes\n{}", story.notes);
    }

    let _ = writeln!(prompt, "\n## Completed so far\n{}", completed_summary(backlog));

    if !progress_tail.is_empty() {
        let _ = writeln!(prompt, "\n## Recent progress log\n{progress_tail}");
    }
    if !guardrails.is_empty() {
        let _ = writeln!(
            prompt,
            "\n## Guardrails from previous failed attempts\n{guardrails}"
        );
    }

    let _ = writeln!(
        prompt,
        "\nImplement only this story. Satisfy every acceptance criterion, keep the working tree compiling, and stop when the story is done."
    );
    prompt
}
