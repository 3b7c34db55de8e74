use crate::output;
use anyhow::{Context, Result};
use prdloop_core::backlog::Backlog;
use prdloop_core::paths;
use prdloop_core::types::StoryStatus;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PhaseCounts {
    number: Option<i64>,
    name: String,
    total: u64,
    complete: u64,
    in_progress: u64,
    incomplete: u64,
    skipped: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    project: String,
    total_stories: u64,
    completed_stories: u64,
    current_iteration: u64,
    phases: Vec<PhaseCounts>,
}

pub fn run(root: &Path, json: bool) -> Result<()> {
    let path = paths::backlog_path(root);
    let backlog = Backlog::load(&path)
        .with_context(|| format!("could not load backlog {}", path.display()))?;

    let view = build_view(&backlog);
    if json {
        return output::print_json(&view);
    }

    println!("{}", view.project);
    println!(
        "{}/{} stories complete, iteration {}",
        view.completed_stories, view.total_stories, view.current_iteration
    );
    println!();
    let rows = view
        .phases
        .iter()
        .map(|p| {
            vec![
                p.number.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                p.name.clone(),
                p.total.to_string(),
                p.complete.to_string(),
                p.in_progress.to_string(),
                p.incomplete.to_string(),
                p.skipped.to_string(),
            ]
        })
        .collect();
    output::print_table(
        &["phase", "name", "total", "complete", "in_progress", "incomplete", "skipped"],
        rows,
    );
    Ok(())
}

fn build_view(backlog: &Backlog) -> StatusView {
    let mut phases: Vec<PhaseCounts> = backlog
        .phases
        .iter()
        .map(|p| PhaseCounts {
            number: Some(p.number),
            name: p.name.clone(),
            ..Default::default()
        })
        .collect();
    let mut unphased = PhaseCounts {
        number: None,
        name: "(no phase)".into(),
        ..Default::default()
    };

    for story in backlog.stories() {
        let counts = story
            .phase
            .and_then(|n| phases.iter_mut().find(|p| p.number == Some(n)))
            .unwrap_or(&mut unphased);
        counts.total += 1;
        match story.status {
            StoryStatus::Complete => counts.complete += 1,
            StoryStatus::InProgress => counts.in_progress += 1,
            StoryStatus::Skipped => counts.skipped += 1,
            _ => counts.incomplete += 1,
        }
    }
    if unphased.total > 0 {
        phases.push(unphased);
    }

    StatusView {
        project: backlog.project.name.clone(),
        total_stories: backlog.stories().len() as u64,
        completed_stories: backlog
            .stories()
            .iter()
            .filter(|s| s.status == StoryStatus::Complete)
            .count() as u64,
        current_iteration: backlog.metadata.current_iteration,
        phases,
    }
}
