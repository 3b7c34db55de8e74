use prdloop_core::report::{format_duration, SessionSummary};
use prdloop_core::validate::ValidationReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

/// Errors first, then warnings, one issue per line.
pub fn print_validation(report: &ValidationReport) {
    for issue in &report.errors {
        match &issue.story_id {
            Some(id) => println!("error [{}] {} ({})", issue.code, issue.message, id),
            None => println!("error [{}] {}", issue.code, issue.message),
        }
    }
    for issue in &report.warnings {
        match &issue.story_id {
            Some(id) => println!("warning [{}] {} ({})", issue.code, issue.message, id),
            None => println!("warning [{}] {}", issue.code, issue.message),
        }
    }
    if report.valid && report.warnings.is_empty() {
        println!("backlog is valid");
    }
}

/// Top files shown in the session summary.
const CHANGED_FILES_LIMIT: usize = 10;

pub fn print_summary(summary: &SessionSummary) {
    println!();
    println!("Session finished: {}", summary.stop_reason);
    println!(
        "  duration: {}  iterations: {}",
        format_duration(summary.duration_seconds),
        summary.iterations
    );
    println!(
        "  stories: {}/{} complete, {} remaining",
        summary.completed_stories, summary.total_stories, summary.remaining_stories
    );

    if !summary.completed.is_empty() {
        println!("\nCompleted this session:");
        for story in &summary.completed {
            println!(
                "  {} - {} ({})",
                story.id,
                story.title,
                format_duration(story.duration_seconds)
            );
        }
    }

    if !summary.changed_files.is_empty() {
        println!("\nChanged files ({}):", summary.changed_files.len());
        for file in summary.changed_files.iter().take(CHANGED_FILES_LIMIT) {
            println!("  {file}");
        }
        if summary.changed_files.len() > CHANGED_FILES_LIMIT {
            println!(
                "  … and {} more",
                summary.changed_files.len() - CHANGED_FILES_LIMIT
            );
        }
    }

    if !summary.next_up.is_empty() {
        println!("\nNext up:");
        for story in &summary.next_up {
            println!("  {} - {}", story.id, story.title);
        }
    }
}
