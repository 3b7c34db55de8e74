use crate::backlog::{Backlog, Story};
use crate::scheduler::StopReason;
use serde::Serialize;

/// Remaining stories listed under "next up".
const NEXT_UP_LIMIT: usize = 3;

// ---------------------------------------------------------------------------
// SessionSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStory {
    pub id: String,
    pub title: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStory {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub stop_reason: StopReason,
    pub duration_seconds: f64,
    pub iterations: u64,
    pub completed: Vec<CompletedStory>,
    pub changed_files: Vec<String>,
    pub total_stories: u64,
    pub completed_stories: u64,
    pub remaining_stories: u64,
    pub next_up: Vec<NextStory>,
}

/// Pure summary over the loop's final bookkeeping. Rendering is the CLI's
/// concern; this only assembles the numbers.
pub fn build_summary(
    stop_reason: StopReason,
    duration_seconds: f64,
    iterations: u64,
    completed: Vec<CompletedStory>,
    changed_files: Vec<String>,
    backlog: &Backlog,
    phase: Option<i64>,
) -> SessionSummary {
    let remaining = backlog.remaining(phase);
    let next_up = next_by_priority(&remaining);
    SessionSummary {
        stop_reason,
        duration_seconds,
        iterations,
        completed,
        changed_files,
        total_stories: backlog.metadata.total_stories,
        completed_stories: backlog.metadata.completed_stories,
        remaining_stories: remaining.len() as u64,
        next_up,
    }
}

fn next_by_priority(remaining: &[&Story]) -> Vec<NextStory> {
    let mut sorted: Vec<&Story> = remaining.to_vec();
    sorted.sort_by_key(|s| s.priority.unwrap_or(i64::MAX));
    sorted
        .iter()
        .take(NEXT_UP_LIMIT)
        .map(|s| NextStory {
            id: s.id.clone(),
            title: s.title.clone(),
            priority: s.priority,
        })
        .collect()
}

/// Render seconds as `2h 14m 9s`, dropping leading zero units.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoryStatus;

    fn backlog() -> Backlog {
        let mut backlog = Backlog {
            stories: Some(vec![
                Story {
                    status: StoryStatus::Complete,
                    ..Story::new("US-001", "done")
                },
                Story {
                    priority: Some(2),
                    ..Story::new("US-002", "later")
                },
                Story {
                    priority: Some(1),
                    ..Story::new("US-003", "sooner")
                },
                Story::new("US-004", "someday"),
                Story::new("US-005", "eventually"),
            ]),
            ..Default::default()
        };
        backlog.touch();
        backlog
    }

    #[test]
    fn summary_counts_and_next_up() {
        let backlog = backlog();
        let summary = build_summary(
            StopReason::MaxIterations,
            61.0,
            4,
            vec![CompletedStory {
                id: "US-001".into(),
                title: "done".into(),
                duration_seconds: 12.5,
            }],
            vec!["src/lib.rs".into()],
            &backlog,
            None,
        );
        assert_eq!(summary.total_stories, 5);
        assert_eq!(summary.completed_stories, 1);
        assert_eq!(summary.remaining_stories, 4);
        // Priority order, capped at three.
        let ids: Vec<_> = summary.next_up.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["US-003", "US-002", "US-004"]);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = build_summary(
            StopReason::BacklogExhausted,
            5.0,
            1,
            vec![],
            vec![],
            &backlog(),
            None,
        );
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["stopReason"], "backlog_exhausted");
        assert!(value["nextUp"].is_array());
        assert_eq!(value["remainingStories"], 4);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(9.4), "9s");
        assert_eq!(format_duration(61.0), "1m 1s");
        assert_eq!(format_duration(8049.0), "2h 14m 9s");
    }
}
