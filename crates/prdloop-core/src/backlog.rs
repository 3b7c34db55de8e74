use crate::error::{CoreError, Result};
use crate::io::atomic_write;
use crate::types::StoryStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub branch_identifier: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Optional story grouping. Phases are only ever added or relabeled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDef {
    #[serde(default)]
    pub number: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<i64>,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<DateTime<Utc>>,
    /// Seconds from `started_at` to completion; stamped by the loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_number: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Story {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Story {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// All free-text fields, in document order. The advisory dependency
    /// heuristic scans these for references to other story IDs.
    pub fn text_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.id.as_str(),
            self.title.as_str(),
            self.description.as_str(),
            self.notes.as_str(),
        ];
        fields.extend(self.acceptance_criteria.iter().map(String::as_str));
        fields
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Derived counters plus bookkeeping. `total_stories` and `completed_stories`
/// are recomputed on every save, never hand-edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub total_stories: u64,
    #[serde(default)]
    pub completed_stories: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_iteration: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Backlog
// ---------------------------------------------------------------------------

/// The full structured document for one project.
///
/// `stories` is `Option` so a document lacking the array entirely can be
/// represented; the validator reports it as an issue instead of this type
/// failing to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backlog {
    #[serde(default)]
    pub project: Project,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stories: Option<Vec<Story>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Backlog {
    pub fn load(path: &Path) -> Result<Backlog> {
        if !path.exists() {
            return Err(CoreError::BacklogNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let backlog: Backlog = serde_json::from_str(&data)?;
        Ok(backlog)
    }

    /// Recompute derived metadata and atomically overwrite the file.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.touch();
        let data = serde_json::to_vec_pretty(&*self)?;
        atomic_write(path, &data)?;
        Ok(())
    }

    /// Refresh derived counters and the last-updated timestamp.
    pub fn touch(&mut self) {
        self.metadata.total_stories = self.stories().len() as u64;
        self.metadata.completed_stories = self
            .stories()
            .iter()
            .filter(|s| s.status == StoryStatus::Complete)
            .count() as u64;
        self.metadata.last_updated_at = Some(Utc::now());
    }

    pub fn stories(&self) -> &[Story] {
        self.stories.as_deref().unwrap_or(&[])
    }

    pub fn stories_mut(&mut self) -> &mut Vec<Story> {
        self.stories.get_or_insert_with(Vec::new)
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories().iter().find(|s| s.id == id)
    }

    pub fn story_mut(&mut self, id: &str) -> Option<&mut Story> {
        self.stories_mut().iter_mut().find(|s| s.id == id)
    }

    pub fn phase(&self, number: i64) -> Option<&PhaseDef> {
        self.phases.iter().find(|p| p.number == number)
    }

    /// IDs of stories in a terminal state (complete or skipped).
    pub fn terminal_ids(&self) -> Vec<String> {
        self.stories()
            .iter()
            .filter(|s| s.status.is_terminal())
            .map(|s| s.id.clone())
            .collect()
    }

    /// Stories still selectable by the loop, optionally limited to one phase.
    pub fn remaining(&self, phase: Option<i64>) -> Vec<&Story> {
        self.stories()
            .iter()
            .filter(|s| !s.status.is_terminal())
            .filter(|s| phase.is_none() || s.phase == phase)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Maintenance operations
    // -----------------------------------------------------------------------

    /// Mark a story in_progress and stamp `started_at`. Terminal stories
    /// cannot be restarted.
    pub fn start_story(&mut self, id: &str) -> Result<()> {
        let story = self
            .story_mut(id)
            .ok_or_else(|| CoreError::StoryNotFound(id.to_string()))?;
        if story.status.is_terminal() {
            return Err(CoreError::InvalidStatus(format!(
                "{id} is already {}",
                story.status
            )));
        }
        story.status = StoryStatus::InProgress;
        story.started_at = Some(Utc::now());
        Ok(())
    }

    /// Skip a single story. Terminal; the loop never reselects it.
    pub fn skip_story(&mut self, id: &str) -> Result<()> {
        let story = self
            .story_mut(id)
            .ok_or_else(|| CoreError::StoryNotFound(id.to_string()))?;
        story.status = StoryStatus::Skipped;
        story.skipped_at = Some(Utc::now());
        Ok(())
    }

    /// Skip every non-terminal story in a phase. Returns the skipped IDs.
    pub fn close_phase(&mut self, number: i64) -> Result<Vec<String>> {
        if self.phase(number).is_none() {
            return Err(CoreError::PhaseNotFound(number));
        }
        let now = Utc::now();
        let mut skipped = Vec::new();
        for story in self.stories_mut() {
            if story.phase == Some(number) && !story.status.is_terminal() {
                story.status = StoryStatus::Skipped;
                story.skipped_at = Some(now);
                skipped.push(story.id.clone());
            }
        }
        Ok(skipped)
    }

    /// Reset in_progress stories older than `max_age_hours` back to
    /// incomplete. Returns the reset IDs.
    pub fn clear_stale_in_progress(&mut self, max_age_hours: i64) -> Vec<String> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut reset = Vec::new();
        for story in self.stories_mut() {
            if story.status != StoryStatus::InProgress {
                continue;
            }
            let stale = match story.started_at {
                Some(t) => t < cutoff,
                None => true,
            };
            if stale {
                story.status = StoryStatus::Incomplete;
                story.started_at = None;
                reset.push(story.id.clone());
            }
        }
        reset
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
