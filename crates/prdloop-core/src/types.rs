use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// StoryStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a story.
///
/// The `Unknown` variant carries any out-of-enum string found in a backlog
/// document: a malformed status must parse (so the validator can report it
/// as an issue) and must round-trip unchanged on save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum StoryStatus {
    #[default]
    Incomplete,
    InProgress,
    Complete,
    Skipped,
    Unknown(String),
}

impl StoryStatus {
    pub fn known() -> &'static [StoryStatus] {
        &[
            StoryStatus::Incomplete,
            StoryStatus::InProgress,
            StoryStatus::Complete,
            StoryStatus::Skipped,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            StoryStatus::Incomplete => "incomplete",
            StoryStatus::InProgress => "in_progress",
            StoryStatus::Complete => "complete",
            StoryStatus::Skipped => "skipped",
            StoryStatus::Unknown(s) => s,
        }
    }

    pub fn parse(s: &str) -> StoryStatus {
        match s {
            "incomplete" => StoryStatus::Incomplete,
            "in_progress" => StoryStatus::InProgress,
            "complete" => StoryStatus::Complete,
            "skipped" => StoryStatus::Skipped,
            other => StoryStatus::Unknown(other.to_string()),
        }
    }

    /// Terminal states are never reselected by the loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoryStatus::Complete | StoryStatus::Skipped)
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, StoryStatus::Unknown(_))
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StoryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StoryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatusVisitor;

        impl Visitor<'_> for StatusVisitor {
            type Value = StoryStatus;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a story status string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StoryStatus, E> {
                Ok(StoryStatus::parse(v))
            }
        }

        deserializer.deserialize_str(StatusVisitor)
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// GateStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    Pass,
    Fail,
}

impl GateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GateStatus::Pass => "PASS",
            GateStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
