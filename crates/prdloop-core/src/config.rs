use crate::error::Result;
use crate::gate::GateDefinition;
use crate::io::atomic_write;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Typed configuration, loaded once at startup from `.prdloop/config.json`.
/// A missing file yields the defaults; unknown keys are rejected at load so
/// typos surface immediately instead of silently doing nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub agent: AgentConfig,
    pub limits: LoopLimits,
    pub git: GitConfig,
    pub gates: Vec<GateDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: 1,
            agent: AgentConfig::default(),
            limits: LoopLimits::default(),
            git: GitConfig::default(),
            gates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Executable invoked to implement a story.
    pub executable: String,
    pub model: String,
    /// Pass the agent's skip-confirmation flag; required for unattended runs.
    pub skip_confirmations: bool,
    /// Deadline for one delegation; exceeding it counts as a failure.
    pub iteration_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            executable: "claude".into(),
            model: String::new(),
            skip_confirmations: true,
            iteration_timeout_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LoopLimits {
    /// 0 means unlimited.
    pub max_iterations: u64,
    /// Consecutive failures before the loop stops.
    pub max_failures: u64,
    /// Back-pressure pause between iterations.
    pub pause_seconds: u64,
}

impl Default for LoopLimits {
    fn default() -> Self {
        LoopLimits {
            max_iterations: 20,
            max_failures: 3,
            pause_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GitConfig {
    pub auto_commit: bool,
    /// `{story_id}` and `{story_title}` are substituted at commit time.
    pub commit_message_format: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        GitConfig {
            auto_commit: true,
            commit_message_format: "feat: {story_id} - {story_title}".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

impl Config {
    pub fn load(root: &Path) -> Result<Config> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Config::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        atomic_write(&paths::config_path(root), &data)?;
        Ok(())
    }

    pub fn commit_message(&self, story_id: &str, story_title: &str) -> String {
        self.git
            .commit_message_format
            .replace("{story_id}", story_id)
            .replace("{story_title}", story_title)
    }

    /// Non-fatal sanity checks, reported at startup.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.agent.executable.is_empty() {
            warnings.push(ConfigWarning::new("agent.executable is empty"));
        }
        if self.agent.iteration_timeout_seconds == 0 {
            warnings.push(ConfigWarning::new(
                "agent.iterationTimeoutSeconds is 0; every delegation will time out",
            ));
        }
        if self.limits.max_failures == 0 {
            warnings.push(ConfigWarning::new(
                "limits.maxFailures is 0; the loop will stop before the first iteration",
            ));
        }
        let mut names = std::collections::HashSet::new();
        for gate in &self.gates {
            if gate.command.is_empty() {
                warnings.push(ConfigWarning::new(format!(
                    "gate '{}' has an empty command",
                    gate.name
                )));
            }
            if gate.timeout_seconds == 0 {
                warnings.push(ConfigWarning::new(format!(
                    "gate '{}' has a zero timeout",
                    gate.name
                )));
            }
            if !names.insert(gate.name.as_str()) {
                warnings.push(ConfigWarning::new(format!(
                    "duplicate gate name '{}'",
                    gate.name
                )));
            }
        }
        warnings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigWarning {
    pub message: String,
}

impl ConfigWarning {
    fn new(message: impl Into<String>) -> Self {
        ConfigWarning {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
