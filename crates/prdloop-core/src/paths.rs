use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PRDLOOP_DIR: &str = ".prdloop";

pub const CONFIG_FILE: &str = ".prdloop/config.json";
pub const BACKLOG_FILE: &str = ".prdloop/prd.json";
pub const PROGRESS_FILE: &str = ".prdloop/progress.md";
pub const GUARDRAILS_FILE: &str = ".prdloop/guardrails.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn prdloop_dir(root: &Path) -> PathBuf {
    root.join(PRDLOOP_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn backlog_path(root: &Path) -> PathBuf {
    root.join(BACKLOG_FILE)
}

pub fn progress_path(root: &Path) -> PathBuf {
    root.join(PROGRESS_FILE)
}

pub fn guardrails_path(root: &Path) -> PathBuf {
    root.join(GUARDRAILS_FILE)
}

/// Error unless `root` holds a `.prdloop/` directory.
pub fn require_initialized(root: &Path) -> Result<()> {
    if prdloop_dir(root).is_dir() {
        Ok(())
    } else {
        Err(CoreError::NotInitialized)
    }
}

/// Walk upward from `start` looking for an initialized project root
/// (a directory containing `.prdloop/`). Falls back to the first ancestor
/// holding a `.git` directory, then to `start` itself.
pub fn resolve_root(start: &Path) -> PathBuf {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(PRDLOOP_DIR).is_dir() {
            return d.to_path_buf();
        }
        dir = d.parent();
    }
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(".git").is_dir() {
            return d.to_path_buf();
        }
        dir = d.parent();
    }
    start.to_path_buf()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
