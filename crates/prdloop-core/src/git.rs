use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Version-control collaborator. Every operation the loop performs through
/// this trait is best-effort at the call site: the scheduler logs failures
/// and keeps going, so story state never depends on git health.
pub trait Vcs {
    /// Paths changed relative to HEAD (staged, unstaged, and untracked).
    fn changed_files(&self) -> Result<Vec<String>>;

    fn has_changes(&self) -> Result<bool> {
        Ok(!self.changed_files()?.is_empty())
    }

    /// Check out `name`, creating it if it doesn't exist.
    fn ensure_branch(&self, name: &str) -> Result<()>;

    /// Stage everything and commit.
    fn commit_all(&self, message: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// GitClient
// ---------------------------------------------------------------------------

pub struct GitClient {
    root: PathBuf,
}

impl GitClient {
    pub fn new(root: &Path) -> Self {
        GitClient {
            root: root.to_path_buf(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| CoreError::Git(format!("failed to run git: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Git(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{name}")])
            .is_ok()
    }
}

impl Vcs for GitClient {
    fn changed_files(&self) -> Result<Vec<String>> {
        let stdout = self.run(&["status", "--porcelain"])?;
        Ok(stdout
            .lines()
            .filter(|l| l.len() > 3)
            .map(|l| l[3..].trim().to_string())
            .collect())
    }

    fn ensure_branch(&self, name: &str) -> Result<()> {
        let current = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if current.trim() == name {
            return Ok(());
        }
        if self.branch_exists(name) {
            self.run(&["checkout", name])?;
        } else {
            self.run(&["checkout", "-b", name])?;
        }
        Ok(())
    }

    fn commit_all(&self, message: &str) -> Result<()> {
        self.run(&["add", "-A"])?;
        self.run(&["commit", "-m", message])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NoVcs
// ---------------------------------------------------------------------------

/// Inert collaborator for trees without version control (and for tests).
pub struct NoVcs;

impl Vcs for NoVcs {
    fn changed_files(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn ensure_branch(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn commit_all(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
