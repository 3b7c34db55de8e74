use crate::output;
use anyhow::{bail, Context, Result};
use prdloop_core::backlog::Backlog;
use prdloop_core::paths;
use prdloop_core::validate::validate;
use std::path::Path;

pub fn run(root: &Path, backlog: Option<&Path>, strict: bool, json: bool) -> Result<()> {
    let path = backlog
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths::backlog_path(root));
    let backlog = Backlog::load(&path)
        .with_context(|| format!("could not load backlog {}", path.display()))?;

    let report = validate(&backlog);
    if json {
        output::print_json(&report)?;
    } else {
        output::print_validation(&report);
    }

    if !report.valid {
        bail!("backlog invalid: {} error(s)", report.errors.len());
    }
    if strict && !report.warnings.is_empty() {
        bail!(
            "backlog has {} warning(s) (strict mode)",
            report.warnings.len()
        );
    }
    Ok(())
}
