use anyhow::{Context, Result};
use prdloop_core::backlog::Backlog;
use prdloop_core::paths;
use std::path::{Path, PathBuf};

fn load(root: &Path) -> Result<(PathBuf, Backlog)> {
    let path = paths::backlog_path(root);
    let backlog = Backlog::load(&path)
        .with_context(|| format!("could not load backlog {}", path.display()))?;
    Ok((path, backlog))
}

pub fn skip(root: &Path, id: &str) -> Result<()> {
    let (path, mut backlog) = load(root)?;
    backlog.skip_story(id)?;
    backlog.save(&path)?;
    println!("skipped {id}");
    Ok(())
}

pub fn start(root: &Path, id: &str) -> Result<()> {
    let (path, mut backlog) = load(root)?;
    backlog.start_story(id)?;
    backlog.save(&path)?;
    println!("started {id}");
    Ok(())
}

pub fn close_phase(root: &Path, number: i64) -> Result<()> {
    let (path, mut backlog) = load(root)?;
    let skipped = backlog.close_phase(number)?;
    backlog.save(&path)?;
    if skipped.is_empty() {
        println!("phase {number} had no open stories");
    } else {
        println!("closed phase {number}, skipped: {}", skipped.join(", "));
    }
    Ok(())
}

pub fn clear_stale(root: &Path, max_age_hours: i64) -> Result<()> {
    let (path, mut backlog) = load(root)?;
    let reset = backlog.clear_stale_in_progress(max_age_hours);
    backlog.save(&path)?;
    if reset.is_empty() {
        println!("no stale in_progress stories");
    } else {
        println!("reset to incomplete: {}", reset.join(", "));
    }
    Ok(())
}
