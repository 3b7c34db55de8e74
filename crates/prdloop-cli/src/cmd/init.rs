use anyhow::{Context, Result};
use chrono::Utc;
use prdloop_core::backlog::{Backlog, Project};
use prdloop_core::config::Config;
use prdloop_core::detect::{detect_gates, detect_kind};
use prdloop_core::io::{ensure_dir, write_if_missing};
use prdloop_core::{paths, progress};
use std::path::Path;

pub fn run(root: &Path, detect: bool) -> Result<()> {
    ensure_dir(&paths::prdloop_dir(root)).context("failed to create .prdloop/")?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("config exists: {}", config_path.display());
    } else {
        let mut config = Config::default();
        if detect {
            let kind = detect_kind(root);
            config.gates = detect_gates(root);
            println!(
                "detected {} project, {} gate(s)",
                kind,
                config.gates.len()
            );
        }
        config.save(root).context("failed to write config")?;
        println!("created {}", config_path.display());
    }

    let backlog_path = paths::backlog_path(root);
    if backlog_path.exists() {
        println!("backlog exists: {}", backlog_path.display());
    } else {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut backlog = Backlog {
            project: Project {
                name,
                ..Default::default()
            },
            stories: Some(Vec::new()),
            ..Default::default()
        };
        backlog.metadata.created_at = Some(Utc::now());
        backlog.save(&backlog_path).context("failed to write backlog")?;
        println!("created {} (add stories before running)", backlog_path.display());
    }

    progress::init_progress(&paths::progress_path(root))?;
    write_if_missing(&paths::guardrails_path(root), b"# Guardrails\n")?;

    Ok(())
}
