mod agent;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "prdloop",
    about = "Autonomous build-from-backlog loop — stories in, verified commits out",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .prdloop/ or .git/)
    #[arg(long, global = true, env = "PRDLOOP_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Verbose logging
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize prdloop in the current project
    Init {
        /// Detect the toolchain and seed quality gates from it
        #[arg(long)]
        detect: bool,
    },

    /// Validate the backlog structure and dependency graph
    Validate {
        /// Backlog file (default: .prdloop/prd.json)
        #[arg(long)]
        backlog: Option<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Show backlog progress by phase
    Status,

    /// Run the iteration loop until the backlog is done or a budget is hit
    Run {
        /// Backlog file (default: .prdloop/prd.json)
        #[arg(long)]
        backlog: Option<PathBuf>,

        /// Override the configured iteration cap (0 = unlimited)
        #[arg(long)]
        max_iterations: Option<u64>,

        /// Only select stories from this phase
        #[arg(long)]
        phase: Option<i64>,

        /// Let the agent pick the next story instead of the heuristic
        #[arg(long)]
        advisor: bool,
    },

    /// Skip a story (terminal; it is never selected again)
    Skip { id: String },

    /// Mark a story in_progress
    Start { id: String },

    /// Skip every open story in a phase
    ClosePhase { number: i64 },

    /// Reset in_progress stories older than the age limit
    ClearStale {
        /// Age limit in hours
        #[arg(long, default_value = "24")]
        max_age_hours: i64,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = match cli.root {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            prdloop_core::paths::resolve_root(&cwd)
        }
    };

    let result = match cli.command {
        Commands::Init { detect } => cmd::init::run(&root, detect),
        Commands::Validate { backlog, strict } => {
            cmd::validate::run(&root, backlog.as_deref(), strict, cli.json)
        }
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Run {
            backlog,
            max_iterations,
            phase,
            advisor,
        } => cmd::run::run(&root, backlog.as_deref(), max_iterations, phase, advisor, cli.json),
        Commands::Skip { id } => cmd::story::skip(&root, &id),
        Commands::Start { id } => cmd::story::start(&root, &id),
        Commands::ClosePhase { number } => cmd::story::close_phase(&root, number),
        Commands::ClearStale { max_age_hours } => cmd::story::clear_stale(&root, max_age_hours),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
