mod app;
mod cmd_analyze;
mod cmd_ingest;
mod cmd_stats;
mod cmd_sweep;
mod cmd_verify;
mod cmd_watch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repowatch", version, about = "Repository mining and health scoring")]
struct Cli {
    /// YAML config file (default: <workdir>/config.yaml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the working directory
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the watchlist
    Watch {
        #[command(subcommand)]
        cmd: WatchCmd,
    },
    /// Clone or refresh a repository and log its new commits
    Ingest {
        /// Repository as owner/repo
        repo: String,
    },
    /// Show contributor and repository statistics
    Stats {
        repo: String,
        /// Number of contributors to show
        #[arg(long, default_value = "10")]
        top: usize,
        #[arg(long)]
        json: bool,
    },
    /// Score the repository's health over its logged history
    Analyze {
        repo: String,
        /// Score only the newest logged commit
        #[arg(long)]
        current: bool,
    },
    /// Run the full pipeline for one repository
    Check { repo: String },
    /// Run a sweep over every ready watchlist entry
    Sweep,
    /// Verify the hash chain of a repository's event log
    Verify { repo: String },
}

#[derive(Subcommand)]
enum WatchCmd {
    /// Add or update a repository
    Add {
        /// Repository as owner/repo
        repo: String,
        #[arg(long, default_value = "main")]
        branch: String,
        /// ready, pending or disabled
        #[arg(long, default_value = "ready")]
        status: String,
    },
    /// List watched repositories
    List {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repowatch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let app = app::App::open(cli.config.as_deref(), cli.workdir)?;

    match cli.cmd {
        Command::Watch { cmd } => match cmd {
            WatchCmd::Add {
                repo,
                branch,
                status,
            } => cmd_watch::add(&app, &repo, &branch, &status),
            WatchCmd::List { json } => cmd_watch::list(&app, json),
        },
        Command::Ingest { repo } => cmd_ingest::execute(&app, &repo).await,
        Command::Stats { repo, top, json } => cmd_stats::execute(&app, &repo, top, json),
        Command::Analyze { repo, current } => cmd_analyze::execute(&app, &repo, current).await,
        Command::Check { repo } => cmd_sweep::check(&app, &repo).await,
        Command::Sweep => cmd_sweep::execute(&app).await,
        Command::Verify { repo } => cmd_verify::execute(&app, &repo),
    }
}
