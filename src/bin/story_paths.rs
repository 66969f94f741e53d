//! Story path categorizer.
//!
//! Enumerates every route through a story graph, categorizes each against
//! the validation cache, rewrites the cache and prints a JSON report.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! story_paths story.json validation_cache.json --mode modified --source-dir src
//! ```
//!
//! Exit codes: 0 success, 1 bad input, 2 cache write failure, 130 cancelled.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use story_path_kernel::{
    CancellationFlag, CategoryMode, GitCli, HistorySource, NoHistory, PassageIndex, PathPipeline,
    PathPolicy, PipelineError, StoryGraph, ValidationCache,
};

#[derive(Parser)]
#[command(name = "story_paths")]
#[command(about = "Enumerate story paths and categorize them against the validation cache")]
struct Cli {
    /// Story graph JSON produced by the parser
    graph: PathBuf,

    /// Validation cache file (created if missing)
    cache: PathBuf,

    /// Revisits allowed per passage on one route
    #[arg(long, default_value = "1")]
    max_cycles: usize,

    /// Categories forwarded downstream: new-only, modified or all
    #[arg(long, default_value = "all")]
    mode: CategoryMode,

    /// Repository root git runs in
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Directory of Twee sources used to map passages to files
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Timeout for each git query, in milliseconds
    #[arg(long, default_value = "5000")]
    git_timeout_ms: u64,

    /// Concurrent git queries (1-8)
    #[arg(long, default_value = "4")]
    git_concurrency: usize,

    /// Skip git history entirely
    #[arg(long)]
    no_git: bool,

    /// Write the report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Categorize and report without rewriting the cache
    #[arg(long)]
    dry_run: bool,
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "story_paths=info,story_path_kernel=info".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .flatten_event(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        graph = %cli.graph.display(),
        cache = %cli.cache.display(),
        mode = %cli.mode,
        "Starting story path categorization"
    );

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received Ctrl+C, cancelling run");
                cancel.cancel();
            }
        });
    }

    let policy = PathPolicy::new(
        cli.max_cycles,
        PathPolicy::default().similarity_threshold,
        cli.git_timeout_ms,
        cli.git_concurrency,
    );

    let result = if cli.no_git {
        execute(&cli, Arc::new(NoHistory), policy, &cancel).await
    } else {
        let git = GitCli::new(&cli.repo_root, policy.git_timeout());
        execute(&cli, Arc::new(git), policy, &cancel).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunFailure::Pipeline(PipelineError::Cancelled)) => {
            warn!("Run cancelled, cache left untouched");
            ExitCode::from(130)
        }
        Err(RunFailure::Pipeline(PipelineError::Cache(e))) => {
            error!(error = %e, "Failed to write validation cache");
            ExitCode::from(2)
        }
        Err(RunFailure::Pipeline(e)) => {
            error!(error = %e, "Run failed");
            ExitCode::from(1)
        }
        Err(RunFailure::Input(message)) => {
            error!(error = %message, "Invalid input");
            ExitCode::from(1)
        }
        Err(RunFailure::Output(e)) => {
            error!(error = %e, "Failed to write report");
            ExitCode::from(1)
        }
    }
}

enum RunFailure {
    Pipeline(PipelineError),
    Input(String),
    Output(std::io::Error),
}

impl From<PipelineError> for RunFailure {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

async fn execute<H: HistorySource + 'static>(
    cli: &Cli,
    source: Arc<H>,
    policy: PathPolicy,
    cancel: &CancellationFlag,
) -> Result<(), RunFailure> {
    let graph = StoryGraph::load(&cli.graph).map_err(PipelineError::from)?;
    let dangling = graph.dangling_links().len();
    if dangling > 0 {
        warn!(dangling, "graph has links to missing passages");
    }

    let mut index = match &cli.source_dir {
        Some(dir) => PassageIndex::scan(&cli.repo_root, &resolve(&cli.repo_root, dir))
            .map_err(|e| RunFailure::Input(e.to_string()))?,
        None => PassageIndex::new(),
    };
    index.merge_graph_hints(&graph);
    if index.is_empty() && !cli.no_git {
        warn!("no passage source files known, git enrichment will be empty");
    }

    let cache = ValidationCache::load(&cli.cache);
    let pipeline = PathPipeline::new(source, policy, index);
    let mut outcome = pipeline.run(&graph, &cache, cancel).await?;

    cancel.check()?;
    if cli.dry_run {
        info!("Dry run, cache not written");
    } else {
        outcome
            .save_cache(&cli.cache, chrono::Utc::now())
            .map_err(PipelineError::from)?;
    }

    let report = outcome.report(cli.mode);
    let mut json = serde_json::to_string_pretty(&report).map_err(PipelineError::from)?;
    json.push('\n');
    match &cli.output {
        Some(path) => std::fs::write(path, json).map_err(RunFailure::Output)?,
        None => std::io::stdout()
            .write_all(json.as_bytes())
            .map_err(RunFailure::Output)?,
    }
    Ok(())
}

fn resolve(root: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}
