// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedstock_tick::migrator::NameStamp;
use feedstock_tick::{
    plan_migrations, run_migration, DependencyGraph, Error, FeedstockContext, MigrationConfig,
    MigrationOutcome, Migrator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "feedstock-tick")]
#[command(author, version, about = "Dependency-aware migration scheduling across package feedstocks", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show, per job, which feedstocks would be migrated and in what order
    Plan {
        /// Dependency graph snapshot (JSON)
        #[arg(short, long)]
        graph: PathBuf,

        /// Migrations file (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Only plan this job (instance name or job type)
        #[arg(short, long)]
        job: Option<String>,

        /// Also list skipped feedstocks and why
        #[arg(long)]
        show_skipped: bool,
    },
    /// Run one job on one feedstock checkout
    Migrate {
        /// Dependency graph snapshot (JSON)
        #[arg(short, long)]
        graph: PathBuf,

        /// Migrations file (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Job to run (instance name or job type)
        #[arg(short, long)]
        job: String,

        /// Feedstock being migrated
        #[arg(short, long)]
        feedstock: String,

        /// Recipe directory of the checkout
        #[arg(short, long)]
        recipe_dir: PathBuf,
    },
}

/// Name a job is selected by on the command line
fn job_key(job: &dyn Migrator) -> String {
    match job.name_stamp() {
        NameStamp::Named(name) => name,
        _ => job.migrator_name().to_string(),
    }
}

fn load(graph: &Path, config: &Path) -> Result<(Arc<DependencyGraph>, Vec<Box<dyn Migrator>>)> {
    let graph = DependencyGraph::from_file(graph)
        .with_context(|| format!("loading graph {}", graph.display()))?;
    let graph = Arc::new(graph);
    let config = MigrationConfig::from_file(config)
        .with_context(|| format!("loading migrations {}", config.display()))?;
    let jobs = config.build_jobs(&graph)?;
    Ok((graph, jobs))
}

fn cmd_plan(graph: &Path, config: &Path, only: Option<&str>, show_skipped: bool) -> Result<()> {
    let (graph, jobs) = load(graph, config)?;

    let selected: Vec<&dyn Migrator> = jobs
        .iter()
        .map(|job| job.as_ref())
        .filter(|job| only.is_none_or(|name| job_key(*job) == name))
        .collect();
    if let Some(name) = only {
        if selected.is_empty() {
            return Err(Error::NotFound(format!("job '{}'", name)).into());
        }
    }

    for job in selected {
        let plan = plan_migrations(job, &graph)?;
        println!("{} ({} eligible)", job_key(job), plan.order.len());
        for feedstock in plan.batch() {
            println!("  {}", feedstock);
        }
        if plan.batch().len() < plan.order.len() {
            println!("  ... {} more beyond the PR limit", plan.order.len() - plan.batch().len());
        }
        if show_skipped {
            for (feedstock, reason) in &plan.skipped {
                println!("  - {} ({})", feedstock, reason);
            }
        }
    }
    Ok(())
}

fn cmd_migrate(
    graph: &Path,
    config: &Path,
    name: &str,
    feedstock: &str,
    recipe_dir: &Path,
) -> Result<()> {
    let (graph, jobs) = load(graph, config)?;

    let job = jobs
        .iter()
        .map(|job| job.as_ref())
        .find(|job| job_key(*job) == name)
        .ok_or_else(|| Error::NotFound(format!("job '{}'", name)))?;
    let attrs = graph
        .payload(feedstock)
        .ok_or_else(|| Error::NotFound(format!("feedstock '{}'", feedstock)))?;

    info!("Running {} on {}", name, feedstock);
    match run_migration(job, recipe_dir, attrs)? {
        MigrationOutcome::Migrated(uid) => {
            let meta = job.pr_metadata(&FeedstockContext::new(attrs));
            println!("{}", uid.canonical_json());
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        MigrationOutcome::NoOp => println!("no-op"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Plan {
            graph,
            config,
            job,
            show_skipped,
        } => cmd_plan(&graph, &config, job.as_deref(), show_skipped),
        Commands::Migrate {
            graph,
            config,
            job,
            feedstock,
            recipe_dir,
        } => cmd_migrate(&graph, &config, &job, &feedstock, &recipe_dir),
    }
}
