use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bqetl_core::Config;
use bqetl_scheduling::{DagCollection, DependencyResolver, SchedulingPlan};

mod discover;

/// bqetl - compile scheduled queries into validated DAGs
#[derive(Parser)]
#[command(name = "bqetl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: bqetl.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate DAG declarations and task dependencies
    Validate {
        /// Write the scheduling plan as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print all tasks in dependency order
    Order,

    /// Show tasks affected by a change to a task
    Impact {
        /// Task name (dataset__table__version)
        task: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(
        dags_file = %config.dags_path().display(),
        sql_dir = %config.sql_path().display(),
        "using configuration"
    );

    match cli.command {
        Commands::Validate { output } => validate_command(&config, output.as_deref()),
        Commands::Order => order_command(&config),
        Commands::Impact { task } => impact_command(&config, &task),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Ok(Config::from_file(path)?);
    }

    let default_path = Path::new("bqetl.toml");
    if default_path.exists() {
        Ok(Config::from_file(default_path)?)
    } else {
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

/// Load DAG declarations and attach every scheduled query
fn load_dags(config: &Config) -> Result<DagCollection> {
    let declarations = DagCollection::from_file(&config.dags_path())?;
    let tasks = discover::discover_tasks(config)?;

    Ok(declarations.with_tasks(&tasks)?)
}

/// Validate command - check declarations, references and cycles
fn validate_command(config: &Config, output: Option<&Path>) -> Result<()> {
    let dags = load_dags(config)?;
    let resolution = DependencyResolver::resolve(&dags)?;
    let plan = SchedulingPlan::build(&dags, &resolution);

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Scheduling Summary".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    for dag in &plan.dags {
        println!(
            "  {} {} ({} tasks)",
            dag.name.green(),
            dag.schedule_interval.dimmed(),
            dag.tasks.len()
        );
    }

    println!();
    println!("{} {}", "DAGs:".bold(), plan.dags.len());
    println!("{} {}", "Tasks:".bold(), plan.task_count());
    println!(
        "{} {}",
        "External dependencies:".bold(),
        plan.external_dependencies.len()
    );

    if let Some(path) = output {
        plan.save_to_file(path)?;
        println!("{} {}", "Plan saved to:".green(), path.display());
    }

    println!();
    println!("{}", "✓ All DAGs are valid".green().bold());

    Ok(())
}

/// Order command - print the global task order
fn order_command(config: &Config) -> Result<()> {
    let dags = load_dags(config)?;
    let resolution = DependencyResolver::resolve(&dags)?;

    for (i, task) in resolution.order().iter().enumerate() {
        println!("{:>4}. {} {}", i + 1, task.task_name(), task.dag_name().dimmed());
    }

    Ok(())
}

/// Impact command - show downstream tasks
fn impact_command(config: &Config, task_name: &str) -> Result<()> {
    let dags = load_dags(config)?;
    let resolution = DependencyResolver::resolve(&dags)?;

    let task = resolution.task(task_name).ok_or_else(|| {
        anyhow!(
            "Task '{}' not found. Task names look like 'dataset__table__v1'",
            task_name
        )
    })?;

    let downstream = resolution.downstream(task_name);

    println!("{} {} ({})", "Task:".bold(), task_name.green(), task.dag_name());
    println!("{} {}", "Downstream tasks:".bold(), downstream.len());
    println!();

    if downstream.is_empty() {
        println!("{}", "✓ No downstream dependencies".green());
    } else {
        for (i, dep) in downstream.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, dep.task_name().yellow(), dep.dag_name());
        }
    }

    Ok(())
}
