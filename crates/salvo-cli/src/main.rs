//! CLI binary for running and validating Salvo scripts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use salvo_engine::{RunConfig, ScriptRunner, Severity};
use salvo_script::{Iterations, Script};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "salvo", version, about = "Scriptable operation runner for shell, HTTP, file and mail actions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a script (JSON or YAML)
    Run {
        /// Path to the script file
        script: PathBuf,

        /// Base directory for relative paths, preloads and shell commands
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Bound on every shell, HTTP and mail call, in seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,

        /// Log side effects instead of performing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a script without running it
    Validate {
        /// Path to the script file
        script: PathBuf,
    },
    /// Show operations, iteration modes and action counts
    Info {
        /// Path to the script file
        script: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Run {
            script,
            workdir,
            timeout_secs,
            dry_run,
        } => {
            cmd_run(&script, workdir.as_deref(), timeout_secs, dry_run).await?;
        }
        Commands::Validate { script } => {
            cmd_validate(&script)?;
        }
        Commands::Info { script } => {
            cmd_info(&script)?;
        }
    }

    Ok(())
}

fn load(path: &Path) -> anyhow::Result<Script> {
    Ok(salvo_script::load_script(path)?)
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let script = load(path)?;
    let diagnostics = salvo_engine::validate(&script);

    if diagnostics.is_empty() {
        println!("Script is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        match &diag.location {
            Some(loc) => println!("[{}] {} ({}): {}", severity, diag.rule, loc, diag.message),
            None => println!("[{}] {}: {}", severity, diag.rule, diag.message),
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let script = load(path)?;

    println!("Script: {}", script.name);
    if !script.preloads.is_empty() {
        println!("Preloads: {}", script.preloads.join(", "));
    }
    let action_count: usize = script.operations.iter().map(|op| op.actions.len()).sum();
    println!("Operations: {}", script.operations.len());
    println!("Actions: {}", action_count);

    println!("\nOperations:");
    for (index, op) in script.operations.iter().enumerate() {
        let name = if op.name.is_empty() { "(unnamed)" } else { op.name.as_str() };
        println!(
            "  {}. {} iterations={} actions={}",
            index + 1,
            name,
            describe_iterations(&op.iterations),
            op.actions.len()
        );
        if let Some(run_at) = &op.run_at {
            println!("     run_at={}", run_at);
        }
        for action in &op.actions {
            println!("     - {} [{}]", action.name, action.action_type);
        }
    }

    Ok(())
}

fn describe_iterations(iterations: &Iterations) -> String {
    match iterations {
        Iterations::Count(n) => n.to_string(),
        Iterations::Text(text) => format!("\"{}\"", text),
        Iterations::Spec(spec) => format!("{}({})", spec.strategy, spec.iteratee),
    }
}

async fn cmd_run(
    path: &Path,
    workdir: Option<&Path>,
    timeout_secs: u64,
    dry_run: bool,
) -> anyhow::Result<()> {
    let script = load(path)?;

    let working_dir = match workdir {
        Some(dir) => std::fs::canonicalize(dir)?,
        None => std::env::current_dir()?,
    };
    let config = RunConfig {
        working_dir,
        action_timeout: Duration::from_secs(timeout_secs),
        dry_run,
    };

    println!("Running script: {}", script.name);
    println!("Working directory: {}", config.working_dir.display());
    if dry_run {
        println!("(dry run mode -- no side effects)");
    }

    let runner = ScriptRunner::with_default_registry();
    let report = runner.run(&script, &config).await?;

    println!("\n{}", report.summary());
    for record in report.actions.iter().filter(|r| r.status.is_failed()) {
        println!(
            "  failed: {}/{} #{}: {}",
            record.operation,
            record.action,
            record.iteration,
            record.status
        );
    }

    Ok(())
}
