#![warn(missing_docs)]
//! BuildBench CLI Library
//!
//! Command-line front end of the build comparison harness. It loads
//! `buildbench.toml`, measures every selected build system, and writes
//! `build-comparison.json` (always) plus `build-comparison.html` (only for a
//! complete comparison).
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     buildbench_cli::run()
//! }
//! ```

mod config;
mod executor;
mod planner;

pub use config::*;
pub use executor::{
    AttemptFailure, BenchError, BenchmarkOrchestrator, ComparisonOutcome, ExecutionConfig,
    FailedSystem, IterationState, SystemMeasurement, SystemTarget, build_report,
    build_report_meta, compute_statistics, format_human_output,
};
pub use planner::{ExecutionPlan, build_plan};

use anyhow::{Context, bail};
use buildbench_core::{BuildCommand, BuildExecutor, SampleTarget};
use buildbench_report::{
    ComparisonReport, OutputFormat, generate_html_report, generate_json_report,
};
use clap::{Parser, Subcommand};
use rayon::ThreadPoolBuilder;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Name of the JSON data file inside the output directory
pub const JSON_REPORT_NAME: &str = "build-comparison.json";
/// Name of the HTML report inside the output directory
pub const HTML_REPORT_NAME: &str = "build-comparison.html";

/// BuildBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "buildbench")]
#[command(author, version, about = "BuildBench - compare build systems by time, memory, cache and bundle size")]
pub struct Cli {
    /// Optional subcommand (Run, List, Init); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Filter systems by regex pattern on their name
    #[arg(default_value = ".*")]
    pub filter: String,

    /// Configuration file (discovered from the current directory if not specified)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Terminal output format: human, json
    #[arg(long)]
    pub format: Option<String>,

    /// Only systems using this tool (vite, webpack, other)
    #[arg(long)]
    pub tool: Option<ToolKind>,

    /// Measured builds per system
    #[arg(long, short = 'n')]
    pub iterations: Option<usize>,

    /// Extra attempts per build after a failure
    #[arg(long)]
    pub retries: Option<u32>,

    /// Timeout for a single build (e.g., "300s", "5m")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Grace window between SIGTERM and SIGKILL (e.g., "500ms")
    #[arg(long)]
    pub kill_grace: Option<String>,

    /// Sampling cadence (e.g., "10ms")
    #[arg(long)]
    pub sample_interval: Option<String>,

    /// What to sample: self, build
    #[arg(long)]
    pub sample_target: Option<SampleTarget>,

    /// Output directory for the data file and HTML report
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip the configured clean command
    #[arg(long)]
    pub no_clean: bool,

    /// Number of threads for parallel statistics computation
    /// 0 = use all available cores (default), 1 = single-threaded
    #[arg(long, short = 'j', default_value = "0")]
    pub threads: usize,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Measure and compare the configured systems (default)
    Run,
    /// List the systems that would be measured
    List,
    /// Write a default buildbench.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Files written by a comparison run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// JSON data file
    pub json: PathBuf,
    /// HTML report, absent for a partial comparison
    pub html: Option<PathBuf>,
}

/// Run the BuildBench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` when every system was measured, or an error otherwise.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the BuildBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Initialize logging; stdout is reserved for the report
    let filter = if cli.verbose {
        "buildbench=debug"
    } else {
        "buildbench=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(Commands::Init { force }) = cli.command {
        return init_config(force);
    }

    let mut config = load_config(&cli)?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    match cli.command {
        Some(Commands::List) => list_systems(&cli, &config),
        Some(Commands::Run) | None => run_comparison(&cli, &config),
        Some(Commands::Init { .. }) => Ok(()),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<BuildBenchConfig> {
    match &cli.config {
        Some(path) => BuildBenchConfig::load(path),
        None => match BuildBenchConfig::discover() {
            Some(config) => config,
            None => bail!(
                "No {} found in this directory or its parents; run `buildbench init` to create one",
                CONFIG_FILE_NAME
            ),
        },
    }
}

/// Layer CLI flags over buildbench.toml values
fn apply_overrides(config: &mut BuildBenchConfig, cli: &Cli) {
    let runner = &mut config.runner;
    if let Some(iterations) = cli.iterations {
        runner.iterations = iterations;
    }
    if let Some(retries) = cli.retries {
        runner.retries = retries;
    }
    if let Some(timeout) = &cli.timeout {
        runner.timeout = timeout.clone();
    }
    if let Some(kill_grace) = &cli.kill_grace {
        runner.kill_grace = kill_grace.clone();
    }
    if let Some(interval) = &cli.sample_interval {
        runner.sample_interval = interval.clone();
    }
    if let Some(target) = cli.sample_target {
        runner.sample_target = target;
    }
    if let Some(format) = &cli.format {
        config.output.format = format.clone();
    }
}

fn selected_systems<'a>(cli: &Cli, config: &'a BuildBenchConfig) -> anyhow::Result<ExecutionPlan<'a>> {
    let filter = Regex::new(&cli.filter)
        .with_context(|| format!("Invalid system filter '{}'", cli.filter))?;
    Ok(build_plan(&config.systems, Some(&filter), cli.tool))
}

fn list_systems(cli: &Cli, config: &BuildBenchConfig) -> anyhow::Result<()> {
    println!("BuildBench Plan:");

    let plan = selected_systems(cli, config)?;
    for (i, system) in plan.systems.iter().enumerate() {
        let target = system.target(&config.root);
        let baseline = if i == 0 { " [baseline]" } else { "" };
        println!("├── {} ({}){}", system.name, system.tool, baseline);
        println!("│   ├── command: {}", target.command);
        println!("│   ├── dist: {}", target.dist_dir.display());
        match target.cache.cache_dir() {
            Some(dir) => println!("│   ├── cache: {}", dir.display()),
            None => println!("│   ├── cache: (none)"),
        }
        println!(
            "│   └── artifact: {:?}",
            system.resolved_artifact(&config.root)
        );
    }

    println!(
        "{} of {} systems selected, {} iterations each.",
        plan.systems.len(),
        config.systems.len(),
        config.runner.iterations
    );
    Ok(())
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = std::env::current_dir()?.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(&path, BuildBenchConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Run the pre-benchmark clean command; failures only warn
fn run_clean(command: &str, root: &Path, config: &ExecutionConfig) {
    eprintln!("\nCleaning previous builds...");
    let runner = config.process_runner();
    match runner.run(&BuildCommand::new(command, root)) {
        Ok(outcome) if outcome.exit_code == 0 => {
            tracing::debug!(duration_ms = outcome.duration_ms, "Clean finished");
        }
        Ok(outcome) => {
            eprintln!(
                "Warning: clean command exited with code {}, continuing...",
                outcome.exit_code
            );
        }
        Err(e) => {
            eprintln!("Warning: clean failed ({}), continuing...", e);
        }
    }
}

/// Measure the targets and assemble the report
pub fn compare<E: BuildExecutor>(
    orchestrator: &BenchmarkOrchestrator<E>,
    targets: &[SystemTarget],
    config: &ExecutionConfig,
) -> ComparisonReport {
    let outcome = orchestrator.run(targets);
    let stats = compute_statistics(&outcome.measurements);
    build_report(&outcome, &stats, config)
}

/// Write the data file, and the HTML report when the comparison is complete.
///
/// A stale HTML report from an earlier run is removed for a partial comparison.
pub fn write_outputs(report: &ComparisonReport, dir: &Path) -> anyhow::Result<OutputPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let json_path = dir.join(JSON_REPORT_NAME);
    std::fs::write(&json_path, generate_json_report(report)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    let html_path = dir.join(HTML_REPORT_NAME);
    if report.is_complete() {
        std::fs::write(&html_path, generate_html_report(report)?)
            .with_context(|| format!("Failed to write {}", html_path.display()))?;
        Ok(OutputPaths {
            json: json_path,
            html: Some(html_path),
        })
    } else {
        if html_path.exists() {
            std::fs::remove_file(&html_path)
                .with_context(|| format!("Failed to remove stale {}", html_path.display()))?;
        }
        Ok(OutputPaths {
            json: json_path,
            html: None,
        })
    }
}

fn run_comparison(cli: &Cli, config: &BuildBenchConfig) -> anyhow::Result<()> {
    // Configure Rayon thread pool for statistics computation
    if cli.threads > 0 {
        ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    let format: OutputFormat = config.output.format.parse().unwrap_or_else(|e| {
        eprintln!("Warning: {}, using human output", e);
        OutputFormat::Human
    });

    let plan = selected_systems(cli, config)?;
    if plan.systems.is_empty() {
        bail!("No systems match filter '{}'", cli.filter);
    }

    let exec_config = config.execution_config()?;
    if exec_config.sample_interval < std::time::Duration::from_millis(5) {
        eprintln!(
            "Warning: sample_interval={:?} is very short; sampling overhead may skew build times.",
            exec_config.sample_interval
        );
    }

    if !cli.no_clean {
        if let Some(clean) = &config.runner.clean_command {
            run_clean(clean, &config.root, &exec_config);
        }
    }

    eprintln!(
        "\nComparing {} systems, {} iterations each (retries: {}, timeout: {:?})...\n",
        plan.systems.len(),
        exec_config.iterations,
        exec_config.retries,
        exec_config.timeout
    );

    let targets: Vec<SystemTarget> = plan
        .systems
        .iter()
        .map(|s| s.target(&config.root))
        .collect();
    let orchestrator = BenchmarkOrchestrator::new(exec_config.instrumented_executor(), &exec_config)
        .with_progress(format == OutputFormat::Human);
    let report = compare(&orchestrator, &targets, &exec_config);

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir());
    let paths = write_outputs(&report, &output_dir)?;

    match format {
        OutputFormat::Json => print!("{}", generate_json_report(&report)?),
        OutputFormat::Human => {
            print!("{}", format_human_output(&report));
            println!("\nData written to: {}", paths.json.display());
            if let Some(html) = &paths.html {
                println!("Report written to: {}", html.display());
            }
        }
    }

    if !report.is_complete() {
        let failed: Vec<String> = report
            .failures
            .iter()
            .map(|f| format!("{} ({})", f.system, f.message))
            .collect();
        bail!("Comparison incomplete: {}", failed.join("; "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::*;

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::parse_from([
            "buildbench",
            "vite",
            "--iterations",
            "5",
            "--sample-target",
            "build",
            "--tool",
            "vite",
            "--timeout",
            "2m",
        ]);
        assert_eq!(cli.filter, "vite");
        assert_eq!(cli.tool, Some(ToolKind::Vite));

        let mut config: BuildBenchConfig =
            toml::from_str(&BuildBenchConfig::default_toml()).unwrap();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.runner.iterations, 5);
        assert_eq!(config.runner.sample_target, SampleTarget::Build);
        assert_eq!(config.runner.timeout, "2m");
        // Untouched values keep the file's settings
        assert_eq!(config.runner.retries, 2);

        let plan = selected_systems(&cli, &config).unwrap();
        assert_eq!(plan.systems.len(), 1);
        assert_eq!(plan.systems[0].name, "vite");
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::parse_from(["buildbench", "init", "--force"]);
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
        let cli = Cli::parse_from(["buildbench", "list"]);
        assert!(matches!(cli.command, Some(Commands::List)));
    }

    #[test]
    fn test_invalid_filter_is_an_error() {
        let cli = Cli::parse_from(["buildbench", "("]);
        let config: BuildBenchConfig = toml::from_str(&BuildBenchConfig::default_toml()).unwrap();
        assert!(selected_systems(&cli, &config).is_err());
    }

    #[test]
    fn test_complete_comparison_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let exec_config = config(2, 0);
        let orchestrator = BenchmarkOrchestrator::new(
            ScriptedExecutor::new(vec![
                ("build-vite", vec![ok(100), ok(120)]),
                ("build-webpack", vec![ok(90), ok(95)]),
            ]),
            &exec_config,
        );
        let report = compare(&orchestrator, &[target("vite"), target("webpack")], &exec_config);

        let paths = write_outputs(&report, dir.path()).unwrap();

        assert_eq!(paths.json, dir.path().join(JSON_REPORT_NAME));
        assert!(paths.json.exists());
        assert!(paths.html.as_ref().unwrap().exists());
        let data: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(data["summary"]["fastest"], "webpack");
    }

    #[test]
    fn test_partial_comparison_writes_json_only() {
        let dir = tempfile::tempdir().unwrap();
        // Stale report from an earlier complete run
        std::fs::write(dir.path().join(HTML_REPORT_NAME), "old").unwrap();

        let exec_config = config(1, 1);
        let orchestrator = BenchmarkOrchestrator::new(
            ScriptedExecutor::new(vec![
                ("build-vite", vec![ok(100)]),
                ("build-webpack", vec![fail(1)]),
            ]),
            &exec_config,
        );
        let report = compare(&orchestrator, &[target("vite"), target("webpack")], &exec_config);

        let paths = write_outputs(&report, dir.path()).unwrap();

        assert!(paths.html.is_none());
        assert!(!dir.path().join(HTML_REPORT_NAME).exists());
        let data: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(data["results"][0]["system"], "vite");
        assert_eq!(data["failures"][0]["system"], "webpack");
        assert_eq!(data["failures"][0]["attempts"], 2);
        assert_eq!(data["summary"]["complete"], false);
    }
}
