//! Build Execution
//!
//! Orchestrates the measured builds of every system in a comparison.
//!
//! ## Data Flow
//!
//! ```text
//! SystemTarget (from buildbench.toml)
//!        │
//!        ▼
//!   ExecutionConfig
//!        │
//!        ▼
//! ┌──────────────────────┐
//! │ BenchmarkOrchestrator│  cache before → K iterations → cache after → bundle
//! └──────────┬───────────┘
//!            │
//!            ▼
//!  SystemMeasurement (runs, attempts, cache snapshots, chunks)
//! ```
//!
//! ## Iteration state machine
//!
//! ```text
//! Idle → Spawning → Running ─┬─▶ Succeeded
//!                            ├─▶ Failed ──▶ Retrying → Spawning
//!                            └─▶ TimedOut → Failed
//! Failed with no budget left, or a launch failure → Aborted
//! ```
//!
//! Systems are measured strictly one after another. The first fatal error
//! ends the comparison; systems measured before it are kept.

use buildbench_core::{
    BuildCommand, BuildExecutor, BuildOutput, BuildRun, BundleAnalysis, BundleAnalyzer,
    CacheAnalyzer, CacheSnapshot, InstrumentedExecutor, ProcessRunner, RunError, SampleTarget,
    SamplerConfig, dist_size,
};
use buildbench_report::ReportConfig;
use buildbench_stats::StatsError;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration for build measurement
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Accepted runs per system
    pub iterations: usize,
    /// Extra attempts per run after a failed attempt
    pub retries: u32,
    /// Timeout for a single attempt
    pub timeout: Duration,
    /// Window between SIGTERM and SIGKILL on timeout
    pub kill_grace: Duration,
    /// Sampler cadence
    pub sample_interval: Duration,
    /// What the sampler observes
    pub sample_target: SampleTarget,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            iterations: 3,
            retries: 2,
            timeout: Duration::from_millis(buildbench_core::DEFAULT_TIMEOUT_MS),
            kill_grace: Duration::from_millis(buildbench_core::DEFAULT_KILL_GRACE_MS),
            sample_interval: Duration::from_millis(buildbench_core::DEFAULT_SAMPLE_INTERVAL_MS),
            sample_target: SampleTarget::default(),
        }
    }
}

impl ExecutionConfig {
    /// Attempts allowed per iteration
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Process runner honoring the timeout settings.
    ///
    /// Build output goes to stderr so the harness's stdout carries only the
    /// summary or the JSON report.
    pub fn process_runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.timeout)
            .with_kill_grace(self.kill_grace)
            .with_output(BuildOutput::Stderr)
    }

    /// The real executor: process runner plus concurrent sampler
    pub fn instrumented_executor(&self) -> InstrumentedExecutor {
        InstrumentedExecutor::new(
            self.process_runner(),
            SamplerConfig {
                interval: self.sample_interval,
            },
            self.sample_target,
        )
    }

    /// Settings as recorded in report metadata
    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            iterations: self.iterations,
            retries: self.retries,
            timeout_ms: self.timeout.as_millis() as u64,
            kill_grace_ms: self.kill_grace.as_millis() as u64,
            sample_interval_ms: self.sample_interval.as_millis() as u64,
            sample_target: self.sample_target.to_string(),
        }
    }
}

/// Why a single attempt was not accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    /// The build ran and reported failure
    #[error("exit code {exit_code}")]
    NonZeroExit {
        /// Exit code, or `128 + signal`
        exit_code: i32,
    },

    /// The build was killed at the timeout
    #[error("timed out after {timeout_ms} ms")]
    TimedOut {
        /// Timeout that was exceeded
        timeout_ms: u64,
    },
}

/// Fatal error for a system's batch
#[derive(Debug, Error)]
pub enum BenchError {
    /// The build command could not be launched or waited on
    #[error("Could not run the build for '{system}'")]
    Spawn {
        /// System name
        system: String,
        /// Runner error
        #[source]
        source: RunError,
    },

    /// An iteration used up its retry budget
    #[error("Build for '{system}' failed after {attempts} attempts (last: {last})")]
    BuildFailed {
        /// System name
        system: String,
        /// Attempts made for the failing iteration
        attempts: u32,
        /// Why the final attempt failed
        last: AttemptFailure,
    },

    /// No statistics could be computed from the accepted runs
    #[error("No build-time statistics for '{system}'")]
    Stats {
        /// System name
        system: String,
        /// Aggregator error
        #[source]
        source: StatsError,
    },
}

impl BenchError {
    /// System the error belongs to
    pub fn system(&self) -> &str {
        match self {
            BenchError::Spawn { system, .. }
            | BenchError::BuildFailed { system, .. }
            | BenchError::Stats { system, .. } => system,
        }
    }

    /// Short machine-readable kind, as written to the data file
    pub fn kind(&self) -> &'static str {
        match self {
            BenchError::Spawn { .. } => "spawn",
            BenchError::BuildFailed { .. } => "build-failed",
            BenchError::Stats { .. } => "stats",
        }
    }
}

/// Per-iteration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    /// Nothing launched yet
    Idle,
    /// Launching the build process
    Spawning,
    /// Build running, sampler attached
    Running,
    /// Run accepted (terminal)
    Succeeded,
    /// Attempt rejected
    Failed,
    /// Attempt killed at the timeout
    TimedOut,
    /// Waiting to launch the next attempt
    Retrying,
    /// Budget spent or launch failed (terminal)
    Aborted,
}

impl std::fmt::Display for IterationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IterationState::Idle => "idle",
            IterationState::Spawning => "spawning",
            IterationState::Running => "running",
            IterationState::Succeeded => "succeeded",
            IterationState::Failed => "failed",
            IterationState::TimedOut => "timed-out",
            IterationState::Retrying => "retrying",
            IterationState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A build system resolved for measurement
#[derive(Debug, Clone)]
pub struct SystemTarget {
    /// System name
    pub name: String,
    /// Tool family, as written to the report
    pub tool: String,
    /// Build command and working directory
    pub command: BuildCommand,
    /// Cache directory to snapshot
    pub cache: CacheAnalyzer,
    /// Artifact to read after the batch
    pub bundle: BundleAnalyzer,
    /// Output directory to size
    pub dist_dir: PathBuf,
}

/// Everything measured for one system
#[derive(Debug, Clone)]
pub struct SystemMeasurement {
    /// System name
    pub system: String,
    /// Tool family
    pub tool: String,
    /// Accepted runs in iteration order
    pub runs: Vec<BuildRun>,
    /// Process launches including retries
    pub attempts: u32,
    /// Cache before the first iteration
    pub cache_before: CacheSnapshot,
    /// Cache after the last iteration
    pub cache_after: CacheSnapshot,
    /// Chunks read from the tool's artifact
    pub bundle: BundleAnalysis,
    /// Size of the visible output files
    pub dist_size_bytes: u64,
}

impl SystemMeasurement {
    /// Accepted durations as statistics input
    pub fn durations_ms(&self) -> Vec<f64> {
        self.runs.iter().map(|r| r.duration_ms as f64).collect()
    }
}

/// The system that ended the comparison
#[derive(Debug)]
pub struct FailedSystem {
    /// Why the batch was aborted
    pub error: BenchError,
    /// Process launches for this system before it was aborted
    pub attempts: u32,
}

/// Result of a whole comparison run
#[derive(Debug)]
pub struct ComparisonOutcome {
    /// Fully measured systems, in order
    pub measurements: Vec<SystemMeasurement>,
    /// The system that ended the comparison early
    pub failure: Option<FailedSystem>,
    /// Systems not measured because of an earlier failure
    pub skipped: Vec<String>,
    /// Wall-clock time of the whole run
    pub duration_ms: f64,
}

impl ComparisonOutcome {
    /// Whether every target was measured
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.skipped.is_empty()
    }
}

fn advance(
    state: &mut IterationState,
    next: IterationState,
    system: &str,
    iteration: usize,
    attempt: u32,
) {
    debug!(system, iteration, attempt, from = %state, to = %next, "Iteration state");
    *state = next;
}

/// Drives the measured builds of a comparison
pub struct BenchmarkOrchestrator<E> {
    executor: E,
    iterations: usize,
    max_attempts: u32,
    show_progress: bool,
}

impl<E: BuildExecutor> BenchmarkOrchestrator<E> {
    /// Orchestrator driving `executor` with the iteration and retry settings of `config`
    pub fn new(executor: E, config: &ExecutionConfig) -> Self {
        Self {
            executor,
            iterations: config.iterations,
            max_attempts: config.max_attempts(),
            show_progress: false,
        }
    }

    /// Show an indicatif progress bar per system
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[cfg(test)]
    pub(crate) fn executor(&self) -> &E {
        &self.executor
    }

    /// Measure every target in order, stopping at the first fatal error
    pub fn run(&self, targets: &[SystemTarget]) -> ComparisonOutcome {
        let start = Instant::now();
        let mut measurements = Vec::with_capacity(targets.len());
        let mut failure: Option<FailedSystem> = None;
        let mut skipped = Vec::new();

        for target in targets {
            if failure.is_some() {
                skipped.push(target.name.clone());
                continue;
            }
            match self.measure_system(target) {
                Ok(measurement) => measurements.push(measurement),
                Err(failed) => {
                    warn!(system = %target.name, error = %failed.error, "Aborting comparison");
                    failure = Some(failed);
                }
            }
        }

        ComparisonOutcome {
            measurements,
            failure,
            skipped,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.iterations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    /// One system's batch: cache snapshot, iterations, cache snapshot, bundle analysis
    pub fn measure_system(&self, target: &SystemTarget) -> Result<SystemMeasurement, FailedSystem> {
        info!(system = %target.name, command = %target.command, "Measuring build system");
        let pb = self.progress_bar();

        let cache_before = target.cache.snapshot();
        let mut runs = Vec::with_capacity(self.iterations);
        let mut attempts = 0u32;

        for iteration in 0..self.iterations {
            pb.set_message(format!(
                "{} (run {}/{})",
                target.name,
                iteration + 1,
                self.iterations
            ));
            match self.run_iteration(target, iteration, &mut attempts) {
                Ok(run) => {
                    debug!(system = %target.name, iteration, duration_ms = run.duration_ms, "Run accepted");
                    runs.push(run);
                    pb.inc(1);
                }
                Err(error) => {
                    pb.abandon_with_message(format!("{} failed", target.name));
                    return Err(FailedSystem { error, attempts });
                }
            }
        }

        let cache_after = target.cache.snapshot();
        let bundle = target.bundle.analyze();
        let dist_size_bytes = dist_size(&target.dist_dir);
        pb.finish_with_message(format!("{} complete", target.name));

        Ok(SystemMeasurement {
            system: target.name.clone(),
            tool: target.tool.clone(),
            runs,
            attempts,
            cache_before,
            cache_after,
            bundle,
            dist_size_bytes,
        })
    }

    /// Run attempts until one is accepted or the retry budget is spent
    fn run_iteration(
        &self,
        target: &SystemTarget,
        iteration: usize,
        total_attempts: &mut u32,
    ) -> Result<BuildRun, BenchError> {
        let system = target.name.as_str();
        let max_attempts = self.max_attempts;
        let mut state = IterationState::Idle;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            *total_attempts += 1;
            advance(&mut state, IterationState::Spawning, system, iteration, attempt);

            let last = match self.executor.execute(&target.command) {
                Ok(run) => {
                    advance(&mut state, IterationState::Running, system, iteration, attempt);
                    if run.succeeded() {
                        advance(&mut state, IterationState::Succeeded, system, iteration, attempt);
                        return Ok(run);
                    }
                    advance(&mut state, IterationState::Failed, system, iteration, attempt);
                    AttemptFailure::NonZeroExit {
                        exit_code: run.exit_code,
                    }
                }
                Err(RunError::TimeoutExceeded { timeout_ms }) => {
                    advance(&mut state, IterationState::Running, system, iteration, attempt);
                    advance(&mut state, IterationState::TimedOut, system, iteration, attempt);
                    advance(&mut state, IterationState::Failed, system, iteration, attempt);
                    AttemptFailure::TimedOut { timeout_ms }
                }
                Err(source) => {
                    advance(&mut state, IterationState::Aborted, system, iteration, attempt);
                    return Err(BenchError::Spawn {
                        system: system.to_string(),
                        source,
                    });
                }
            };

            if attempt >= max_attempts {
                advance(&mut state, IterationState::Aborted, system, iteration, attempt);
                return Err(BenchError::BuildFailed {
                    system: system.to_string(),
                    attempts: attempt,
                    last,
                });
            }

            warn!(system, attempt, max_attempts, reason = %last, "Build attempt failed, retrying");
            advance(&mut state, IterationState::Retrying, system, iteration, attempt);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::Utc;
    use std::cell::Cell;

    /// One scripted attempt
    #[derive(Debug, Clone, Copy)]
    pub enum Step {
        Exit { code: i32, duration_ms: u64 },
        Timeout,
        SpawnFailure,
    }

    pub fn ok(duration_ms: u64) -> Step {
        Step::Exit {
            code: 0,
            duration_ms,
        }
    }

    pub fn fail(code: i32) -> Step {
        Step::Exit {
            code,
            duration_ms: 1,
        }
    }

    /// Executor replaying a fixed script per command; the last step repeats
    pub struct ScriptedExecutor {
        scripts: Vec<(String, Vec<Step>)>,
        cursors: Vec<Cell<usize>>,
        pub calls: Cell<u32>,
    }

    impl ScriptedExecutor {
        pub fn new(scripts: Vec<(&str, Vec<Step>)>) -> Self {
            let cursors = scripts.iter().map(|_| Cell::new(0)).collect();
            Self {
                scripts: scripts
                    .into_iter()
                    .map(|(cmd, steps)| (cmd.to_string(), steps))
                    .collect(),
                cursors,
                calls: Cell::new(0),
            }
        }
    }

    impl BuildExecutor for ScriptedExecutor {
        fn execute(&self, command: &BuildCommand) -> Result<BuildRun, RunError> {
            self.calls.set(self.calls.get() + 1);
            let index = self
                .scripts
                .iter()
                .position(|(cmd, _)| *cmd == command.command)
                .expect("unscripted command");
            let steps = &self.scripts[index].1;
            let cursor = &self.cursors[index];
            let step = steps[cursor.get().min(steps.len() - 1)];
            cursor.set(cursor.get() + 1);

            match step {
                Step::Exit { code, duration_ms } => Ok(BuildRun::from_samples(
                    command.command.clone(),
                    Utc::now(),
                    duration_ms,
                    code,
                    &[],
                )),
                Step::Timeout => Err(RunError::TimeoutExceeded { timeout_ms: 100 }),
                Step::SpawnFailure => Err(RunError::SpawnFailure {
                    command: command.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                }),
            }
        }
    }

    pub fn target(name: &str) -> SystemTarget {
        let dir = std::env::temp_dir();
        SystemTarget {
            name: name.to_string(),
            tool: "other".to_string(),
            command: BuildCommand::new(format!("build-{name}"), &dir),
            cache: CacheAnalyzer::disabled(),
            bundle: BundleAnalyzer::new(buildbench_core::ArtifactSource::Disabled, &dir),
            dist_dir: dir.join("buildbench-nonexistent-dist"),
        }
    }

    pub fn config(iterations: usize, retries: u32) -> ExecutionConfig {
        ExecutionConfig {
            iterations,
            retries,
            ..Default::default()
        }
    }
}
