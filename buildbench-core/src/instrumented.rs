//! Instrumented Execution
//!
//! One build attempt: spawn the process, attach a sampler at process start,
//! block on exit, stop the sampler, and fold both into a [`BuildRun`].

use crate::probe::{ProcessGroupProbe, ResourceProbe, SelfProbe};
use crate::run::BuildRun;
use crate::runner::{ProcessRunner, RunError};
use crate::sampler::{SamplerConfig, TelemetrySampler};
use crate::BuildCommand;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What the sampler observes during a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleTarget {
    /// The harness process's own counters
    #[default]
    #[serde(rename = "self")]
    SelfProcess,
    /// Every process in the build's process group (Linux)
    Build,
}

impl std::fmt::Display for SampleTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleTarget::SelfProcess => write!(f, "self"),
            SampleTarget::Build => write!(f, "build"),
        }
    }
}

impl std::str::FromStr for SampleTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "self" => Ok(SampleTarget::SelfProcess),
            "build" => Ok(SampleTarget::Build),
            other => Err(format!("Unknown sample target: {}", other)),
        }
    }
}

/// Executes one attempt of a build command
pub trait BuildExecutor {
    /// Run the command once.
    ///
    /// A non-zero exit is reported through [`BuildRun::exit_code`], not as an
    /// error; only launch failures and timeouts are errors.
    fn execute(&self, command: &BuildCommand) -> Result<BuildRun, RunError>;
}

/// Real executor: [`ProcessRunner`] and [`TelemetrySampler`] running concurrently
#[derive(Debug, Clone)]
pub struct InstrumentedExecutor {
    runner: ProcessRunner,
    sampler: SamplerConfig,
    target: SampleTarget,
}

impl InstrumentedExecutor {
    /// Pair a runner with a sampler cadence and target
    pub fn new(runner: ProcessRunner, sampler: SamplerConfig, target: SampleTarget) -> Self {
        Self {
            runner,
            sampler,
            target,
        }
    }
}

impl BuildExecutor for InstrumentedExecutor {
    fn execute(&self, command: &BuildCommand) -> Result<BuildRun, RunError> {
        let running = self.runner.spawn(command)?;

        let probe: Box<dyn ResourceProbe> = match self.target {
            SampleTarget::SelfProcess => Box::new(SelfProbe::new()),
            SampleTarget::Build => Box::new(ProcessGroupProbe::new(running.pid())),
        };
        let mut sampler = match TelemetrySampler::start(probe, self.sampler, running.started()) {
            Ok(sampler) => Some(sampler),
            Err(e) => {
                warn!(error = %e, "Could not start sampler thread; run will have no timeline");
                None
            }
        };

        let outcome = running.wait();
        let samples = sampler.as_mut().map(TelemetrySampler::stop).unwrap_or_default();

        // A timed-out run's partial timeline is dropped with it
        let outcome = outcome?;

        Ok(BuildRun::from_samples(
            command.command.clone(),
            outcome.started_at,
            outcome.duration_ms,
            outcome.exit_code,
            &samples,
        ))
    }
}
