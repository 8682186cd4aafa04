//! Configuration loading from buildbench.toml
//!
//! BuildBench configuration lives in a `buildbench.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.
//! Relative paths inside the file resolve against the directory holding it.

use crate::executor::{ExecutionConfig, SystemTarget};
use anyhow::{Context, bail};
use buildbench_core::{
    ArtifactSource, BuildCommand, BundleAnalyzer, CacheAnalyzer, SampleTarget,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file name looked up during discovery
pub const CONFIG_FILE_NAME: &str = "buildbench.toml";

/// BuildBench configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildBenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Build systems to compare, in order; the first is the baseline
    #[serde(default)]
    pub systems: Vec<SystemConfig>,
    /// Directory relative paths resolve against
    #[serde(skip, default = "default_root")]
    pub root: PathBuf,
}

impl Default for BuildBenchConfig {
    fn default() -> Self {
        Self {
            runner: RunnerConfig::default(),
            output: OutputConfig::default(),
            systems: Vec::new(),
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// Runner configuration for build measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Measured runs per system
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Extra attempts allowed per run after a failure
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Timeout for a single build (e.g., "300s", "5m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Time between SIGTERM and SIGKILL after a timeout
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
    /// Resource sampling cadence
    #[serde(default = "default_sample_interval")]
    pub sample_interval: String,
    /// What the sampler observes: "self" or "build"
    #[serde(default)]
    pub sample_target: SampleTarget,
    /// Command run once before measuring (e.g., "yarn clean")
    #[serde(default)]
    pub clean_command: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            retries: default_retries(),
            timeout: default_timeout(),
            kill_grace: default_kill_grace(),
            sample_interval: default_sample_interval(),
            sample_target: SampleTarget::default(),
            clean_command: None,
        }
    }
}

fn default_iterations() -> usize {
    3
}
fn default_retries() -> u32 {
    2
}
fn default_timeout() -> String {
    "300s".to_string()
}
fn default_kill_grace() -> String {
    "500ms".to_string()
}
fn default_sample_interval() -> String {
    "10ms".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Terminal output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
    /// Output directory for the data file and HTML report
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            directory: default_output_dir(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}
fn default_output_dir() -> String {
    "target/buildbench".to_string()
}

/// Build tool family, which decides cache and artifact defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Cache in `node_modules/.vite`, manifest in `dist/.vite/manifest.json`
    Vite,
    /// Cache in `node_modules/.cache`, stats dump in `stats.json`
    Webpack,
    /// No cache or artifact unless configured
    #[default]
    Other,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Vite => write!(f, "vite"),
            ToolKind::Webpack => write!(f, "webpack"),
            ToolKind::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vite" => Ok(ToolKind::Vite),
            "webpack" => Ok(ToolKind::Webpack),
            "other" => Ok(ToolKind::Other),
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}

/// One build system under comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Display name, unique within the file
    pub name: String,
    /// Build command passed to `sh -c`
    pub command: String,
    /// Directory the command runs in
    #[serde(default = "default_root")]
    pub working_directory: PathBuf,
    /// Tool family for cache and artifact defaults
    #[serde(default)]
    pub tool: ToolKind,
    /// Output directory, relative to the working directory (default "dist")
    #[serde(default)]
    pub dist_dir: Option<PathBuf>,
    /// Cache directory, relative to the working directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Manifest or stats dump, relative to the working directory
    #[serde(default)]
    pub artifact: Option<ArtifactSource>,
}

impl SystemConfig {
    /// Working directory resolved against `root`
    pub fn working_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.working_directory)
    }

    /// Output directory resolved against `root`
    pub fn resolved_dist_dir(&self, root: &Path) -> PathBuf {
        self.working_dir(root)
            .join(self.dist_dir.as_deref().unwrap_or(Path::new("dist")))
    }

    /// Explicit cache directory, else the tool's default
    pub fn resolved_cache_dir(&self, root: &Path) -> Option<PathBuf> {
        let relative = match (&self.cache_dir, self.tool) {
            (Some(dir), _) => dir.clone(),
            (None, ToolKind::Vite) => PathBuf::from("node_modules/.vite"),
            (None, ToolKind::Webpack) => PathBuf::from("node_modules/.cache"),
            (None, ToolKind::Other) => return None,
        };
        Some(self.working_dir(root).join(relative))
    }

    /// Explicit artifact, else the tool's default
    pub fn resolved_artifact(&self, root: &Path) -> ArtifactSource {
        let working_dir = self.working_dir(root);
        match (&self.artifact, self.tool) {
            (Some(ArtifactSource::Manifest { path }), _) => ArtifactSource::Manifest {
                path: working_dir.join(path),
            },
            (Some(ArtifactSource::StatsDump { path }), _) => ArtifactSource::StatsDump {
                path: working_dir.join(path),
            },
            (Some(ArtifactSource::Disabled), _) => ArtifactSource::Disabled,
            (None, ToolKind::Vite) => ArtifactSource::Manifest {
                path: self.resolved_dist_dir(root).join(".vite/manifest.json"),
            },
            (None, ToolKind::Webpack) => ArtifactSource::StatsDump {
                path: working_dir.join("stats.json"),
            },
            (None, ToolKind::Other) => ArtifactSource::Disabled,
        }
    }

    /// Everything the orchestrator needs to measure this system
    pub fn target(&self, root: &Path) -> SystemTarget {
        let dist_dir = self.resolved_dist_dir(root);
        SystemTarget {
            name: self.name.clone(),
            tool: self.tool.to_string(),
            command: BuildCommand::new(&self.command, self.working_dir(root)),
            cache: self
                .resolved_cache_dir(root)
                .map_or_else(CacheAnalyzer::disabled, CacheAnalyzer::new),
            bundle: BundleAnalyzer::new(self.resolved_artifact(root), &dist_dir),
            dist_dir,
        }
    }
}

impl BuildBenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&content).with_context(|| format!("Invalid {}", path.display()))?;
        config.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(default_root, Path::to_path_buf);
        Ok(config)
    }

    /// Find the nearest buildbench.toml walking up from the current directory
    pub fn discover_path() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<anyhow::Result<Self>> {
        Self::discover_path().map(Self::load)
    }

    /// Reject configurations that cannot produce a comparison
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.systems.is_empty() {
            bail!("No [[systems]] configured");
        }
        if self.runner.iterations == 0 {
            bail!("runner.iterations must be at least 1");
        }
        let mut seen = HashSet::new();
        for system in &self.systems {
            if system.name.trim().is_empty() {
                bail!("A system has an empty name");
            }
            if system.command.trim().is_empty() {
                bail!("System '{}' has an empty command", system.name);
            }
            if !seen.insert(system.name.as_str()) {
                bail!("Duplicate system name '{}'", system.name);
            }
        }
        for (key, value) in [
            ("timeout", &self.runner.timeout),
            ("kill_grace", &self.runner.kill_grace),
            ("sample_interval", &self.runner.sample_interval),
        ] {
            Self::parse_duration(value).with_context(|| format!("runner.{key}"))?;
        }
        Ok(())
    }

    /// Runner settings resolved into an execution configuration
    pub fn execution_config(&self) -> anyhow::Result<ExecutionConfig> {
        Ok(ExecutionConfig {
            iterations: self.runner.iterations,
            retries: self.runner.retries,
            timeout: Self::parse_duration(&self.runner.timeout)?,
            kill_grace: Self::parse_duration(&self.runner.kill_grace)?,
            sample_interval: Self::parse_duration(&self.runner.sample_interval)?,
            sample_target: self.runner.sample_target,
        })
    }

    /// Output directory resolved against the config root
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.directory)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# BuildBench Configuration
# https://github.com/ml-rust/buildbench

[runner]
# Measured builds per system
iterations = 3
# Extra attempts per build after a non-zero exit or timeout
retries = 2
# Timeout for a single build
timeout = "300s"
# Grace window between SIGTERM and SIGKILL on timeout
kill_grace = "500ms"
# Resource sampling cadence
sample_interval = "10ms"
# What to sample: "self" (harness process) or "build" (the build's process group)
sample_target = "self"
# Run once before measuring; failures only warn (uncomment to enable)
# clean_command = "yarn clean"

[output]
# Terminal output format: human, json
format = "human"
# Directory for build-comparison.json and build-comparison.html
directory = "target/buildbench"

[[systems]]
name = "vite"
command = "yarn build"
working_directory = "packages/app-vite"
tool = "vite"
# dist_dir = "dist"
# cache_dir = "node_modules/.vite"
# artifact = { kind = "manifest", path = "dist/.vite/manifest.json" }

[[systems]]
name = "webpack"
command = "yarn build"
working_directory = "packages/app-webpack"
tool = "webpack"
# artifact = { kind = "stats-dump", path = "stats.json" }
"#
        .to_string()
    }

    /// Parse duration string (e.g., "300s", "500ms", "5m")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            bail!("Empty duration string");
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            bail!("Invalid duration: {}", s);
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => bail!("Unknown duration unit: {}", unit_part),
        };

        Ok(Duration::from_nanos((value * multiplier as f64).round() as u64))
    }
}
