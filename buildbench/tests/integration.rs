//! Integration tests for BuildBench
//!
//! These tests run real shell "builds" end to end: process launch, sampling,
//! cache and bundle analysis, report generation and output files.

use buildbench::prelude::*;
use buildbench::{BuildCommand, ProcessRunner, RunError, SampleTarget};
use std::path::Path;
use std::time::Duration;

const CONFIG: &str = r#"
[runner]
iterations = 2
retries = 1
timeout = "30s"
kill_grace = "200ms"
sample_interval = "5ms"
sample_target = "self"

[output]
directory = "out"

[[systems]]
name = "vite"
tool = "vite"
working_directory = "vite-app"
command = "sleep 0.05 && mkdir -p dist/.vite dist/assets node_modules/.vite && printf 'aaaaaaaaaa' > dist/assets/index.js && printf 'bbbbb' > dist/assets/index.css && printf '<html></html>' > dist/index.html && printf '{\"index.html\":{\"file\":\"assets/index.js\",\"css\":[\"assets/index.css\"]}}' > dist/.vite/manifest.json && date +%N >> node_modules/.vite/deps.txt"

[[systems]]
name = "webpack"
tool = "webpack"
working_directory = "webpack-app"
command = "sleep 0.05 && mkdir -p dist node_modules/.cache && printf 'cccccccccccccccccccc' > dist/main.js && printf '{\"assets\":[{\"name\":\"main.js\",\"size\":20},{\"name\":\"index.html\",\"size\":13}],\"time\":42}' > stats.json && date +%N >> node_modules/.cache/pack.txt"
"#;

fn load_config(root: &Path) -> BuildBenchConfig {
    std::fs::create_dir_all(root.join("vite-app")).unwrap();
    std::fs::create_dir_all(root.join("webpack-app")).unwrap();
    let path = root.join("buildbench.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let config = BuildBenchConfig::load(&path).unwrap();
    config.validate().unwrap();
    config
}

fn run(config: &BuildBenchConfig) -> ComparisonReport {
    let exec = config.execution_config().unwrap();
    let targets: Vec<SystemTarget> = config
        .systems
        .iter()
        .map(|s| s.target(&config.root))
        .collect();
    let orchestrator = BenchmarkOrchestrator::new(exec.instrumented_executor(), &exec);
    compare(&orchestrator, &targets, &exec)
}

/// Two shell builds measured end to end
#[test]
fn test_end_to_end_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(dir.path());

    let report = run(&config);

    assert!(report.is_complete(), "failures: {:?}", report.failures);
    assert_eq!(report.results.len(), 2);

    let vite = report.result("vite").unwrap();
    assert_eq!(vite.durations_ms.len(), 2);
    assert!(vite.durations_ms.iter().all(|&d| d >= 50));
    assert_eq!(vite.attempts, 2);
    assert_eq!(vite.build_time_stats.sample_count, 2);
    // HTML entry is not a chunk; sizes come from disk
    assert_eq!(vite.chunks.len(), 2);
    assert_eq!(vite.chunks["assets/index.js"].size_bytes, 10);
    assert_eq!(vite.chunk_total_bytes, 15);
    // .vite metadata is hidden and not counted
    assert_eq!(vite.dist_size_bytes, 10 + 5 + 13);
    assert_eq!(vite.cache_before.file_count, 0);
    assert_eq!(vite.cache_after.file_count, 1);
    assert!(vite.cache_growth.size_bytes > 0);
    assert!(vite.memory_timelines.iter().any(|t| !t.is_empty()));
    assert!(vite.peak_memory().rss > 0);

    let webpack = report.result("webpack").unwrap();
    assert_eq!(webpack.chunks.len(), 1);
    assert_eq!(webpack.chunk_total_bytes, 20);
    assert_eq!(webpack.tool_reported_time_ms, Some(42));

    assert_eq!(report.summary.entries.len(), 2);
    assert!(report.summary.entries[0].is_baseline);
    assert!(report.summary.fastest.is_some());

    let human = format_human_output(&report);
    assert!(human.contains("Build Comparison Results:"));
    assert!(human.contains("Chunk Analysis"));

    let paths = write_outputs(&report, &config.output_dir()).unwrap();
    assert!(paths.json.starts_with(dir.path().join("out")));
    let data: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(data["results"][1]["system"], "webpack");
    let html = std::fs::read_to_string(paths.html.unwrap()).unwrap();
    assert!(html.contains("<canvas"));
}

/// A broken second system yields a partial report and no HTML
#[test]
fn test_failing_system_produces_partial_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = load_config(dir.path());
    config.systems[1].command = "echo broken >&2; exit 3".to_string();

    let report = run(&config);

    assert!(!report.is_complete());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].system, "webpack");
    assert_eq!(report.failures[0].kind, "build-failed");
    assert_eq!(report.failures[0].attempts, 2);

    let paths = write_outputs(&report, &config.output_dir()).unwrap();
    assert!(paths.json.exists());
    assert!(paths.html.is_none());
}

/// A command that cannot be launched fails without retries
#[test]
fn test_missing_working_directory_is_a_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = load_config(dir.path());
    config.systems[0].working_directory = "does-not-exist".into();

    let report = run(&config);

    assert!(report.results.is_empty());
    assert_eq!(report.failures[0].system, "vite");
    assert_eq!(report.failures[0].kind, "spawn");
    assert_eq!(report.failures[0].attempts, 1);
    // Measurement stops at the first failure
    assert_eq!(report.failures[1].system, "webpack");
    assert_eq!(report.failures[1].kind, "skipped");
}

/// A program missing from PATH is a launch failure, not a retried build
#[test]
fn test_missing_program_is_a_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = load_config(dir.path());
    config.systems[0].command = "NODE_ENV=production buildbench-no-such-tool build".to_string();

    let report = run(&config);

    assert_eq!(report.failures[0].system, "vite");
    assert_eq!(report.failures[0].kind, "spawn");
    assert_eq!(report.failures[0].attempts, 1);
}

/// A build that starts and then exits 127 is a failed build and is retried
#[test]
fn test_exit_127_inside_build_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = load_config(dir.path());
    config.systems[1].command = "sleep 0.01; sh -c 'exit 127'".to_string();

    let report = run(&config);

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.failures[0].system, "webpack");
    assert_eq!(report.failures[0].kind, "build-failed");
    assert_eq!(report.failures[0].attempts, 2);
}

#[test]
fn test_timeout_kills_build() {
    let runner = ProcessRunner::new(Duration::from_millis(200))
        .with_kill_grace(Duration::from_millis(100));
    let cmd = BuildCommand::new("sleep 30", std::env::temp_dir());

    let started = std::time::Instant::now();
    let err = runner.run(&cmd).unwrap_err();

    assert!(matches!(err, RunError::TimeoutExceeded { timeout_ms: 200 }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// Background children of a timed-out build must not outlive it
#[cfg(target_os = "linux")]
#[test]
fn test_timeout_leaves_no_orphans() {
    let marker = "31.4159";
    let runner = ProcessRunner::new(Duration::from_millis(200))
        .with_kill_grace(Duration::from_millis(100));
    let cmd = BuildCommand::new(
        format!("sleep {marker} & sleep {marker}"),
        std::env::temp_dir(),
    );

    assert!(runner.run(&cmd).is_err());
    std::thread::sleep(Duration::from_millis(200));

    let survivors: Vec<String> = std::fs::read_dir("/proc")
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|e| {
            let pid = e.file_name().to_string_lossy().to_string();
            let cmdline = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
            let cmdline = String::from_utf8_lossy(&cmdline).replace('\0', " ");
            if !cmdline.starts_with("sleep ") || !cmdline.contains(marker) {
                return None;
            }
            let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
            let state = stat[stat.rfind(')')? + 1..].split_whitespace().next()?.to_string();
            (state != "Z").then_some(pid)
        })
        .collect();

    assert!(survivors.is_empty(), "live orphans: {:?}", survivors);
}

#[test]
fn test_sample_target_build_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = load_config(dir.path());
    config.runner.sample_target = SampleTarget::Build;
    config.runner.iterations = 1;
    config.systems.truncate(1);

    let report = run(&config);

    assert!(report.is_complete());
    assert_eq!(report.meta.config.sample_target, "build");
    assert_eq!(report.results[0].durations_ms.len(), 1);
}
