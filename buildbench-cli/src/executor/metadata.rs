//! Host Metadata
//!
//! Describes the machine and checkout a comparison ran on. Values that cannot
//! be read (non-Linux hosts, no git) are reported as "Unknown", 0 or absent.

use super::execution::ExecutionConfig;
use buildbench_report::{ReportMeta, SCHEMA_VERSION, SystemInfo};
use chrono::Utc;

const UNKNOWN: &str = "Unknown";

/// Report metadata for a comparison run with `config`
pub fn build_report_meta(config: &ExecutionConfig) -> ReportMeta {
    let total_kib = proc_value("/proc/meminfo", "MemTotal")
        .and_then(|v| v.split_whitespace().next()?.parse::<u64>().ok());

    let system = SystemInfo {
        os: std::env::consts::OS.to_string(),
        os_version: kernel_release().unwrap_or_else(|| UNKNOWN.to_string()),
        arch: std::env::consts::ARCH.to_string(),
        cpu: proc_value("/proc/cpuinfo", "model name").unwrap_or_else(|| UNKNOWN.to_string()),
        cpu_cores: std::thread::available_parallelism().map_or(1, |n| n.get() as u32),
        memory_gb: total_kib.map_or(0.0, |kib| kib as f64 / (1024.0 * 1024.0)),
    };

    ReportMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        git_commit: git_output(&["rev-parse", "HEAD"]),
        git_branch: git_output(&["rev-parse", "--abbrev-ref", "HEAD"]),
        system,
        config: config.report_config(),
    }
}

/// Trimmed stdout of a successful git invocation
fn git_output(args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .stderr(std::process::Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Value of the first `key: value` line in a /proc file
fn proc_value(path: &str, key: &str) -> Option<String> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let content = std::fs::read_to_string(path).ok()?;
    parse_keyed_line(&content, key)
}

fn parse_keyed_line(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == key).then(|| value.trim().to_string())
    })
}

fn kernel_release() -> Option<String> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .ok()
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_meta() {
        let meta = build_report_meta(&ExecutionConfig::default());
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert!(meta.system.cpu_cores >= 1);
        assert_eq!(meta.system.os, std::env::consts::OS);
        assert_eq!(meta.config.iterations, 3);
        assert!(meta.git_commit.as_deref().is_none_or(|c| !c.is_empty()));
    }

    #[test]
    fn test_parse_keyed_line() {
        let meminfo = "MemTotal:       16318480 kB\nMemFree:         1200000 kB\n";
        assert_eq!(parse_keyed_line(meminfo, "MemTotal").unwrap(), "16318480 kB");

        let cpuinfo = "processor\t: 0\nmodel name\t: AMD Ryzen 9 7950X 16-Core Processor\n";
        assert_eq!(
            parse_keyed_line(cpuinfo, "model name").unwrap(),
            "AMD Ryzen 9 7950X 16-Core Processor"
        );
        assert!(parse_keyed_line(cpuinfo, "flags").is_none());
    }
}
