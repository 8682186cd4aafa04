//! Resource Probes
//!
//! A probe reads cumulative CPU time and current memory counters for whatever
//! it monitors. The sampler turns successive readings into per-tick samples.
//!
//! Memory counters come from Linux `statm` and degrade on other platforms to
//! whatever `getrusage` can provide.

use std::time::Duration;

/// Memory counters in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    /// Private resident bytes (resident minus shared)
    pub heap_used: u64,
    /// Data + stack segment bytes
    pub heap_total: u64,
    /// Resident set size
    pub rss: u64,
    /// Shared resident bytes
    pub external: u64,
}

impl std::ops::AddAssign for MemoryCounters {
    fn add_assign(&mut self, other: Self) {
        self.heap_used += other.heap_used;
        self.heap_total += other.heap_total;
        self.rss += other.rss;
        self.external += other.external;
    }
}

/// One probe reading: memory now, CPU time consumed so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceReading {
    /// Memory counters at the time of the reading
    pub memory: MemoryCounters,
    /// Cumulative user-mode CPU time
    pub cpu_user: Duration,
    /// Cumulative kernel-mode CPU time
    pub cpu_system: Duration,
}

/// Source of resource readings for the sampler thread
pub trait ResourceProbe: Send {
    /// Take one reading. Errors skip the current tick.
    fn read(&mut self) -> std::io::Result<ResourceReading>;
}

fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}

/// Parse `/proc/<pid>/statm` content into byte counters
fn parse_statm(content: &str, page_size: u64) -> Option<MemoryCounters> {
    let fields: Vec<u64> = content
        .split_whitespace()
        .map(|f| f.parse().ok())
        .collect::<Option<Vec<u64>>>()?;
    // size resident shared text lib data dt
    if fields.len() < 6 {
        return None;
    }
    let resident = fields[1];
    let shared = fields[2];
    let data = fields[5];

    Some(MemoryCounters {
        heap_used: resident.saturating_sub(shared) * page_size,
        heap_total: data * page_size,
        rss: resident * page_size,
        external: shared * page_size,
    })
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}

/// Probe for the monitoring process's own counters.
///
/// This is the process-wide view the harness itself has, not a per-child
/// inspection of the build.
#[derive(Debug)]
pub struct SelfProbe {
    page_size: u64,
}

impl SelfProbe {
    /// Probe of the calling process
    pub fn new() -> Self {
        Self {
            page_size: page_size(),
        }
    }
}

impl Default for SelfProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SelfProbe {
    fn read(&mut self) -> std::io::Result<ResourceReading> {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }

        #[cfg(target_os = "linux")]
        let memory = {
            let content = std::fs::read_to_string("/proc/self/statm")?;
            parse_statm(&content, self.page_size).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed statm")
            })?
        };
        #[cfg(not(target_os = "linux"))]
        let memory = {
            // ru_maxrss is bytes on macOS; only the peak is available
            let rss = usage.ru_maxrss.max(0) as u64;
            MemoryCounters {
                rss,
                heap_used: rss,
                ..Default::default()
            }
        };

        Ok(ResourceReading {
            memory,
            cpu_user: timeval_to_duration(usage.ru_utime),
            cpu_system: timeval_to_duration(usage.ru_stime),
        })
    }
}

/// CPU fields of `/proc/<pid>/stat` for one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatCpu {
    pgrp: u32,
    /// utime + cutime, in clock ticks
    user_ticks: u64,
    /// stime + cstime, in clock ticks
    system_ticks: u64,
}

/// Parse `/proc/<pid>/stat`. The command name may contain spaces and
/// parentheses, so fields are counted from the last `)`.
fn parse_stat(content: &str) -> Option<StatCpu> {
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is field 3 (state)
    let field = |n: usize| -> Option<u64> { fields.get(n - 3)?.parse().ok() };

    Some(StatCpu {
        pgrp: field(5)? as u32,
        user_ticks: field(14)? + field(16)?,
        system_ticks: field(15)? + field(17)?,
    })
}

/// Probe summing every live process in a build's process group (Linux only).
///
/// CPU time of reaped children is included through their parent's
/// `cutime`/`cstime`, so the total stays continuous while the build forks.
#[derive(Debug)]
pub struct ProcessGroupProbe {
    pgid: u32,
    page_size: u64,
    clock_ticks: u64,
}

impl ProcessGroupProbe {
    /// Probe of every process whose group id is `pgid`
    pub fn new(pgid: u32) -> Self {
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        Self {
            pgid,
            page_size: page_size(),
            clock_ticks: if ticks > 0 { ticks as u64 } else { 100 },
        }
    }

    fn ticks_to_duration(&self, ticks: u64) -> Duration {
        Duration::from_nanos(ticks.saturating_mul(1_000_000_000) / self.clock_ticks)
    }
}

impl ResourceProbe for ProcessGroupProbe {
    #[cfg(target_os = "linux")]
    fn read(&mut self) -> std::io::Result<ResourceReading> {
        let mut memory = MemoryCounters::default();
        let mut user_ticks = 0u64;
        let mut system_ticks = 0u64;
        let mut members = 0usize;

        for entry in std::fs::read_dir("/proc")? {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name();
            let Some(pid) = name.to_str().filter(|n| n.bytes().all(|b| b.is_ascii_digit())) else {
                continue;
            };

            // Processes exit between listing and reading; skip them
            let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
                continue;
            };
            let Some(cpu) = parse_stat(&stat) else { continue };
            if cpu.pgrp != self.pgid {
                continue;
            }

            user_ticks += cpu.user_ticks;
            system_ticks += cpu.system_ticks;
            members += 1;

            if let Some(counters) = std::fs::read_to_string(format!("/proc/{pid}/statm"))
                .ok()
                .and_then(|c| parse_statm(&c, self.page_size))
            {
                memory += counters;
            }
        }

        if members == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("process group {} has no live members", self.pgid),
            ));
        }

        Ok(ResourceReading {
            memory,
            cpu_user: self.ticks_to_duration(user_ticks),
            cpu_system: self.ticks_to_duration(system_ticks),
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn read(&mut self) -> std::io::Result<ResourceReading> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process group sampling requires /proc",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statm() {
        let counters = parse_statm("1000 300 100 10 0 250 0\n", 4096).unwrap();
        assert_eq!(counters.rss, 300 * 4096);
        assert_eq!(counters.external, 100 * 4096);
        assert_eq!(counters.heap_used, 200 * 4096);
        assert_eq!(counters.heap_total, 250 * 4096);
    }

    #[test]
    fn test_parse_statm_rejects_garbage() {
        assert!(parse_statm("1 2 3", 4096).is_none());
        assert!(parse_statm("a b c d e f g", 4096).is_none());
    }

    #[test]
    fn test_parse_stat_with_spaces_in_comm() {
        // pid (comm) state ppid pgrp session tty tpgid flags minflt cminflt majflt cmajflt utime stime cutime cstime ...
        let line = "4242 (node (worker) 1) S 1 4240 4240 0 -1 4194560 100 0 0 0 50 20 7 3 20 0 1 0";
        let cpu = parse_stat(line).unwrap();
        assert_eq!(cpu.pgrp, 4240);
        assert_eq!(cpu.user_ticks, 57);
        assert_eq!(cpu.system_ticks, 23);
    }

    #[test]
    fn test_self_probe_reads() {
        let mut probe = SelfProbe::new();
        let reading = probe.read().unwrap();
        assert!(reading.memory.rss > 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_group_probe_without_members() {
        // pgid values this large are never allocated
        let mut probe = ProcessGroupProbe::new(u32::MAX - 7);
        assert!(probe.read().is_err());
    }

    #[test]
    fn test_ticks_to_duration() {
        let probe = ProcessGroupProbe {
            pgid: 1,
            page_size: 4096,
            clock_ticks: 100,
        };
        assert_eq!(probe.ticks_to_duration(150), Duration::from_millis(1500));
    }
}
