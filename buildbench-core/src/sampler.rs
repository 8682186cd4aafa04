//! Telemetry Sampler
//!
//! Samples a [`ResourceProbe`] at a fixed cadence on a dedicated thread while
//! a build runs. The sampler owns its timeline buffer; `stop()` wakes the
//! thread through a channel, joins it, and hands the buffer back.
//!
//! ## Tick scheduling
//!
//! ```text
//! seed reading (process start)
//!     │
//!     ▼
//! ┌────────────┐   stop signal   ┌──────────┐
//! │ wait until │ ──────────────▶ │  return  │
//! │  deadline  │                 │ timeline │
//! └─────┬──────┘                 └──────────┘
//!       │ deadline reached
//!       ▼
//!  read probe → CPU delta vs previous reading → push sample
//!       │
//!       ▼
//!  next deadline += interval (missed deadlines are skipped, never queued)
//! ```

use crate::probe::{ResourceProbe, ResourceReading};
use crate::run::ResourceSample;
use chrono::Utc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Sampler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Time between ticks
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(crate::DEFAULT_SAMPLE_INTERVAL_MS),
        }
    }
}

/// Fixed-cadence resource sampler running on its own thread
pub struct TelemetrySampler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<Vec<ResourceSample>>>,
}

impl TelemetrySampler {
    /// Start sampling immediately.
    ///
    /// `started` is the moment the monitored process started; sample
    /// timestamps are measured from it and the first CPU delta is seeded
    /// from a reading taken now.
    pub fn start(
        probe: Box<dyn ResourceProbe>,
        config: SamplerConfig,
        started: Instant,
    ) -> std::io::Result<Self> {
        let interval = config.interval.max(Duration::from_millis(1));
        let epoch_ms_at_start = (Utc::now().timestamp_millis().max(0) as u64)
            .saturating_sub(started.elapsed().as_millis() as u64);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("buildbench-sampler".to_string())
            .spawn(move || {
                sample_loop(probe, interval, started, epoch_ms_at_start, |wait| {
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => false,
                        // stop requested, or the sampler handle was dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                    }
                })
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop sampling and return the ordered timeline.
    ///
    /// Calling `stop` again returns an empty timeline.
    pub fn stop(&mut self) -> Vec<ResourceSample> {
        let Some(handle) = self.handle.take() else {
            return Vec::new();
        };
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        handle.join().unwrap_or_else(|_| {
            warn!("Sampler thread panicked; discarding its timeline");
            Vec::new()
        })
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// CPU percentages between two readings over `wall` elapsed time
fn cpu_percentages(previous: &ResourceReading, current: &ResourceReading, wall: Duration) -> (f64, f64) {
    let wall = wall.as_secs_f64();
    if wall <= 0.0 {
        return (0.0, 0.0);
    }
    let user = current.cpu_user.saturating_sub(previous.cpu_user).as_secs_f64();
    let system = current
        .cpu_system
        .saturating_sub(previous.cpu_system)
        .as_secs_f64();
    (user / wall * 100.0, system / wall * 100.0)
}

/// Next deadline at or after `next_tick` that is still in the future, and the
/// number of deadlines skipped to reach it. Skipped ticks are never queued.
fn advance_tick(next_tick: Instant, now: Instant, interval: Duration) -> (Instant, u64) {
    if next_tick > now {
        return (next_tick, 0);
    }
    let behind = now.duration_since(next_tick).as_nanos();
    let interval_ns = interval.as_nanos().max(1);
    let skipped = u64::try_from(behind / interval_ns + 1).unwrap_or(u64::MAX);
    // Phase of `now` within the current interval, always <= behind
    let phase = u64::try_from(behind % interval_ns).unwrap_or(u64::MAX);
    (now - Duration::from_nanos(phase) + interval, skipped)
}

/// The sampling loop. `wait_for_stop` blocks for at most the given duration
/// and returns `true` once sampling should end.
fn sample_loop(
    mut probe: Box<dyn ResourceProbe>,
    interval: Duration,
    started: Instant,
    epoch_ms_at_start: u64,
    mut wait_for_stop: impl FnMut(Duration) -> bool,
) -> Vec<ResourceSample> {
    let mut samples = Vec::new();
    let mut previous = probe.read().ok().map(|reading| (reading, Instant::now()));
    let mut last_timestamp: Option<u64> = None;
    let mut next_tick = Instant::now() + interval;
    let mut skipped_ticks = 0u64;

    loop {
        if wait_for_stop(next_tick.saturating_duration_since(Instant::now())) {
            break;
        }

        let now = Instant::now();
        match probe.read() {
            Ok(reading) => {
                let timestamp_ms =
                    epoch_ms_at_start + now.saturating_duration_since(started).as_millis() as u64;

                if last_timestamp.is_none_or(|last| timestamp_ms > last) {
                    let (cpu_user_pct, cpu_system_pct) = match &previous {
                        Some((prev, at)) => cpu_percentages(prev, &reading, now - *at),
                        None => (0.0, 0.0),
                    };
                    samples.push(ResourceSample {
                        timestamp_ms,
                        heap_used: reading.memory.heap_used,
                        heap_total: reading.memory.heap_total,
                        rss: reading.memory.rss,
                        external: reading.memory.external,
                        cpu_user_pct,
                        cpu_system_pct,
                    });
                    last_timestamp = Some(timestamp_ms);
                }
                previous = Some((reading, now));
            }
            Err(e) => trace!(error = %e, "Probe read failed, skipping tick"),
        }

        let (tick, skipped) = advance_tick(next_tick + interval, Instant::now(), interval);
        next_tick = tick;
        skipped_ticks = skipped_ticks.saturating_add(skipped);
    }

    debug!(samples = samples.len(), skipped_ticks, "Sampler stopped");
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MemoryCounters;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Probe that burns a fixed amount of "CPU" per read
    struct FakeProbe {
        reads: Arc<AtomicU64>,
        cpu_per_read: Duration,
        read_delay: Duration,
    }

    impl FakeProbe {
        fn new(reads: Arc<AtomicU64>) -> Self {
            Self {
                reads,
                cpu_per_read: Duration::from_millis(5),
                read_delay: Duration::ZERO,
            }
        }
    }

    impl ResourceProbe for FakeProbe {
        fn read(&mut self) -> std::io::Result<ResourceReading> {
            if !self.read_delay.is_zero() {
                std::thread::sleep(self.read_delay);
            }
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ResourceReading {
                memory: MemoryCounters {
                    heap_used: n * 10,
                    heap_total: n * 20,
                    rss: n * 100,
                    external: 1,
                },
                cpu_user: self.cpu_per_read * n as u32,
                cpu_system: Duration::ZERO,
            })
        }
    }

    struct FailingProbe;

    impl ResourceProbe for FailingProbe {
        fn read(&mut self) -> std::io::Result<ResourceReading> {
            Err(std::io::Error::other("no counters"))
        }
    }

    fn config(ms: u64) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_samples_are_ordered_and_increasing() {
        let reads = Arc::new(AtomicU64::new(0));
        let probe = Box::new(FakeProbe::new(reads.clone()));
        let mut sampler = TelemetrySampler::start(probe, config(10), Instant::now()).unwrap();

        std::thread::sleep(Duration::from_millis(150));
        let samples = sampler.stop();

        assert!(samples.len() >= 3, "got {} samples", samples.len());
        assert!(samples.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        assert!(samples.windows(2).all(|w| w[0].rss < w[1].rss));
    }

    #[test]
    fn test_first_tick_is_seeded() {
        let reads = Arc::new(AtomicU64::new(0));
        let probe = Box::new(FakeProbe::new(reads));
        let mut sampler = TelemetrySampler::start(probe, config(10), Instant::now()).unwrap();

        std::thread::sleep(Duration::from_millis(60));
        let samples = sampler.stop();

        assert!(!samples.is_empty());
        assert!(samples[0].cpu_user_pct > 0.0);
        assert_eq!(samples[0].cpu_system_pct, 0.0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let reads = Arc::new(AtomicU64::new(0));
        let probe = Box::new(FakeProbe::new(reads));
        let mut sampler = TelemetrySampler::start(probe, config(10), Instant::now()).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        let _ = sampler.stop();
        assert!(sampler.stop().is_empty());
    }

    #[test]
    fn test_stop_halts_sampling() {
        let reads = Arc::new(AtomicU64::new(0));
        let probe = Box::new(FakeProbe::new(reads.clone()));
        let mut sampler = TelemetrySampler::start(probe, config(5), Instant::now()).unwrap();

        std::thread::sleep(Duration::from_millis(40));
        let _ = sampler.stop();
        let after_stop = reads.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(reads.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_slow_probe_skips_ticks() {
        let reads = Arc::new(AtomicU64::new(0));
        let mut probe = FakeProbe::new(reads);
        probe.read_delay = Duration::from_millis(25);
        let mut sampler =
            TelemetrySampler::start(Box::new(probe), config(10), Instant::now()).unwrap();

        std::thread::sleep(Duration::from_millis(250));
        let samples = sampler.stop();

        // One read per ~25ms at most; missed 10ms ticks are not replayed
        assert!(samples.len() <= 12, "got {} samples", samples.len());
        assert!(samples.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }

    #[test]
    fn test_failing_probe_yields_empty_timeline() {
        let mut sampler =
            TelemetrySampler::start(Box::new(FailingProbe), config(5), Instant::now()).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(sampler.stop().is_empty());
    }

    #[test]
    fn test_cpu_percentages() {
        let prev = ResourceReading {
            cpu_user: Duration::from_millis(100),
            cpu_system: Duration::from_millis(10),
            ..Default::default()
        };
        let cur = ResourceReading {
            cpu_user: Duration::from_millis(150),
            cpu_system: Duration::from_millis(20),
            ..Default::default()
        };
        let (user, system) = cpu_percentages(&prev, &cur, Duration::from_millis(100));
        assert!((user - 50.0).abs() < 1e-9);
        assert!((system - 10.0).abs() < 1e-9);

        assert_eq!(cpu_percentages(&prev, &cur, Duration::ZERO), (0.0, 0.0));
    }

    #[test]
    fn test_advance_tick() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        // On time: nothing skipped
        assert_eq!(advance_tick(t0 + ms(10), t0, ms(10)), (t0 + ms(10), 0));
        // Deadline reached exactly: move one interval on
        assert_eq!(advance_tick(t0, t0, ms(10)), (t0 + ms(10), 1));
        // 25ms behind a 10ms cadence: three deadlines skipped, phase kept
        assert_eq!(advance_tick(t0, t0 + ms(25), ms(10)), (t0 + ms(30), 3));
    }

    #[test]
    fn test_advance_tick_counts_beyond_u32() {
        let t0 = Instant::now();
        let behind = Duration::from_secs(10);
        let (tick, skipped) = advance_tick(t0, t0 + behind, Duration::from_nanos(1));
        assert_eq!(skipped, 10_000_000_001);
        assert_eq!(tick, t0 + behind + Duration::from_nanos(1));
    }
}
