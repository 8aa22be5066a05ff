//! Per-minute stats sampling (spec.md §4.K): an `AlignedScheduler` wakes on
//! minute boundaries and hands back a `StatsSample` that binaries log at
//! `info` level and feed into a small in-process `StatsLog` ring, so a
//! future diagnostic surface could read recent samples without
//! re-deriving them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::cpu;

const DEFAULT_LOG_CAPACITY: usize = 120;

/// One minute's worth of activity for a stream-node process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSample {
    pub events_in_window: u64,
    pub cpu_user: Option<Duration>,
    pub cpu_sys: Option<Duration>,
    pub wall_elapsed: Duration,
    /// `(cpu_user + cpu_sys) / wall_elapsed`, `None` when CPU sampling is
    /// unavailable on this target.
    pub utilization: Option<f64>,
    pub events_per_sec: f64,
}

/// Counts events as they are published; read and reset by the scheduler
/// once per tick. Cheap enough to bump from any publish path.
#[derive(Debug, Default)]
pub struct EventCounter(AtomicU64);

impl EventCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn increment(&self, by: u64) {
        self.0.fetch_add(by, Ordering::Relaxed);
    }

    fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Sleeps until the next minute boundary, then reports one `StatsSample`
/// covering the window since the previous tick.
pub struct AlignedScheduler {
    last_tick: Instant,
    last_cpu: Option<cpu::CpuTicks>,
}

impl AlignedScheduler {
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
            last_cpu: cpu::sample(),
        }
    }

    /// Duration until the next minute boundary, measured from the system
    /// wall clock (`now - now % 60s`), per spec.md §4.K / §9.
    fn duration_until_next_boundary() -> Duration {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs_into_minute = now.as_secs() % 60;
        let remainder_nanos = now.subsec_nanos();
        let elapsed_in_minute =
            Duration::from_secs(secs_into_minute) + Duration::from_nanos(u64::from(remainder_nanos));
        Duration::from_secs(60).saturating_sub(elapsed_in_minute)
    }

    /// Sleeps to the next minute boundary and returns the sample for the
    /// elapsed window, given the event counter to drain.
    pub async fn tick(&mut self, counter: &EventCounter) -> StatsSample {
        sleep(Self::duration_until_next_boundary()).await;
        self.sample(counter)
    }

    fn sample(&mut self, counter: &EventCounter) -> StatsSample {
        let now = Instant::now();
        let wall_elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;

        let events_in_window = counter.take();
        let current_cpu = cpu::sample();
        let tps = cpu::ticks_per_second();

        let (cpu_user, cpu_sys) = match (self.last_cpu, current_cpu) {
            (Some(prev), Some(cur)) => (
                Some(Duration::from_secs_f64(
                    cur.user.saturating_sub(prev.user) as f64 / tps as f64,
                )),
                Some(Duration::from_secs_f64(
                    cur.sys.saturating_sub(prev.sys) as f64 / tps as f64,
                )),
            ),
            _ => (None, None),
        };
        self.last_cpu = current_cpu;

        let utilization = match (cpu_user, cpu_sys) {
            (Some(u), Some(s)) if wall_elapsed > Duration::ZERO => {
                Some((u + s).as_secs_f64() / wall_elapsed.as_secs_f64())
            }
            _ => None,
        };
        let events_per_sec = if wall_elapsed > Duration::ZERO {
            events_in_window as f64 / wall_elapsed.as_secs_f64()
        } else {
            0.0
        };

        StatsSample {
            events_in_window,
            cpu_user,
            cpu_sys,
            wall_elapsed,
            utilization,
            events_per_sec,
        }
    }
}

impl Default for AlignedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs each sample at `info` and keeps a bounded in-process history plus a
/// broadcast feed, so a diagnostic surface can tail recent samples without
/// re-deriving them.
pub struct StatsLog {
    buffer: Mutex<VecDeque<StatsSample>>,
    capacity: usize,
    sender: broadcast::Sender<StatsSample>,
}

impl StatsLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatsSample> {
        self.sender.subscribe()
    }

    pub fn record(&self, sample: StatsSample) {
        tracing::info!(
            events_in_window = sample.events_in_window,
            cpu_user_ms = sample.cpu_user.map(|d| d.as_millis()),
            cpu_sys_ms = sample.cpu_sys.map(|d| d.as_millis()),
            wall_elapsed_ms = sample.wall_elapsed.as_millis(),
            utilization = sample.utilization,
            events_per_sec = sample.events_per_sec,
            "stats sample"
        );

        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(sample);
        drop(buffer);

        // No subscribers is the common case when nothing is tailing the feed.
        let _ = self.sender.send(sample);
    }

    pub fn entries(&self) -> Vec<StatsSample> {
        self.buffer.lock().unwrap().iter().copied().collect()
    }
}

impl Default for StatsLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
