//! Live host telemetry via `sysinfo`, throttled to one real refresh per
//! check interval.

use std::time::{Duration, Instant};

use sysinfo::{Disks, System};

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct TelemetrySnapshot {
    pub cpu_fraction: f64,
    pub mem_fraction: f64,
    pub disk_percent_used: f64,
    pub total_memory_bytes: u64,
    pub logical_cpus: usize,
}

enum Source {
    Live(System),
    Fixed(TelemetrySnapshot),
}

pub struct Telemetry {
    source: Source,
    last_sample: Option<(Instant, TelemetrySnapshot)>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            source: Source::Live(System::new_all()),
            last_sample: None,
        }
    }

    /// Test/deterministic-call seam: every `sample()` call returns the same
    /// fixed snapshot, bypassing `sysinfo` and the throttle entirely.
    pub fn with_fixed_snapshot(snapshot: TelemetrySnapshot) -> Self {
        Self {
            source: Source::Fixed(snapshot),
            last_sample: None,
        }
    }

    /// Returns a fresh snapshot, or the cached one if sampled within the
    /// last [`CHECK_INTERVAL`].
    pub fn sample(&mut self) -> TelemetrySnapshot {
        if let Source::Fixed(snapshot) = &self.source {
            return *snapshot;
        }

        if let Some((at, snapshot)) = self.last_sample {
            if at.elapsed() < CHECK_INTERVAL {
                return snapshot;
            }
        }

        let snapshot = match &mut self.source {
            Source::Live(sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();

                let logical_cpus = sys.cpus().len().max(1);
                let cpu_fraction = (sys.global_cpu_info().cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);

                let total_memory_bytes = sys.total_memory() * 1024;
                let used_memory = sys.used_memory() * 1024;
                let mem_fraction = if total_memory_bytes > 0 {
                    (used_memory as f64 / total_memory_bytes as f64).clamp(0.0, 1.0)
                } else {
                    0.0
                };

                let disk_percent_used = Disks::new_with_refreshed_list()
                    .list()
                    .iter()
                    .map(|d| {
                        let total = d.total_space();
                        let avail = d.available_space();
                        if total == 0 {
                            0.0
                        } else {
                            100.0 * (1.0 - (avail as f64 / total as f64))
                        }
                    })
                    .fold(0.0_f64, f64::max);

                TelemetrySnapshot {
                    cpu_fraction,
                    mem_fraction,
                    disk_percent_used,
                    total_memory_bytes,
                    logical_cpus,
                }
            }
            Source::Fixed(snapshot) => *snapshot,
        };

        self.last_sample = Some((Instant::now(), snapshot));
        snapshot
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_snapshot_is_stable_across_calls() {
        let fixed = TelemetrySnapshot {
            cpu_fraction: 0.5,
            mem_fraction: 0.5,
            disk_percent_used: 50.0,
            total_memory_bytes: 1024,
            logical_cpus: 4,
        };
        let mut telemetry = Telemetry::with_fixed_snapshot(fixed);
        let a = telemetry.sample();
        let b = telemetry.sample();
        assert_eq!(a.cpu_fraction, b.cpu_fraction);
        assert_eq!(a.logical_cpus, 4);
    }

    #[test]
    fn live_sample_produces_values_in_range() {
        let mut telemetry = Telemetry::new();
        let snapshot = telemetry.sample();
        assert!(snapshot.cpu_fraction >= 0.0 && snapshot.cpu_fraction <= 1.0);
        assert!(snapshot.mem_fraction >= 0.0 && snapshot.mem_fraction <= 1.0);
        assert!(snapshot.logical_cpus >= 1);
    }
}
