//! Adaptive resource manager.
//!
//! Classifies the host's current load from live telemetry and produces
//! CPU-affinity / nice-level / cache-budget hints.

mod config;
mod telemetry;

pub use config::ResourceConfig;
pub use telemetry::{Telemetry, TelemetrySnapshot};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::ArtifactCache;
use crate::errors::SafeSpaceResult;

/// Host load classification driving every scaling decision in this module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadClass {
    Light,
    Medium,
    Heavy,
}

impl WorkloadClass {
    pub fn from_telemetry(cpu_fraction: f64, mem_fraction: f64) -> Self {
        if cpu_fraction > 0.7 || mem_fraction > 0.8 {
            WorkloadClass::Heavy
        } else if cpu_fraction > 0.3 || mem_fraction > 0.5 {
            WorkloadClass::Medium
        } else {
            WorkloadClass::Light
        }
    }
}

/// Which core pool a hint is requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreKind {
    Performance,
    Efficiency,
}

/// Resource limits recommended for a launched workload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_bytes: u64,
    pub cpus: u32,
    pub io_weight: u32,
}

pub struct ResourceManager {
    config: ResourceConfig,
    telemetry: Telemetry,
}

impl ResourceManager {
    /// Load the persisted config from `<cache>/resource_config.json`,
    /// probing the system to create one if absent.
    pub fn load_or_probe(cache_dir: &std::path::Path) -> SafeSpaceResult<Self> {
        let path = cache_dir.join("resource_config.json");
        let config = ResourceConfig::load_or_probe(&path)?;
        Ok(Self {
            config,
            telemetry: Telemetry::new(),
        })
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn workload_class(&mut self) -> WorkloadClass {
        let snapshot = self.telemetry.sample();
        WorkloadClass::from_telemetry(snapshot.cpu_fraction, snapshot.mem_fraction)
    }

    /// CPU indices recommended for `kind`, halved under `Heavy` load.
    pub fn optimize_cores(&mut self, kind: CoreKind) -> Vec<usize> {
        let class = self.workload_class();
        let (perf, eff) = (self.config.performance_cores, self.config.efficiency_cores);

        let mut indices: Vec<usize> = match kind {
            CoreKind::Performance => (0..perf).collect(),
            CoreKind::Efficiency => (perf..perf + eff).collect(),
        };

        if class == WorkloadClass::Heavy {
            indices.truncate((indices.len() / 2).max(1));
        }
        indices
    }

    /// `nice` level for `kind` under the current workload class: 0/10/5/15
    /// keyed by (class, kind).
    pub fn niceness(&mut self, kind: CoreKind) -> i32 {
        match (self.workload_class(), kind) {
            (WorkloadClass::Light, CoreKind::Performance) => 0,
            (WorkloadClass::Light, CoreKind::Efficiency) => 10,
            (WorkloadClass::Medium, CoreKind::Performance) => 5,
            (WorkloadClass::Medium, CoreKind::Efficiency) => 10,
            (WorkloadClass::Heavy, CoreKind::Performance) => 5,
            (WorkloadClass::Heavy, CoreKind::Efficiency) => 15,
        }
    }

    /// Prefix `cmdline` with `taskset -c <csv>` on Linux and `nice -n
    /// <niceness>` on both platforms.
    pub fn run_optimized(&mut self, cmdline: &[String], kind: CoreKind) -> Vec<String> {
        let cores = self.optimize_cores(kind);
        let niceness = self.niceness(kind);

        let mut argv = Vec::new();
        argv.push("nice".to_string());
        argv.push("-n".to_string());
        argv.push(niceness.to_string());

        if cfg!(target_os = "linux") && !cores.is_empty() {
            let csv = cores.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",");
            argv.push("taskset".to_string());
            argv.push("-c".to_string());
            argv.push(csv);
        }

        argv.extend(cmdline.iter().cloned());
        argv
    }

    /// Scaled `{memory_bytes, cpus, io_weight}` recommendation: LIGHT 70%,
    /// MEDIUM 50%, HEAVY 30% of available, floored at 256 MiB / 1 cpu.
    pub fn get_recommended_resource_limits(&mut self) -> ResourceLimits {
        let snapshot = self.telemetry.sample();
        let class = WorkloadClass::from_telemetry(snapshot.cpu_fraction, snapshot.mem_fraction);
        let fraction = match class {
            WorkloadClass::Light => 0.70,
            WorkloadClass::Medium => 0.50,
            WorkloadClass::Heavy => 0.30,
        };

        let memory_bytes = ((snapshot.total_memory_bytes as f64) * fraction) as u64;
        let cpus = (((snapshot.logical_cpus as f64) * fraction).round() as u32).max(1);
        const FLOOR_MEMORY: u64 = 256 * 1024 * 1024;

        ResourceLimits {
            memory_bytes: memory_bytes.max(FLOOR_MEMORY),
            cpus,
            io_weight: (fraction * 1000.0) as u32,
        }
    }

    /// Scale the persisted cache budget by disk-pressure: >85% used scales
    /// down toward 10% of the base budget, <70% scales up toward 2x
    /// (never above 20% of total RAM).
    pub fn adaptive_cache_limit(&mut self) -> u64 {
        let snapshot = self.telemetry.sample();
        let base = self.config.cache_byte_budget;
        let disk_pct = snapshot.disk_percent_used;

        let scale = if disk_pct > 85.0 {
            // Linear ramp: half the budget retained right at the 85%
            // pressure threshold, none left at 100% full.
            ((100.0 - disk_pct) / 30.0).clamp(0.0, 1.0)
        } else if disk_pct < 70.0 {
            let under = (70.0 - disk_pct).min(70.0);
            1.0 + (under / 70.0) * 1.0
        } else {
            1.0
        };

        let scaled = (base as f64 * scale) as u64;
        let ram_cap = (snapshot.total_memory_bytes as f64 * 0.20) as u64;
        scaled.min(ram_cap)
    }

    /// Evict the artifact cache down to the adaptive budget; falls back to
    /// raw mtime-oldest-first deletion if no cache handle is available.
    pub async fn cleanup_cache(&mut self, cache: Option<&ArtifactCache>, fallback_dir: &PathBuf) -> SafeSpaceResult<u64> {
        let target = self.adaptive_cache_limit();
        if let Some(cache) = cache {
            return cache.cleanup(target).await;
        }
        fallback_mtime_cleanup(fallback_dir, target)
    }
}

fn fallback_mtime_cleanup(dir: &std::path::Path, target_bytes: u64) -> SafeSpaceResult<u64> {
    let mut entries: Vec<(std::path::PathBuf, u64, std::time::SystemTime)> = Vec::new();
    let mut total = 0u64;

    for entry in std::fs::read_dir(dir)?.flatten() {
        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                total += meta.len();
                entries.push((entry.path(), meta.len(), mtime));
            }
        }
    }
    entries.sort_by_key(|(_, _, mtime)| *mtime);

    let mut freed = 0u64;
    for (path, size, _) in entries {
        if total <= target_bytes {
            break;
        }
        if std::fs::remove_file(&path).is_ok() {
            freed += size;
            total -= size;
        }
    }
    Ok(freed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_class_thresholds() {
        assert_eq!(WorkloadClass::from_telemetry(0.1, 0.1), WorkloadClass::Light);
        assert_eq!(WorkloadClass::from_telemetry(0.4, 0.1), WorkloadClass::Medium);
        assert_eq!(WorkloadClass::from_telemetry(0.1, 0.6), WorkloadClass::Medium);
        assert_eq!(WorkloadClass::from_telemetry(0.8, 0.1), WorkloadClass::Heavy);
        assert_eq!(WorkloadClass::from_telemetry(0.1, 0.9), WorkloadClass::Heavy);
    }

    #[test]
    fn adaptive_cache_limit_scales_down_under_disk_pressure() {
        let mut mgr = ResourceManager {
            config: ResourceConfig {
                performance_cores: 2,
                efficiency_cores: 2,
                cache_byte_budget: 100 * 1024 * 1024,
                cache_path: PathBuf::from("/tmp"),
            },
            telemetry: Telemetry::with_fixed_snapshot(TelemetrySnapshot {
                cpu_fraction: 0.1,
                mem_fraction: 0.1,
                disk_percent_used: 90.0,
                total_memory_bytes: 16 * 1024 * 1024 * 1024,
                logical_cpus: 8,
            }),
        };
        let limit = mgr.adaptive_cache_limit();
        assert!(limit < mgr.config.cache_byte_budget);
    }

    #[test]
    fn adaptive_cache_limit_shrinks_sharply_under_disk_pressure() {
        // 90% disk full, 100 MiB base budget: scale = (100-90)/30 = 0.333.
        let mut mgr = ResourceManager {
            config: ResourceConfig {
                performance_cores: 2,
                efficiency_cores: 2,
                cache_byte_budget: 100 * 1024 * 1024,
                cache_path: PathBuf::from("/tmp"),
            },
            telemetry: Telemetry::with_fixed_snapshot(TelemetrySnapshot {
                cpu_fraction: 0.1,
                mem_fraction: 0.1,
                disk_percent_used: 90.0,
                total_memory_bytes: 1024 * 1024 * 1024 * 1024, // large, so RAM cap doesn't bind
                logical_cpus: 8,
            }),
        };
        let limit = mgr.adaptive_cache_limit();
        let mib = 1024 * 1024;
        assert!(limit >= 33 * mib && limit <= 37 * mib, "limit was {limit}");
    }

    #[test]
    fn recommended_limits_floor_at_256_mib_and_1_cpu() {
        let mut mgr = ResourceManager {
            config: ResourceConfig {
                performance_cores: 1,
                efficiency_cores: 0,
                cache_byte_budget: 10 * 1024 * 1024,
                cache_path: PathBuf::from("/tmp"),
            },
            telemetry: Telemetry::with_fixed_snapshot(TelemetrySnapshot {
                cpu_fraction: 0.9,
                mem_fraction: 0.9,
                disk_percent_used: 50.0,
                total_memory_bytes: 128 * 1024 * 1024,
                logical_cpus: 1,
            }),
        };
        let limits = mgr.get_recommended_resource_limits();
        assert_eq!(limits.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(limits.cpus, 1);
    }

    #[test]
    fn run_optimized_prefixes_nice_and_taskset_on_linux() {
        let mut mgr = ResourceManager {
            config: ResourceConfig {
                performance_cores: 2,
                efficiency_cores: 2,
                cache_byte_budget: 100,
                cache_path: PathBuf::from("/tmp"),
            },
            telemetry: Telemetry::with_fixed_snapshot(TelemetrySnapshot {
                cpu_fraction: 0.1,
                mem_fraction: 0.1,
                disk_percent_used: 50.0,
                total_memory_bytes: 1024 * 1024 * 1024,
                logical_cpus: 4,
            }),
        };
        let argv = mgr.run_optimized(&["sleep".to_string(), "1".to_string()], CoreKind::Performance);
        assert_eq!(argv[0], "nice");
        assert!(argv.contains(&"sleep".to_string()));
    }
}
