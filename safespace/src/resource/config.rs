//! Persisted resource configuration (`<cache>/resource_config.json`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::errors::SafeSpaceResult;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub performance_cores: usize,
    pub efficiency_cores: usize,
    pub cache_byte_budget: u64,
    #[serde(skip)]
    pub cache_path: PathBuf,
}

impl ResourceConfig {
    /// Load the config at `path`, or probe the host's physical/logical core
    /// counts and total memory via `sysinfo` and persist a fresh default
    /// when absent.
    pub fn load_or_probe(path: &Path) -> SafeSpaceResult<Self> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let mut config: ResourceConfig = serde_json::from_str(&raw)?;
            config.cache_path = path.to_path_buf();
            return Ok(config);
        }

        let (logical_cpus, physical_cpus, total_memory_bytes) = probe_system();

        // Hyperthreaded/SMT hosts (logical > physical) dedicate half the
        // physical cores to performance work and the rest to efficiency;
        // otherwise split the logical count evenly.
        let (performance_cores, efficiency_cores) = if logical_cpus > physical_cpus {
            let performance = (physical_cpus / 2).max(1);
            let efficiency = physical_cpus.saturating_sub(performance).max(1);
            (performance, efficiency)
        } else {
            let half = (logical_cpus / 2).max(1);
            (half, half)
        };

        let config = ResourceConfig {
            performance_cores,
            efficiency_cores,
            cache_byte_budget: total_memory_bytes / 10,
            cache_path: path.to_path_buf(),
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> SafeSpaceResult<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.cache_path, raw)?;
        Ok(())
    }
}

/// `(logical_cpus, physical_cpus, total_memory_bytes)`, each floored at 1
/// (0 bytes for memory) so a probe failure never divides by zero downstream.
fn probe_system() -> (usize, usize, u64) {
    let mut sys = System::new();
    sys.refresh_cpu();
    sys.refresh_memory();

    let logical = sys.cpus().len().max(1);
    let physical = sys.physical_core_count().unwrap_or(logical).max(1);
    let total_memory_bytes = sys.total_memory() * 1024;

    (logical, physical, total_memory_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_creates_config_file_with_nonzero_cores() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("resource_config.json");
        let config = ResourceConfig::load_or_probe(&path).unwrap();
        assert!(path.exists());
        assert!(config.performance_cores >= 1);
        assert!(config.efficiency_cores >= 1);
    }

    #[test]
    fn second_load_reuses_persisted_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("resource_config.json");
        let first = ResourceConfig::load_or_probe(&path).unwrap();
        let second = ResourceConfig::load_or_probe(&path).unwrap();
        assert_eq!(first.performance_cores, second.performance_cores);
        assert_eq!(first.cache_byte_budget, second.cache_byte_budget);
    }
}
