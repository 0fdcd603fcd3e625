//! Process-wide configuration.
//!
//! `Settings` is loaded once and threaded immutably through the
//! [`crate::sandbox::SandboxController`]; each facet receives only the
//! fields it needs rather than reaching into a global.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::network as net_const;

/// Default config file location: `~/.config/safespace/config.yaml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("safespace")
        .join("config.yaml")
}

/// Top-level, immutable settings shared by every facet.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory new ephemeral/persistent sandbox roots are created
    /// under when the caller does not specify an absolute path.
    pub sandbox_root_base: PathBuf,
    /// Byte budget for the artifact cache shared across sandboxes.
    pub cache_byte_budget: u64,
    /// Directory holding the shared content-addressed cache.
    pub cache_dir: PathBuf,
    /// Subnet used for sandbox network isolation (CIDR notation).
    pub subnet: String,
    pub network: NetworkDefaults,
    pub vm: VmDefaults,
    pub container: ContainerDefaults,
    /// Cached `sudo` password for the session; never persisted to disk.
    #[serde(skip)]
    pub sudo_password: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkDefaults {
    pub namespace_name: String,
    pub veth_host: String,
    pub veth_namespace: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VmDefaults {
    pub memory: String,
    pub cpus: u32,
    pub disk_size: String,
    pub headless: bool,
    pub acceleration: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDefaults {
    /// Runtime preference order, tried left to right.
    pub runtime_order: Vec<String>,
    pub memory: String,
    pub cpus: f32,
    pub storage_size: String,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            sandbox_root_base: home.join(".safespace").join("sandboxes"),
            cache_byte_budget: 5 * 1024 * 1024 * 1024,
            cache_dir: home.join(".safespace").join("cache"),
            subnet: net_const::DEFAULT_SUBNET.to_string(),
            network: NetworkDefaults::default(),
            vm: VmDefaults::default(),
            container: ContainerDefaults::default(),
            sudo_password: None,
        }
    }
}

impl Default for NetworkDefaults {
    fn default() -> Self {
        Self {
            namespace_name: net_const::NAMESPACE_NAME.to_string(),
            veth_host: net_const::VETH_HOST.to_string(),
            veth_namespace: net_const::VETH_NAMESPACE.to_string(),
        }
    }
}

impl Default for VmDefaults {
    fn default() -> Self {
        Self {
            memory: "2G".to_string(),
            cpus: 2,
            disk_size: "20G".to_string(),
            headless: true,
            acceleration: true,
        }
    }
}

impl Default for ContainerDefaults {
    fn default() -> Self {
        Self {
            runtime_order: vec!["podman".to_string(), "docker".to_string()],
            memory: "512m".to_string(),
            cpus: 1.0,
            storage_size: "10G".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults for any field
    /// absent from the file, or entirely to defaults if the file does not
    /// exist. A malformed file is an error — unlike the cache index, a bad
    /// config file should stop the operator, not silently degrade.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&raw)?;
        Ok(settings)
    }

    /// Load from the default config path (`~/.config/safespace/config.yaml`).
    pub fn load_default() -> anyhow::Result<Self> {
        Self::load(&default_config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let settings = Settings::default();
        assert_eq!(settings.subnet, "192.168.100.0/24");
        assert_eq!(settings.network.namespace_name, "safespace_net");
        assert!(settings.cache_byte_budget > 0);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.yaml");
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.vm.cpus, Settings::default().vm.cpus);
    }

    #[test]
    fn partial_config_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "cache_byte_budget: 1000\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.cache_byte_budget, 1000);
        assert_eq!(settings.subnet, Settings::default().subnet);
    }
}
