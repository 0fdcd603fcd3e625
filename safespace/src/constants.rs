//! Fixed on-host names and defaults for the network topology, filesystem
//! layout, and reserved environment variables.
//!
//! These are read by more than one subsystem and are collected here rather
//! than scattered as magic strings.

/// Network topology defaults.
pub mod network {
    /// Default sandbox subnet.
    pub const DEFAULT_SUBNET: &str = "192.168.100.0/24";
    /// Host-side IP within the subnet.
    pub const HOST_OCTET: u8 = 1;
    /// Namespace-side IP within the subnet.
    pub const NAMESPACE_OCTET: u8 = 2;
    /// Tap/loopback-alias IP within the subnet.
    pub const TAP_OCTET: u8 = 3;
    /// Linux network namespace name.
    pub const NAMESPACE_NAME: &str = "safespace_net";
    /// Host-side veth interface name.
    pub const VETH_HOST: &str = "veth0";
    /// Namespace-side veth interface name.
    pub const VETH_NAMESPACE: &str = "veth1";
    /// Container network name (Docker/Podman).
    pub const CONTAINER_NETWORK: &str = "safespace_net";
}

/// Sandbox subdirectory names, all created mode 0700 under the root.
pub mod dirs {
    pub const CACHE: &str = "cache";
    pub const LOGS: &str = "logs";
    pub const DATA: &str = "data";
    pub const TMP: &str = "tmp";
    pub const VM: &str = "vm";
    pub const CONTAINER: &str = "container";
}

/// Filenames under `<root>/vm/`.
pub mod vm_files {
    pub const DISK: &str = "disk.qcow2";
    pub const PID: &str = "vm.pid";
    pub const MONITOR_SOCK: &str = "monitor.sock";
    pub const START_SCRIPT: &str = "start_vm.sh";
    pub const FUNCTIONS_SCRIPT: &str = "vm_functions.sh";
}

/// Filenames under `<root>/container/`.
pub mod container_files {
    pub const RUN_SCRIPT: &str = "run_container.sh";
    pub const EXEC_SCRIPT: &str = "exec_container.sh";
}

/// Reserved environment variable names mirrored into `<root>/.env`.
pub mod env_vars {
    pub const ROOT: &str = "SAFE_ENV_ROOT";
    pub const CACHE: &str = "SAFE_ENV_CACHE";
    pub const LOGS: &str = "SAFE_ENV_LOGS";
    pub const DATA: &str = "SAFE_ENV_DATA";
    pub const TMP: &str = "SAFE_ENV_TMP";
    pub const CREATED_AT: &str = "SAFE_ENV_CREATED_AT";
    pub const PERSISTENT: &str = "SAFE_ENV_PERSISTENT";
    pub const ID: &str = "SAFE_ENV_ID";
    pub const NAME: &str = "SAFE_ENV_NAME";

    pub const NETWORK_ENABLED: &str = "NETWORK_ENABLED";
    pub const NETWORK_NAMESPACE: &str = "NETWORK_NAMESPACE";
    pub const VETH_HOST: &str = "VETH_HOST";
    pub const VETH_NAMESPACE: &str = "VETH_NAMESPACE";
    pub const LOOPBACK_ALIAS: &str = "LOOPBACK_ALIAS";
    pub const PF_CONF_PATH: &str = "PF_CONF_PATH";
    pub const NETWORK_CONDITIONS_ENABLED: &str = "NETWORK_CONDITIONS_ENABLED";
    pub const NETWORK_LATENCY: &str = "NETWORK_LATENCY";
    pub const NETWORK_PACKET_LOSS: &str = "NETWORK_PACKET_LOSS";
    pub const NETWORK_BANDWIDTH: &str = "NETWORK_BANDWIDTH";

    pub const VM_ENABLED: &str = "VM_ENABLED";
    pub const VM_MEMORY: &str = "VM_MEMORY";
    pub const VM_CPUS: &str = "VM_CPUS";
    pub const VM_DISK_SIZE: &str = "VM_DISK_SIZE";
    pub const VM_MAC: &str = "VM_MAC";

    pub const CONTAINER_ENABLED: &str = "CONTAINER_ENABLED";
    pub const CONTAINER_RUNTIME: &str = "CONTAINER_RUNTIME";
    pub const CONTAINER_NAME: &str = "CONTAINER_NAME";
    pub const CONTAINER_IMAGE: &str = "CONTAINER_IMAGE";
    pub const CONTAINER_NETWORK: &str = "CONTAINER_NETWORK";
}

/// Resource / GC defaults.
pub mod gc {
    pub const LOG_MAX_AGE_SECS: u64 = 24 * 60 * 60;
    pub const TMP_MAX_AGE_SECS: u64 = 60 * 60;
    pub const MIN_FREE_BYTES: u64 = 1024 * 1024 * 1024;
}
