//! VM facet: boots an external QEMU-class emulator against a cached,
//! checksum-verified base image.
//!
//! Disk creation uses native sparse-disk creation rather than shelling out
//! to `qemu-img`; liveness tracking uses a pid file the same way the
//! container facet does.

mod disk;
mod qemu;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::VmImageStore;
use crate::errors::{SafeSpaceResult, VmError};
use crate::settings::VmDefaults;
use crate::util::{command, process};

pub use qemu::generate_mac;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct VmState {
    mac: Option<String>,
    tap_device: Option<String>,
}

/// Tracks one sandbox's VM facet: its disk, pid file, and launcher scripts
/// under `<root>/vm/`.
pub struct VmManager {
    vm_dir: PathBuf,
    config: VmDefaults,
    state: VmState,
}

impl VmManager {
    pub fn new(sandbox_root: &Path, config: VmDefaults) -> SafeSpaceResult<Self> {
        let vm_dir = sandbox_root.join(crate::constants::dirs::VM);
        std::fs::create_dir_all(&vm_dir)?;
        let state = Self::load_state(&vm_dir)?;
        Ok(Self { vm_dir, config, state })
    }

    fn state_path(vm_dir: &Path) -> PathBuf {
        vm_dir.join("vm_state.json")
    }

    fn load_state(vm_dir: &Path) -> SafeSpaceResult<VmState> {
        let path = Self::state_path(vm_dir);
        if !path.exists() {
            return Ok(VmState::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save_state(&self) -> SafeSpaceResult<()> {
        let raw = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(Self::state_path(&self.vm_dir), raw)?;
        Ok(())
    }

    fn disk_path(&self) -> PathBuf {
        self.vm_dir.join(crate::constants::vm_files::DISK)
    }

    fn pid_path(&self) -> PathBuf {
        self.vm_dir.join(crate::constants::vm_files::PID)
    }

    fn monitor_sock_path(&self) -> PathBuf {
        self.vm_dir.join(crate::constants::vm_files::MONITOR_SOCK)
    }

    /// Ensure the root disk exists, a MAC is assigned, the base image (if
    /// requested) is present and checksum-verified via the shared artifact
    /// cache, and launcher scripts are written.
    pub async fn prepare(
        &mut self,
        image_store: Option<&VmImageStore>,
        iso_url: Option<&str>,
        sidecar_url: Option<&str>,
    ) -> SafeSpaceResult<Option<PathBuf>> {
        let disk_size = disk::parse_size(&self.config.disk_size)?;
        disk::create_sparse_disk(&self.disk_path(), disk_size)?;

        if self.state.mac.is_none() {
            self.state.mac = Some(generate_mac());
        }

        let iso_path = match (image_store, iso_url, sidecar_url) {
            (Some(store), Some(iso_url), Some(sidecar_url)) => {
                let out_path = self.vm_dir.join("base.iso");
                store.fetch_base_image(iso_url, sidecar_url, &out_path).await?;
                Some(out_path)
            }
            _ => None,
        };

        let argv = qemu::build_argv(
            &self.config,
            &self.disk_path(),
            iso_path.as_deref(),
            self.state.mac.as_deref().unwrap_or_default(),
            &self.monitor_sock_path(),
            self.state.tap_device.as_deref(),
        );
        qemu::write_launcher_scripts(&self.vm_dir, &argv, &self.pid_path())?;

        self.save_state()?;
        Ok(iso_path)
    }

    /// Bind a tap device created by the network facet to this VM's netdev,
    /// to be picked up on the next [`Self::prepare`]/[`Self::start`].
    pub fn set_tap_device(&mut self, tap_device: impl Into<String>) -> SafeSpaceResult<()> {
        self.state.tap_device = Some(tap_device.into());
        self.save_state()
    }

    pub fn is_running(&self) -> bool {
        match process::read_pid_file(&self.pid_path()) {
            Ok(pid) => process::is_process_alive(pid),
            Err(_) => false,
        }
    }

    /// Spawn the emulator (built with `-daemonize`, so the child forks and
    /// exits immediately) and record its pid.
    pub async fn start(&self, iso_path: Option<&Path>) -> SafeSpaceResult<()> {
        if self.is_running() {
            let pid = process::read_pid_file(&self.pid_path())?;
            return Err(VmError::AlreadyRunning(pid).into());
        }

        let mac = self.state.mac.as_deref().ok_or_else(|| VmError::Disk("no MAC assigned; call prepare() first".to_string()))?;
        let argv = qemu::build_argv(
            &self.config,
            &self.disk_path(),
            iso_path,
            mac,
            &self.monitor_sock_path(),
            self.state.tap_device.as_deref(),
        );

        let mut argv_with_pidfile = argv;
        argv_with_pidfile.push("-pidfile".to_string());
        argv_with_pidfile.push(self.pid_path().display().to_string());

        let output = command::run_argv(&argv_with_pidfile).await?;
        if !output.success() {
            return Err(VmError::CommandFailed {
                command: argv_with_pidfile.join(" "),
                code: output.status,
                stderr: output.stderr,
            }
            .into());
        }
        Ok(())
    }

    /// SIGTERM the emulator and remove the pid file; tolerates an already-
    /// stopped VM.
    pub fn stop(&self) -> SafeSpaceResult<()> {
        if let Ok(pid) = process::read_pid_file(&self.pid_path()) {
            if process::is_process_alive(pid) {
                process::terminate(pid)?;
            }
        }
        let _ = std::fs::remove_file(self.pid_path());
        Ok(())
    }

    /// Stop if running, then remove the tap interface if one was bound.
    pub async fn cleanup(&mut self) -> SafeSpaceResult<()> {
        self.stop()?;
        if let Some(tap) = self.state.tap_device.take() {
            let argv = vec!["ip".to_string(), "link".to_string(), "del".to_string(), tap];
            let _ = command::run_argv(&argv).await;
            self.save_state()?;
        }
        Ok(())
    }
}
