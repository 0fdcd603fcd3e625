//! Sandbox Controller: composes the directory, network, VM, and container
//! facets behind one verb surface and guarantees release on every exit
//! path.

mod lock;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::ArtifactCache;
use crate::constants::{dirs, env_vars, gc};
use crate::container::ContainerManager;
use crate::errors::{SafeSpaceError, SafeSpaceResult};
use crate::network::{NetworkConditions, NetworkConditionsSnapshot, NetworkIsolation};
use crate::settings::Settings;
use crate::state_store::{Lookup, PersistentSandboxRecord, StateStore};
use crate::util::command::CommandOutput;
use crate::util::process;
use crate::vm::VmManager;

use lock::SandboxLock;

/// How a sandbox's root directory is treated across `cleanup()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxMode {
    /// Root is removed on cleanup.
    Ephemeral,
    /// Fixed root `./.internal`; backed up and rebuilt on recreate.
    Internal,
    /// Root is preserved; state is recorded in the State Store.
    Persistent,
}

/// The root aggregate: identity, root path, facet flags, and the `.env`
/// mirror.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: String,
    pub name: Option<String>,
    pub root: PathBuf,
    pub mode: SandboxMode,
    pub network_enabled: bool,
    pub vm_enabled: bool,
    pub container_enabled: bool,
    pub testing_enabled: bool,
    pub enhanced_dev_enabled: bool,
    pub env: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl Sandbox {
    fn new(root: PathBuf, mode: SandboxMode, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            root,
            mode,
            network_enabled: false,
            vm_enabled: false,
            container_enabled: false,
            testing_enabled: false,
            enhanced_dev_enabled: false,
            env: BTreeMap::new(),
            created_at: Utc::now(),
            last_saved_at: None,
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(dirs::CACHE)
    }
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(dirs::LOGS)
    }
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(dirs::DATA)
    }
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(dirs::TMP)
    }
    fn env_path(&self) -> PathBuf {
        self.root.join(".env")
    }

    /// Append `KEY=VALUE` to `.env` and to the in-memory snapshot — appends
    /// only, never rewritten, per the `.env` prefix-consistency invariant.
    fn append_env(&mut self, key: &str, value: &str) -> SafeSpaceResult<()> {
        self.env.insert(key.to_string(), value.to_string());
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(self.env_path())?;
        use std::io::Write;
        writeln!(file, "{key}={value}")?;
        Ok(())
    }
}

/// Outcome of [`SandboxController::check_health`].
#[derive(Debug)]
pub struct HealthReport {
    pub ok: bool,
    pub issues: Vec<String>,
}

/// Composes the network, VM, and container facets behind one verb surface.
pub struct SandboxController {
    pub sandbox: Sandbox,
    settings: Settings,
    network: Option<NetworkIsolation>,
    vm: Option<VmManager>,
    container: Option<ContainerManager>,
    _lock: SandboxLock,
}

impl SandboxController {
    /// `create()`: materialize the root and its subdirectories at 0700,
    /// write the built-in `.env` entries, and (mode-dependent) back up an
    /// existing internal root or record a persistent one in the State
    /// Store.
    pub async fn create(
        settings: Settings,
        root: PathBuf,
        mode: SandboxMode,
        name: Option<String>,
    ) -> SafeSpaceResult<Self> {
        if mode == SandboxMode::Internal && root.exists() {
            let backup = root.with_file_name(format!(
                "{}_backup_{}",
                root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                Utc::now().format("%Y%m%d%H%M%S")
            ));
            if std::fs::rename(&root, &backup).is_err() {
                std::fs::remove_dir_all(&root).map_err(|e| {
                    SafeSpaceError::Internal(format!(
                        "internal root {} exists, backup and removal both failed: {e}",
                        root.display()
                    ))
                })?;
            }
        }

        create_dir_0700(&root)?;
        let lock = SandboxLock::acquire(&root)?;
        for sub in [dirs::CACHE, dirs::LOGS, dirs::DATA, dirs::TMP] {
            create_dir_0700(&root.join(sub))?;
        }

        let mut sandbox = Sandbox::new(root, mode, name);
        sandbox.append_env(env_vars::ROOT, &sandbox.root.display().to_string())?;
        sandbox.append_env(env_vars::CACHE, &sandbox.cache_dir().display().to_string())?;
        sandbox.append_env(env_vars::LOGS, &sandbox.logs_dir().display().to_string())?;
        sandbox.append_env(env_vars::DATA, &sandbox.data_dir().display().to_string())?;
        sandbox.append_env(env_vars::TMP, &sandbox.tmp_dir().display().to_string())?;
        sandbox.append_env(env_vars::CREATED_AT, &sandbox.created_at.to_rfc3339())?;
        sandbox.append_env(env_vars::PERSISTENT, &(mode == SandboxMode::Persistent).to_string())?;
        sandbox.append_env(env_vars::ID, &sandbox.id.clone())?;
        if let Some(name) = sandbox.name.clone() {
            sandbox.append_env(env_vars::NAME, &name)?;
        }

        let mut controller = Self {
            sandbox,
            settings,
            network: None,
            vm: None,
            container: None,
            _lock: lock,
        };

        if mode == SandboxMode::Persistent {
            controller.save_state()?;
        }

        Ok(controller)
    }

    /// Reopen an already-created root for a later verb invocation (the CLI
    /// is a thin, stateless front end — each command is a fresh process).
    /// Recovers identity from the `.env` mirror `create()` wrote rather than
    /// re-running directory setup.
    pub fn attach(settings: Settings, root: PathBuf) -> SafeSpaceResult<Self> {
        if !root.exists() {
            return Err(SafeSpaceError::PreconditionMissing(format!(
                "no sandbox at {}",
                root.display()
            )));
        }
        let lock = SandboxLock::acquire(&root)?;

        let env_path = root.join(".env");
        let mut env = BTreeMap::new();
        if let Ok(contents) = std::fs::read_to_string(&env_path) {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    env.insert(key.to_string(), value.to_string());
                }
            }
        }

        let id = env.get(env_vars::ID).cloned().unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = env.get(env_vars::NAME).cloned();
        let created_at = env
            .get(env_vars::CREATED_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let mode = match env.get(env_vars::PERSISTENT).map(String::as_str) {
            Some("true") => SandboxMode::Persistent,
            _ => SandboxMode::Ephemeral,
        };

        let sandbox = Sandbox {
            id,
            name,
            root,
            mode,
            network_enabled: env.get(env_vars::NETWORK_ENABLED).map(|v| v == "true").unwrap_or(false),
            vm_enabled: env.get(env_vars::VM_ENABLED).map(|v| v == "true").unwrap_or(false),
            container_enabled: env.get(env_vars::CONTAINER_ENABLED).map(|v| v == "true").unwrap_or(false),
            testing_enabled: false,
            enhanced_dev_enabled: false,
            env,
            created_at,
            last_saved_at: None,
        };

        Ok(Self {
            sandbox,
            settings,
            network: None,
            vm: None,
            container: None,
            _lock: lock,
        })
    }

    /// `check_health()`: root existence, permission mode, writability,
    /// free space, and subdirectory presence.
    pub fn check_health(&self) -> HealthReport {
        let mut issues = Vec::new();

        if !self.sandbox.root.exists() {
            issues.push(format!("root {} does not exist", self.sandbox.root.display()));
            return HealthReport { ok: false, issues };
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&self.sandbox.root) {
                let mode = meta.permissions().mode() & 0o777;
                if mode > 0o700 {
                    issues.push(format!("root mode {mode:o} is more permissive than 0700"));
                }
            }
        }

        let probe = self.sandbox.root.join(".health_probe");
        if std::fs::write(&probe, b"ok").is_err() {
            issues.push("root is not writable".to_string());
        }
        let _ = std::fs::remove_file(&probe);

        if free_bytes(&self.sandbox.root) < gc::MIN_FREE_BYTES {
            issues.push("less than 1 GiB free on containing filesystem".to_string());
        }

        for (label, path) in [
            ("cache", self.sandbox.cache_dir()),
            ("logs", self.sandbox.logs_dir()),
            ("data", self.sandbox.data_dir()),
            ("tmp", self.sandbox.tmp_dir()),
        ] {
            if !path.is_dir() {
                issues.push(format!("missing subdirectory: {label}"));
            }
        }

        HealthReport {
            ok: issues.is_empty(),
            issues,
        }
    }

    /// `clean_cache()`: truncate `cache/` and `tmp/`.
    pub fn clean_cache(&self) -> SafeSpaceResult<()> {
        for dir in [self.sandbox.cache_dir(), self.sandbox.tmp_dir()] {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            create_dir_0700(&dir)?;
        }
        Ok(())
    }

    /// `gc()`: delete files in `logs/` older than 24h and `tmp/` older
    /// than 1h.
    pub fn gc(&self) -> SafeSpaceResult<u64> {
        let mut removed = 0u64;
        removed += remove_older_than(&self.sandbox.logs_dir(), gc::LOG_MAX_AGE_SECS)?;
        removed += remove_older_than(&self.sandbox.tmp_dir(), gc::TMP_MAX_AGE_SECS)?;
        Ok(removed)
    }

    /// `setup_network_isolation(sudo)`.
    pub async fn setup_network_isolation(&mut self, sudo_password: Option<&str>) -> SafeSpaceResult<()> {
        let mut net = NetworkIsolation::new(
            &self.settings.subnet,
            &self.settings.network.namespace_name,
            &self.settings.network.veth_host,
            &self.settings.network.veth_namespace,
        )?;
        net.setup(sudo_password).await?;

        self.sandbox.append_env(env_vars::NETWORK_ENABLED, "true")?;
        if let Some(ns) = &net.namespace_name {
            self.sandbox.append_env(env_vars::NETWORK_NAMESPACE, ns)?;
        }
        if let Some(veth) = &net.veth_host {
            self.sandbox.append_env(env_vars::VETH_HOST, veth)?;
        }
        if let Some(veth) = &net.veth_namespace {
            self.sandbox.append_env(env_vars::VETH_NAMESPACE, veth)?;
        }
        if let Some(alias) = &net.loopback_alias {
            self.sandbox.append_env(env_vars::LOOPBACK_ALIAS, alias)?;
        }
        if let Some(pf) = &net.pf_conf_path {
            self.sandbox.append_env(env_vars::PF_CONF_PATH, pf)?;
        }

        self.network = Some(net);
        self.sandbox.network_enabled = true;
        Ok(())
    }

    pub async fn setup_network_conditions(
        &mut self,
        conditions: NetworkConditions,
        sudo_password: Option<&str>,
    ) -> SafeSpaceResult<()> {
        let net = self.network.as_mut().ok_or_else(|| {
            SafeSpaceError::PreconditionMissing("network isolation not set up".to_string())
        })?;
        net.setup_network_conditions(conditions, sudo_password).await?;
        self.sandbox.append_env(env_vars::NETWORK_CONDITIONS_ENABLED, "true")?;
        if let Some(latency) = &net.conditions.latency {
            self.sandbox.append_env(env_vars::NETWORK_LATENCY, latency)?;
        }
        if let Some(loss) = net.conditions.packet_loss {
            self.sandbox.append_env(env_vars::NETWORK_PACKET_LOSS, &loss.to_string())?;
        }
        if let Some(bw) = &net.conditions.bandwidth {
            self.sandbox.append_env(env_vars::NETWORK_BANDWIDTH, bw)?;
        }
        Ok(())
    }

    pub async fn update_network_conditions(
        &mut self,
        conditions: NetworkConditions,
        sudo_password: Option<&str>,
    ) -> SafeSpaceResult<()> {
        let net = self.network.as_mut().ok_or_else(|| {
            SafeSpaceError::PreconditionMissing("network isolation not set up".to_string())
        })?;
        net.update_network_conditions(conditions, sudo_password).await
    }

    pub async fn reset_network_conditions(&mut self, sudo_password: Option<&str>) -> SafeSpaceResult<()> {
        let net = self.network.as_mut().ok_or_else(|| {
            SafeSpaceError::PreconditionMissing("network isolation not set up".to_string())
        })?;
        net.reset_network_conditions(sudo_password).await?;
        self.sandbox.append_env(env_vars::NETWORK_CONDITIONS_ENABLED, "false")
    }

    pub fn get_network_conditions(&self) -> Option<NetworkConditionsSnapshot> {
        self.network.as_ref().map(|n| n.get_current_network_conditions())
    }

    /// `setup_vm(...)`: attach a VM facet, binding to the existing network
    /// namespace if one is present.
    pub async fn setup_vm(
        &mut self,
        memory: Option<String>,
        cpus: Option<u32>,
        disk_size: Option<String>,
        headless: Option<bool>,
        image_store: Option<&ArtifactCache>,
        iso_url: Option<&str>,
        sidecar_url: Option<&str>,
    ) -> SafeSpaceResult<()> {
        let mut config = self.settings.vm.clone();
        if let Some(m) = memory {
            config.memory = m;
        }
        if let Some(c) = cpus {
            config.cpus = c;
        }
        if let Some(d) = disk_size {
            config.disk_size = d;
        }
        if let Some(h) = headless {
            config.headless = h;
        }

        let mut manager = VmManager::new(&self.sandbox.root, config.clone())?;
        let image_store = image_store.map(|cache| crate::cache::VmImageStore::new(cache.clone(), u64::MAX));
        manager.prepare(image_store.as_ref(), iso_url, sidecar_url).await?;

        self.sandbox.append_env(env_vars::VM_ENABLED, "true")?;
        self.sandbox.append_env(env_vars::VM_MEMORY, &config.memory)?;
        self.sandbox.append_env(env_vars::VM_CPUS, &config.cpus.to_string())?;
        self.sandbox.append_env(env_vars::VM_DISK_SIZE, &config.disk_size)?;

        self.vm = Some(manager);
        self.sandbox.vm_enabled = true;
        Ok(())
    }

    pub async fn start_vm(&self) -> SafeSpaceResult<()> {
        let vm = self.vm.as_ref().ok_or_else(|| SafeSpaceError::PreconditionMissing("vm not set up".to_string()))?;
        vm.start(None).await
    }

    pub fn stop_vm(&self) -> SafeSpaceResult<()> {
        let vm = self.vm.as_ref().ok_or_else(|| SafeSpaceError::PreconditionMissing("vm not set up".to_string()))?;
        vm.stop()
    }

    pub fn is_vm_running(&self) -> bool {
        self.vm.as_ref().map(|vm| vm.is_running()).unwrap_or(false)
    }

    /// `setup_container(...)`.
    pub async fn setup_container(
        &mut self,
        image: &str,
        memory: Option<String>,
        cpus: Option<f32>,
        storage_size: Option<String>,
    ) -> SafeSpaceResult<()> {
        let mut config = self.settings.container.clone();
        if let Some(m) = memory {
            config.memory = m;
        }
        if let Some(c) = cpus {
            config.cpus = c;
        }
        if let Some(s) = storage_size {
            config.storage_size = s;
        }

        let mut manager = ContainerManager::new(&self.sandbox.root, config)?;
        let bind_mounts = vec![(self.sandbox.data_dir(), "/workspace".to_string())];
        manager.prepare(image, &bind_mounts).await?;

        self.sandbox.append_env(env_vars::CONTAINER_ENABLED, "true")?;
        self.sandbox.append_env(env_vars::CONTAINER_NAME, manager.name())?;
        self.sandbox.append_env(env_vars::CONTAINER_IMAGE, image)?;
        self.sandbox.append_env(env_vars::CONTAINER_NETWORK, crate::constants::network::CONTAINER_NETWORK)?;

        self.container = Some(manager);
        self.sandbox.container_enabled = true;
        Ok(())
    }

    pub async fn start_container(&mut self, image: &str) -> SafeSpaceResult<()> {
        let container = self
            .container
            .as_mut()
            .ok_or_else(|| SafeSpaceError::PreconditionMissing("container not set up".to_string()))?;
        let bind_mounts = vec![(self.sandbox.data_dir(), "/workspace".to_string())];
        container.run(image, &bind_mounts).await
    }

    pub async fn stop_container(&self) -> SafeSpaceResult<()> {
        let container = self
            .container
            .as_ref()
            .ok_or_else(|| SafeSpaceError::PreconditionMissing("container not set up".to_string()))?;
        container.stop().await
    }

    pub async fn is_container_running(&self) -> bool {
        match &self.container {
            Some(c) => c.is_running().await,
            None => false,
        }
    }

    pub async fn run_in_network(&self, argv: &[String]) -> SafeSpaceResult<CommandOutput> {
        let net = self.network.as_ref().ok_or_else(|| {
            SafeSpaceError::PreconditionMissing("network isolation not set up".to_string())
        })?;
        net.run_command(argv).await
    }

    pub async fn run_in_container(&mut self, argv: &[String]) -> SafeSpaceResult<CommandOutput> {
        let container = self
            .container
            .as_mut()
            .ok_or_else(|| SafeSpaceError::PreconditionMissing("container not set up".to_string()))?;
        container.run_command(argv).await
    }

    /// `cleanup(keep_dir)`: release facets in reverse dependency order —
    /// container, VM, network, root — aggregating failures rather than
    /// stopping at the first one. Idempotent: a second call is a no-op.
    pub async fn cleanup(&mut self, force_keep_dir: bool) -> Vec<String> {
        let mut failures = Vec::new();

        if let Some(container) = self.container.take() {
            if let Err(e) = container.cleanup().await {
                failures.push(format!("container cleanup: {e}"));
            }
        }
        if let Some(mut vm) = self.vm.take() {
            if let Err(e) = vm.cleanup().await {
                failures.push(format!("vm cleanup: {e}"));
            }
        }
        if let Some(mut net) = self.network.take() {
            if let Err(e) = net.cleanup(self.settings.sudo_password.as_deref()).await {
                failures.push(format!("network cleanup: {e}"));
            }
        }

        self.sandbox.network_enabled = false;
        self.sandbox.vm_enabled = false;
        self.sandbox.container_enabled = false;

        if let Err(e) = kill_processes_under(&self.sandbox.root) {
            failures.push(format!("process sweep: {e}"));
        }

        let keep_dir = force_keep_dir
            || self.sandbox.mode == SandboxMode::Internal
            || self.sandbox.mode == SandboxMode::Persistent;

        if self.sandbox.mode == SandboxMode::Persistent {
            if let Err(e) = self.save_state() {
                failures.push(format!("save_state on cleanup: {e}"));
            }
        }

        if !keep_dir {
            if self.sandbox.root.exists() {
                if let Err(e) = std::fs::remove_dir_all(&self.sandbox.root) {
                    failures.push(format!("remove root: {e}"));
                }
            }
        }

        failures
    }

    /// `save_state()`.
    pub fn save_state(&mut self) -> SafeSpaceResult<()> {
        let store = StateStore::open_default()?;
        let state = serde_json::json!({
            "env": self.sandbox.env,
            "network_enabled": self.sandbox.network_enabled,
            "vm_enabled": self.sandbox.vm_enabled,
            "container_enabled": self.sandbox.container_enabled,
        });
        let metadata = serde_json::json!({
            "mode": self.sandbox.mode,
            "created_at": self.sandbox.created_at,
        });
        let record = PersistentSandboxRecord {
            id: self.sandbox.id.clone(),
            name: self.sandbox.name.clone(),
            root_dir: self.sandbox.root.clone(),
            created_at: self.sandbox.created_at,
            last_accessed: Utc::now(),
            state,
            metadata,
        };
        store.save(&record)?;
        self.sandbox.last_saved_at = Some(Utc::now());
        Ok(())
    }

    /// `load_from_state(id | name)`: reconstitutes a `Sandbox` value from
    /// the State Store's `state` blob. The returned controller has no
    /// facets attached — callers re-run `setup_*` verbs as needed; the
    /// observable fields (env, facet flags, root) match what was saved.
    pub async fn load_from_state(settings: Settings, lookup: Lookup<'_>) -> SafeSpaceResult<Self> {
        let store = StateStore::open_default()?;
        let record = store
            .get(lookup)?
            .ok_or_else(|| SafeSpaceError::StateStoreFailure("no such saved sandbox".to_string()))?;

        let env: BTreeMap<String, String> = serde_json::from_value(
            record.state.get("env").cloned().unwrap_or_else(|| serde_json::json!({})),
        )
        .unwrap_or_default();

        let sandbox = Sandbox {
            id: record.id,
            name: record.name,
            root: record.root_dir,
            mode: SandboxMode::Persistent,
            network_enabled: record
                .state
                .get("network_enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            vm_enabled: record.state.get("vm_enabled").and_then(|v| v.as_bool()).unwrap_or(false),
            container_enabled: record
                .state
                .get("container_enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            testing_enabled: false,
            enhanced_dev_enabled: false,
            env,
            created_at: record.created_at,
            last_saved_at: Some(record.last_accessed),
        };

        let lock = SandboxLock::acquire(&sandbox.root)?;
        Ok(Self {
            sandbox,
            settings,
            network: None,
            vm: None,
            container: None,
            _lock: lock,
        })
    }

    pub fn list_saved_environments() -> SafeSpaceResult<Vec<PersistentSandboxRecord>> {
        StateStore::open_default()?.list()
    }

    pub fn delete_saved_state(id: &str) -> SafeSpaceResult<bool> {
        StateStore::open_default()?.delete(id)
    }
}

fn create_dir_0700(path: &Path) -> SafeSpaceResult<()> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn remove_older_than(dir: &Path, max_age_secs: u64) -> SafeSpaceResult<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let max_age = std::time::Duration::from_secs(max_age_secs);
    let now = std::time::SystemTime::now();
    let mut removed = 0u64;

    for entry in std::fs::read_dir(dir)?.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        if now.duration_since(modified).unwrap_or_default() > max_age && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Best-effort `lsof +D`-equivalent: SIGKILL any process whose executable
/// or open files live under `root`, before the directory is removed.
/// Scans `/proc/*/cwd` and `/proc/*/exe` on Linux; a no-op elsewhere (macOS
/// has no cheap equivalent without `lsof` itself, which is left to the
/// operator).
fn kill_processes_under(root: &Path) -> SafeSpaceResult<()> {
    #[cfg(target_os = "linux")]
    {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Ok(());
        };
        for entry in entries.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
                continue;
            };
            let cwd_link = std::fs::read_link(entry.path().join("cwd")).ok();
            let exe_link = std::fs::read_link(entry.path().join("exe")).ok();
            let under_root = [cwd_link, exe_link]
                .into_iter()
                .flatten()
                .any(|p| p.starts_with(root));
            if under_root {
                let _ = process::kill(pid);
            }
        }
    }
    let _ = root;
    Ok(())
}

fn free_bytes(path: &Path) -> u64 {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::mem::MaybeUninit;

        let Ok(c_path) = CString::new(path.to_string_lossy().as_bytes()) else {
            return u64::MAX;
        };
        unsafe {
            let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
            if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
                return u64::MAX;
            }
            let stat = stat.assume_init();
            (stat.f_bavail as u64) * (stat.f_frsize as u64)
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_writes_root_env_line_for_ephemeral_sandbox() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ss-test-1");
        let controller = SandboxController::create(Settings::default(), root.clone(), SandboxMode::Ephemeral, None)
            .await
            .unwrap();

        let env_contents = std::fs::read_to_string(root.join(".env")).unwrap();
        assert!(env_contents.lines().any(|l| l == format!("SAFE_ENV_ROOT={}", root.display())));
        drop(controller);
    }

    #[tokio::test]
    async fn ephemeral_cleanup_removes_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ss-test-1");
        let mut controller = SandboxController::create(Settings::default(), root.clone(), SandboxMode::Ephemeral, None)
            .await
            .unwrap();
        assert!(root.exists());
        let failures = controller.cleanup(false).await;
        assert!(failures.is_empty());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ss-test-1");
        let mut controller = SandboxController::create(Settings::default(), root.clone(), SandboxMode::Ephemeral, None)
            .await
            .unwrap();
        let first = controller.cleanup(false).await;
        let second = controller.cleanup(false).await;
        assert!(first.is_empty());
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn persistent_sandbox_survives_cleanup_and_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("alpha-root");
        let db_dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", db_dir.path());

        let mut controller = SandboxController::create(
            Settings::default(),
            root.clone(),
            SandboxMode::Persistent,
            Some("alpha".to_string()),
        )
        .await
        .unwrap();
        controller.sandbox.network_enabled = true;
        controller.save_state().unwrap();
        let failures = controller.cleanup(false).await;
        assert!(failures.is_empty());
        assert!(root.exists());

        let saved = SandboxController::list_saved_environments().unwrap();
        assert!(saved.iter().any(|r| r.name.as_deref() == Some("alpha")));

        let reloaded = SandboxController::load_from_state(Settings::default(), Lookup::Name("alpha"))
            .await
            .unwrap();
        assert!(reloaded.sandbox.network_enabled);
        assert_eq!(reloaded.sandbox.root, root);
    }

    #[tokio::test]
    async fn health_report_flags_missing_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ss-test-2");
        let controller = SandboxController::create(Settings::default(), root.clone(), SandboxMode::Ephemeral, None)
            .await
            .unwrap();
        let report = controller.check_health();
        assert!(report.ok, "issues: {:?}", report.issues);

        std::fs::remove_dir_all(root.join("logs")).unwrap();
        let report = controller.check_health();
        assert!(!report.ok);
        assert!(report.issues.iter().any(|i| i.contains("logs")));
    }

    #[tokio::test]
    async fn internal_mode_backs_up_existing_root_on_recreate() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".internal");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("marker.txt"), b"old").unwrap();

        let _controller = SandboxController::create(Settings::default(), root.clone(), SandboxMode::Internal, None)
            .await
            .unwrap();

        // The old root's contents were moved aside, not merged in.
        assert!(!root.join("marker.txt").exists());
        let has_backup = std::fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .any(|e| e.file_name().to_string_lossy().contains("_backup_"));
        assert!(has_backup);
    }
}
