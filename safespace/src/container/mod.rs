//! Container facet: wraps a host container engine CLI (podman/docker) for
//! a sandbox.
//!
//! SafeSpace never embeds a container runtime; it shells out to whichever
//! engine is found first on PATH, same as the VM facet shells out to an
//! external emulator rather than linking one in.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::errors::{ContainerError, SafeSpaceResult};
use crate::settings::ContainerDefaults;
use crate::util::command::{self, CommandOutput};

/// Detect the first available runtime from `order` by probing `<tool>
/// --version`.
pub async fn detect_runtime(order: &[String]) -> SafeSpaceResult<String> {
    for candidate in order {
        let argv = vec![candidate.clone(), "--version".to_string()];
        if let Ok(output) = command::run_argv(&argv).await {
            if output.success() {
                return Ok(candidate.clone());
            }
        }
    }
    Err(ContainerError::NoRuntime(order.to_vec()).into())
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 4] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct ContainerManager {
    container_dir: PathBuf,
    config: ContainerDefaults,
    runtime: Option<String>,
    name: String,
}

impl ContainerManager {
    pub fn new(sandbox_root: &Path, config: ContainerDefaults) -> SafeSpaceResult<Self> {
        let container_dir = sandbox_root.join(crate::constants::dirs::CONTAINER);
        std::fs::create_dir_all(&container_dir)?;
        let name = format!("safespace_{}", random_suffix());
        Ok(Self {
            container_dir,
            config,
            runtime: None,
            name,
        })
    }

    fn run_script_path(&self) -> PathBuf {
        self.container_dir.join(crate::constants::container_files::RUN_SCRIPT)
    }

    fn exec_script_path(&self) -> PathBuf {
        self.container_dir.join(crate::constants::container_files::EXEC_SCRIPT)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Select a runtime (podman preferred), create the dedicated network,
    /// pull `image`, and write operator-inspectable wrapper scripts.
    /// Scripts are written even if a prerequisite (runtime detection) fails,
    /// matching the VM facet's "always leave the scaffolding" behavior.
    pub async fn prepare(&mut self, image: &str, bind_mounts: &[(PathBuf, String)]) -> SafeSpaceResult<()> {
        let runtime = detect_runtime(&self.config.runtime_order).await;

        let run_argv = self.build_run_argv(
            runtime.as_deref().unwrap_or("podman"),
            image,
            bind_mounts,
        );
        write_script(&self.run_script_path(), &run_argv)?;

        let exec_argv = vec![
            runtime.as_ref().map(String::as_str).unwrap_or("podman").to_string(),
            "exec".to_string(),
            "-it".to_string(),
            self.name.clone(),
            "$@".to_string(),
        ];
        write_script(&self.exec_script_path(), &exec_argv)?;

        let runtime = runtime?;

        let network_argv = vec![
            runtime.clone(),
            "network".to_string(),
            "create".to_string(),
            crate::constants::network::CONTAINER_NETWORK.to_string(),
        ];
        // Tolerate "network already exists".
        let _ = command::run_argv(&network_argv).await;

        let pull_argv = vec![runtime.clone(), "pull".to_string(), image.to_string()];
        let output = command::run_argv(&pull_argv).await?;
        if !output.success() {
            return Err(ContainerError::CommandFailed {
                command: pull_argv.join(" "),
                code: output.status,
                stderr: output.stderr,
            }
            .into());
        }

        self.runtime = Some(runtime);
        Ok(())
    }

    fn build_run_argv(&self, runtime: &str, image: &str, bind_mounts: &[(PathBuf, String)]) -> Vec<String> {
        let mut argv = vec![
            runtime.to_string(),
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--network".to_string(),
            crate::constants::network::CONTAINER_NETWORK.to_string(),
            "--memory".to_string(),
            self.config.memory.clone(),
            "--cpus".to_string(),
            self.config.cpus.to_string(),
        ];
        for (host_path, container_path) in bind_mounts {
            argv.push("-v".to_string());
            argv.push(format!("{}:{}", host_path.display(), container_path));
        }
        argv.push(image.to_string());
        argv.push("sleep".to_string());
        argv.push("infinity".to_string());
        argv
    }

    /// Run `run` detached, starting the container if it isn't already.
    pub async fn run(&mut self, image: &str, bind_mounts: &[(PathBuf, String)]) -> SafeSpaceResult<()> {
        if self.runtime.is_none() {
            self.runtime = Some(detect_runtime(&self.config.runtime_order).await?);
        }
        let runtime = self.runtime.clone().expect("runtime set above");
        let argv = self.build_run_argv(&runtime, image, bind_mounts);
        self.run_with_retry(&argv).await.map(|_| ())
    }

    /// Run `argv` inside the container, starting it first if stopped.
    pub async fn run_command(&mut self, argv: &[String]) -> SafeSpaceResult<CommandOutput> {
        self.ensure_started().await?;
        let runtime = self.runtime.clone().ok_or(ContainerError::NotRunning)?;
        let mut full_argv = vec![runtime, "exec".to_string(), self.name.clone()];
        full_argv.extend(argv.iter().cloned());
        self.run_with_retry(&full_argv).await
    }

    async fn ensure_started(&mut self) -> SafeSpaceResult<()> {
        if self.runtime.is_none() {
            self.runtime = Some(detect_runtime(&self.config.runtime_order).await?);
        }
        let runtime = self.runtime.clone().expect("runtime set above");
        let start_argv = vec![runtime, "start".to_string(), self.name.clone()];
        let _ = command::run_argv(&start_argv).await;
        Ok(())
    }

    /// Run `argv`, retrying once with `sudo` if the first attempt fails
    /// with a permission-denied style error.
    async fn run_with_retry(&self, argv: &[String]) -> SafeSpaceResult<CommandOutput> {
        let output = command::run_argv(argv).await?;
        if output.success() {
            return Ok(output);
        }
        if output.stderr.to_lowercase().contains("permission denied") {
            if let Some(password) = std::env::var("SAFESPACE_SUDO_PASSWORD").ok() {
                return command::run_argv_sudo(argv, Some(&password)).await;
            }
        }
        Err(ContainerError::CommandFailed {
            command: argv.join(" "),
            code: output.status,
            stderr: output.stderr,
        }
        .into())
    }

    /// Ask the runtime directly rather than trusting in-process state,
    /// since the container may have been stopped out of band.
    pub async fn is_running(&self) -> bool {
        let Some(runtime) = &self.runtime else {
            return false;
        };
        let argv = vec![
            runtime.clone(),
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            self.name.clone(),
        ];
        match command::run_argv(&argv).await {
            Ok(output) => output.success() && output.stdout.trim() == "true",
            Err(_) => false,
        }
    }

    pub async fn stop(&self) -> SafeSpaceResult<()> {
        let Some(runtime) = &self.runtime else {
            return Ok(());
        };
        let argv = vec![runtime.clone(), "stop".to_string(), self.name.clone()];
        let _ = command::run_argv(&argv).await;
        Ok(())
    }

    /// Force-remove the container and its dedicated network.
    pub async fn cleanup(&self) -> SafeSpaceResult<()> {
        let Some(runtime) = &self.runtime else {
            return Ok(());
        };
        let rm_argv = vec![runtime.clone(), "rm".to_string(), "-f".to_string(), self.name.clone()];
        let _ = command::run_argv(&rm_argv).await;

        let net_rm_argv = vec![
            runtime.clone(),
            "network".to_string(),
            "rm".to_string(),
            crate::constants::network::CONTAINER_NETWORK.to_string(),
        ];
        let _ = command::run_argv(&net_rm_argv).await;
        Ok(())
    }
}

fn write_script(path: &Path, argv: &[String]) -> SafeSpaceResult<()> {
    let quoted: Vec<String> = argv
        .iter()
        .map(|a| {
            if a == "$@" || a.chars().all(|c| c.is_alphanumeric() || "-_./:,=".contains(c)) {
                a.clone()
            } else {
                format!("'{}'", a.replace('\'', "'\\''"))
            }
        })
        .collect();
    let script = format!("#!/bin/sh\nset -eu\nexec {}\n", quoted.join(" "));
    std::fs::write(path, script)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o700);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_config() -> ContainerDefaults {
        ContainerDefaults {
            runtime_order: vec!["podman".to_string(), "docker".to_string()],
            memory: "512m".to_string(),
            cpus: 1.0,
            storage_size: "10G".to_string(),
        }
    }

    #[test]
    fn name_is_safespace_prefixed() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = ContainerManager::new(tmp.path(), container_config()).unwrap();
        assert!(manager.name().starts_with("safespace_"));
    }

    #[test]
    fn build_run_argv_includes_bind_mounts_and_sleep_infinity() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = ContainerManager::new(tmp.path(), container_config()).unwrap();
        let argv = manager.build_run_argv(
            "podman",
            "alpine:latest",
            &[(PathBuf::from("/host/data"), "/data".to_string())],
        );
        assert!(argv.contains(&"sleep".to_string()));
        assert!(argv.contains(&"infinity".to_string()));
        assert!(argv.iter().any(|a| a.contains("/host/data:/data")));
    }

    #[tokio::test]
    async fn detect_runtime_errors_when_nothing_on_path() {
        let order = vec!["definitely-not-a-real-binary-xyz".to_string()];
        assert!(detect_runtime(&order).await.is_err());
    }

    #[tokio::test]
    async fn prepare_writes_scripts_even_when_runtime_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manager = ContainerManager::new(tmp.path(), ContainerDefaults {
            runtime_order: vec!["definitely-not-a-real-binary-xyz".to_string()],
            ..container_config()
        }).unwrap();
        let result = manager.prepare("alpine:latest", &[]).await;
        assert!(result.is_err());
        assert!(manager.run_script_path().exists());
        assert!(manager.exec_script_path().exists());
    }
}
