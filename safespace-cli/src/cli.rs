//! Global flags shared by every subcommand, and the `Settings` resolution
//! they feed into [`crate::commands`].

use std::path::PathBuf;

use clap::Parser;
use safespace::Settings;

use crate::commands;

#[derive(Parser, Debug)]
#[command(name = "safespace", version, about = "Isolated execution sandboxes")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: commands::Command,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalFlags {
    /// Path to the SafeSpace config file (default: ~/.config/safespace/config.yaml).
    #[arg(long, global = true, env = "SAFESPACE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sandbox root directory this invocation operates on.
    #[arg(long, global = true, env = "SAFESPACE_ROOT")]
    pub root: Option<PathBuf>,

    /// Sudo password for operations requiring elevated network/container
    /// setup, read once at process start rather than cached to disk.
    #[arg(long, global = true, env = "SAFESPACE_SUDO_PASSWORD", hide_env_values = true)]
    pub sudo_password: Option<String>,
}

impl GlobalFlags {
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::load_default()?,
        };
        settings.sudo_password = self.sudo_password.clone();
        Ok(settings)
    }

    pub fn require_root(&self) -> anyhow::Result<PathBuf> {
        self.root
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--root (or SAFESPACE_ROOT) is required for this command"))
    }
}
