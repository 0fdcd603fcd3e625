use clap::{Args, Subcommand};
use safespace::sandbox::SandboxController;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct VmArgs {
    #[command(subcommand)]
    pub action: VmAction,
}

#[derive(Subcommand, Debug)]
pub enum VmAction {
    /// Create the disk image, assign a MAC, and write launcher scripts.
    Setup(SetupArgs),
    /// Boot the emulator.
    Start,
    /// Stop the emulator.
    Stop,
    /// Print whether the VM is currently running.
    Status,
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    #[arg(long)]
    pub memory: Option<String>,
    #[arg(long)]
    pub cpus: Option<u32>,
    #[arg(long)]
    pub disk_size: Option<String>,
    #[arg(long)]
    pub headless: Option<bool>,
    /// Base image ISO URL to fetch and verify through the shared artifact cache.
    #[arg(long, requires = "sidecar_url")]
    pub iso_url: Option<String>,
    /// SHA-256 sidecar URL for the base image.
    #[arg(long)]
    pub sidecar_url: Option<String>,
}

pub async fn execute(args: VmArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;
    let mut controller = SandboxController::attach(settings, root)?;

    match args.action {
        VmAction::Setup(setup) => {
            let image_store = safespace::cache::ArtifactCache::open(controller.sandbox.cache_dir()).ok();
            controller
                .setup_vm(
                    setup.memory,
                    setup.cpus,
                    setup.disk_size,
                    setup.headless,
                    image_store.as_ref(),
                    setup.iso_url.as_deref(),
                    setup.sidecar_url.as_deref(),
                )
                .await?;
            println!("vm facet ready");
        }
        VmAction::Start => {
            controller.start_vm().await?;
            println!("vm started");
        }
        VmAction::Stop => {
            controller.stop_vm()?;
            println!("vm stopped");
        }
        VmAction::Status => {
            println!("{}", if controller.is_vm_running() { "running" } else { "stopped" });
        }
    }
    Ok(())
}
