use clap::{Args, Subcommand};
use safespace::sandbox::SandboxController;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct ContainerArgs {
    #[command(subcommand)]
    pub action: ContainerAction,
}

#[derive(Subcommand, Debug)]
pub enum ContainerAction {
    /// Detect a runtime, create the dedicated network, and pull `image`.
    Setup(SetupArgs),
    /// Run the container detached.
    Start { image: String },
    /// Stop the container.
    Stop,
    /// Print whether the container is currently running.
    Status,
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    pub image: String,
    #[arg(long)]
    pub memory: Option<String>,
    #[arg(long)]
    pub cpus: Option<f32>,
    #[arg(long)]
    pub storage_size: Option<String>,
}

pub async fn execute(args: ContainerArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;
    let mut controller = SandboxController::attach(settings, root)?;

    match args.action {
        ContainerAction::Setup(setup) => {
            controller
                .setup_container(&setup.image, setup.memory, setup.cpus, setup.storage_size)
                .await?;
            println!("container facet ready");
        }
        ContainerAction::Start { image } => {
            controller.start_container(&image).await?;
            println!("container started");
        }
        ContainerAction::Stop => {
            controller.stop_container().await?;
            println!("container stopped");
        }
        ContainerAction::Status => {
            let running = controller.is_container_running().await;
            println!("{}", if running { "running" } else { "stopped" });
        }
    }
    Ok(())
}
