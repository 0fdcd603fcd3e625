use clap::{Args, ValueEnum};
use safespace::sandbox::{SandboxController, SandboxMode};

use crate::cli::GlobalFlags;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    Ephemeral,
    Internal,
    Persistent,
}

impl From<ModeArg> for SandboxMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Ephemeral => SandboxMode::Ephemeral,
            ModeArg::Internal => SandboxMode::Internal,
            ModeArg::Persistent => SandboxMode::Persistent,
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Lifecycle mode for the new sandbox.
    #[arg(long, value_enum, default_value = "ephemeral")]
    pub mode: ModeArg,

    /// Friendly name, required for persistent sandboxes that will be
    /// re-entered by name later.
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn execute(args: CreateArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;

    let controller = SandboxController::create(settings, root, args.mode.into(), args.name).await?;
    println!("{}", controller.sandbox.id);
    Ok(())
}
