use clap::{Args, ValueEnum};
use safespace::sandbox::SandboxController;

use crate::cli::GlobalFlags;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Facet {
    Network,
    Container,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Which isolated facet to run the command inside.
    #[arg(long, value_enum)]
    pub facet: Facet,

    /// Command and arguments to run (pass after `--`).
    #[arg(required = true, last = true)]
    pub argv: Vec<String>,
}

pub async fn execute(args: RunArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;
    let mut controller = SandboxController::attach(settings, root)?;

    let output = match args.facet {
        Facet::Network => controller.run_in_network(&args.argv).await?,
        Facet::Container => controller.run_in_container(&args.argv).await?,
    };

    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    if !output.success() {
        anyhow::bail!("command exited with status {}", output.status);
    }
    Ok(())
}
