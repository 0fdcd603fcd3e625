use clap::Args;
use safespace::sandbox::SandboxController;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Keep the root directory even for an ephemeral sandbox.
    #[arg(long)]
    pub keep_dir: bool,
}

pub async fn execute(args: CleanupArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;
    let mut controller = SandboxController::attach(settings, root)?;

    let failures = controller.cleanup(args.keep_dir).await;
    if failures.is_empty() {
        println!("cleaned up");
        Ok(())
    } else {
        for failure in &failures {
            eprintln!("- {failure}");
        }
        anyhow::bail!("cleanup had {} failure(s)", failures.len());
    }
}
