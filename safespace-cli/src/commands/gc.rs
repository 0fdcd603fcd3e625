use safespace::sandbox::SandboxController;

use crate::cli::GlobalFlags;

pub async fn execute_clean_cache(global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;

    let controller = SandboxController::attach(settings, root)?;
    controller.clean_cache()?;
    println!("cache cleaned");
    Ok(())
}

pub async fn execute_gc(global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;

    let controller = SandboxController::attach(settings, root)?;
    let removed = controller.gc()?;
    println!("removed {removed} stale file(s)");
    Ok(())
}
