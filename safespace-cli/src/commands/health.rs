use safespace::sandbox::SandboxController;

use crate::cli::GlobalFlags;

pub async fn execute(global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;

    let controller = SandboxController::attach(settings, root)?;
    let report = controller.check_health();

    if report.ok {
        println!("ok");
        Ok(())
    } else {
        for issue in &report.issues {
            eprintln!("- {issue}");
        }
        anyhow::bail!("sandbox is unhealthy ({} issue(s))", report.issues.len());
    }
}
