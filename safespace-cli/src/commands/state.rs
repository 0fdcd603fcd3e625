use clap::Args;
use comfy_table::Table;
use safespace::sandbox::SandboxController;
use safespace::state_store::Lookup;

use crate::cli::GlobalFlags;

pub async fn execute_save(global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;
    let mut controller = SandboxController::attach(settings, root)?;
    controller.save_state()?;
    println!("saved");
    Ok(())
}

pub async fn execute_list() -> anyhow::Result<()> {
    let records = SandboxController::list_saved_environments()?;

    let mut table = Table::new();
    table.set_header(vec!["id", "name", "root", "last_accessed"]);
    for record in &records {
        table.add_row(vec![
            record.id.clone(),
            record.name.clone().unwrap_or_default(),
            record.root_dir.display().to_string(),
            record.last_accessed.to_rfc3339(),
        ]);
    }
    println!("{table}");
    Ok(())
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[arg(long, required_unless_present = "name")]
    pub id: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn execute_load(args: LoadArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let lookup = match (&args.id, &args.name) {
        (Some(id), _) => Lookup::Id(id),
        (_, Some(name)) => Lookup::Name(name),
        _ => unreachable!("clap enforces one of id/name"),
    };

    let controller = SandboxController::load_from_state(settings, lookup).await?;
    println!("{}", controller.sandbox.root.display());
    Ok(())
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: String,
}

pub async fn execute_delete(args: DeleteArgs) -> anyhow::Result<()> {
    let deleted = SandboxController::delete_saved_state(&args.id)?;
    if deleted {
        println!("deleted");
        Ok(())
    } else {
        anyhow::bail!("no saved sandbox with id {}", args.id);
    }
}
