//! Subcommand dispatch: each module is thin verb glue over `safespace`,
//! one file per verb.

mod cleanup;
mod completions;
mod container;
mod create;
mod gc;
mod health;
mod network;
mod run;
mod state;
mod vm;

use clap::Subcommand;

use crate::cli::GlobalFlags;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new sandbox root.
    Create(create::CreateArgs),
    /// Check an existing sandbox's health.
    Health,
    /// Truncate the sandbox's cache/ and tmp/ directories.
    CleanCache,
    /// Remove stale logs (>24h) and temp files (>1h).
    Gc,
    /// Network isolation and traffic shaping.
    Network(network::NetworkArgs),
    /// VM facet.
    Vm(vm::VmArgs),
    /// Container facet.
    Container(container::ContainerArgs),
    /// Run a command inside an isolated facet.
    Run(run::RunArgs),
    /// Release facets and (for ephemeral sandboxes) remove the root.
    Cleanup(cleanup::CleanupArgs),
    /// Persist the sandbox's current state to the state store.
    Save,
    /// List saved sandboxes.
    List,
    /// Reconstitute a saved sandbox by id or name.
    Load(state::LoadArgs),
    /// Delete a saved sandbox's state record.
    Delete(state::DeleteArgs),
    /// Print a shell completion script.
    Completions(completions::CompletionsArgs),
}

pub async fn dispatch(command: Command, global: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Command::Create(args) => create::execute(args, global).await,
        Command::Health => health::execute(global).await,
        Command::CleanCache => gc::execute_clean_cache(global).await,
        Command::Gc => gc::execute_gc(global).await,
        Command::Network(args) => network::execute(args, global).await,
        Command::Vm(args) => vm::execute(args, global).await,
        Command::Container(args) => container::execute(args, global).await,
        Command::Run(args) => run::execute(args, global).await,
        Command::Cleanup(args) => cleanup::execute(args, global).await,
        Command::Save => state::execute_save(global).await,
        Command::List => state::execute_list().await,
        Command::Load(args) => state::execute_load(args, global).await,
        Command::Delete(args) => state::execute_delete(args).await,
        Command::Completions(args) => completions::execute(args),
    }
}
