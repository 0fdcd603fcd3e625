mod cli;
mod commands;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    safespace::logging::init_logging();

    let cli = cli::Cli::parse();
    commands::dispatch(cli.command, &cli.global).await
}
