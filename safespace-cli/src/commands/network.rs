use clap::{Args, Subcommand};
use safespace::network::NetworkConditions;
use safespace::sandbox::SandboxController;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct NetworkArgs {
    #[command(subcommand)]
    pub action: NetworkAction,
}

#[derive(Subcommand, Debug)]
pub enum NetworkAction {
    /// Establish the isolation topology (namespace/veth/NAT or pf alias).
    Setup,
    /// Apply traffic-shaping conditions.
    Shape(ConditionArgs),
    /// Merge new conditions over the currently active ones.
    Update(ConditionArgs),
    /// Remove all shaping and restore the platform default.
    Reset,
    /// Print the currently active conditions.
    Status,
}

#[derive(Args, Debug, Default)]
pub struct ConditionArgs {
    #[arg(long)]
    pub latency: Option<String>,
    #[arg(long)]
    pub jitter: Option<String>,
    #[arg(long)]
    pub packet_loss: Option<f64>,
    #[arg(long)]
    pub corruption: Option<f64>,
    #[arg(long)]
    pub reorder: Option<f64>,
    #[arg(long)]
    pub bandwidth: Option<String>,
}

impl From<ConditionArgs> for NetworkConditions {
    fn from(args: ConditionArgs) -> Self {
        NetworkConditions {
            latency: args.latency,
            jitter: args.jitter,
            packet_loss: args.packet_loss,
            corruption: args.corruption,
            reorder: args.reorder,
            bandwidth: args.bandwidth,
        }
    }
}

pub async fn execute(args: NetworkArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let root = global.require_root()?;
    let sudo = settings.sudo_password.clone();

    let mut controller = SandboxController::attach(settings, root)?;

    match args.action {
        NetworkAction::Setup => {
            controller.setup_network_isolation(sudo.as_deref()).await?;
            println!("network isolation established");
        }
        NetworkAction::Shape(conditions) => {
            controller.setup_network_conditions(conditions.into(), sudo.as_deref()).await?;
            println!("conditions applied");
        }
        NetworkAction::Update(conditions) => {
            controller.update_network_conditions(conditions.into(), sudo.as_deref()).await?;
            println!("conditions updated");
        }
        NetworkAction::Reset => {
            controller.reset_network_conditions(sudo.as_deref()).await?;
            println!("conditions reset");
        }
        NetworkAction::Status => {
            let snapshot = controller
                .get_network_conditions()
                .ok_or_else(|| anyhow::anyhow!("network isolation not set up"))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}
