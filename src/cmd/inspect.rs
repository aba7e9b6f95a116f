//! `fleetboot nodes` and `fleetboot check-config`

use clap::Args;
use color_eyre::eyre::Result;
use fleetboot_common::{FleetConfig, FleetView, Operation};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Args, Debug)]
pub struct NodesArgs {
    /// Acting user (defaults to $USER)
    #[arg(long)]
    pub user: Option<String>,

    /// Nodes to show; the whole inventory when empty
    pub nodes: Vec<String>,
}

pub async fn nodes(config_path: &Path, args: NodesArgs) -> Result<()> {
    let user = super::resolve_user(args.user)?;
    let state = super::load_state(config_path).await?;

    let requested = if args.nodes.is_empty() {
        state.fleet.hostnames()
    } else {
        args.nodes
    };
    let ctx = state.context(&user, requested);
    ctx.authorize(Operation::NodesGet).await?;

    let states: BTreeMap<_, _> = state.fleet.get_states(&ctx.nodes).await?.into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&states)?);
    Ok(())
}

pub async fn check_config(config_path: &Path) -> Result<()> {
    let config = FleetConfig::load(config_path).await?;
    let fleet = config.build_fleet()?;
    println!(
        "Configuration OK: {} nodes, {} users ({})",
        fleet.len(),
        config.rights.len(),
        config_path.display()
    );
    Ok(())
}
