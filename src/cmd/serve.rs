//! `fleetboot serve`

use clap::Args;
use color_eyre::eyre::{eyre, Result};
use std::net::SocketAddr;
use std::path::Path;
use tracing::{error, info};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address the API listens on
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,
}

pub async fn run(config_path: &Path, args: ServeArgs) -> Result<()> {
    let state = super::load_state(config_path).await?;
    info!("Starting fleetboot API - press Ctrl+C to stop");

    if let Err(e) = fleetboot_server::serve(state, args.listen).await {
        error!("Server failed to run: {:#}", e);
        return Err(eyre!("server failed: {:#}", e));
    }
    Ok(())
}
