pub mod inspect;
pub mod macrostep;
pub mod serve;

use color_eyre::eyre::{eyre, Result};
use fleetboot_common::FleetConfig;
use fleetboot_server::AppState;
use std::path::Path;

/// Load the configuration and build the shared state from it
pub async fn load_state(config_path: &Path) -> Result<AppState> {
    let config = FleetConfig::load(config_path).await?;
    Ok(AppState::from_config(&config)?)
}

/// Caller identity: `--user`, else the login name
pub fn resolve_user(user: Option<String>) -> Result<String> {
    user.or_else(|| std::env::var("USER").ok())
        .filter(|user| !user.trim().is_empty())
        .ok_or_else(|| eyre!("no user given: pass --user"))
}
