//! Fleetboot API server
//!
//! Thin HTTP layer over the macrostep engine. Every request carries the
//! calling user in the `X-Fleetboot-User` header; rights are checked against
//! the whole node batch before the executor touches a single node.

pub mod api;
pub mod error;
pub mod kinds;

#[cfg(test)]
pub mod test_helpers;

use anyhow::Context;
use fleetboot_common::{FleetConfig, FleetView, RightsStore};
use fleetboot_macrostep::{ExecutionContext, MacrostepEvent, MacrostepExecutor, StepPrimitives};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

pub use api::{router, USER_HEADER};
pub use error::{ApiError, Result};
pub use kinds::ApiKind;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<dyn FleetView>,
    pub rights: Arc<dyn RightsStore>,
    pub executor: Arc<MacrostepExecutor>,
}

impl AppState {
    pub fn new(
        fleet: Arc<dyn FleetView>,
        rights: Arc<dyn RightsStore>,
        executor: Arc<MacrostepExecutor>,
    ) -> Self {
        Self {
            fleet,
            rights,
            executor,
        }
    }

    /// Build fleet, rights and primitives from a validated configuration
    pub fn from_config(config: &FleetConfig) -> fleetboot_common::Result<Self> {
        let fleet = config.build_fleet()?;
        info!(nodes = fleet.len(), "Fleet inventory loaded");
        Ok(Self::new(
            Arc::new(fleet),
            Arc::new(config.build_rights()),
            Arc::new(MacrostepExecutor::new(StepPrimitives::from_config(config))),
        ))
    }

    /// Per-request execution context
    pub fn context(
        &self,
        user: &str,
        nodes: impl IntoIterator<Item = impl Into<String>>,
    ) -> ExecutionContext {
        ExecutionContext::new(user, self.rights.clone(), self.fleet.clone(), nodes)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("nodes", &self.fleet.hostnames().len())
            .finish_non_exhaustive()
    }
}

/// Serve the API until Ctrl+C or SIGTERM
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    tokio::spawn(log_events(state.executor.subscribe()));

    let app = router().with_state(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!("fleetboot API listening on http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) = signal(SignalKind::terminate()) {
            signal.recv().await;
            info!("Received SIGTERM");
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<MacrostepEvent>) {
    loop {
        match events.recv().await {
            Ok(MacrostepEvent::NodeFailed {
                macrostep,
                node,
                outcome,
            }) => {
                warn!(macrostep = %macrostep, node = %node, ?outcome, "Node dropped from batch");
            }
            Ok(event) => debug!(?event, "Macrostep event"),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
