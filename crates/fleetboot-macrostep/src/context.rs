//! Execution context and rights gate

use crate::error::{MacrostepError, Result};
use fleetboot_common::{FleetView, Operation, RightsStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Everything one API call carries into the engine
///
/// Created at request entry and dropped with the response.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Authenticated user
    pub user: String,
    pub rights: Arc<dyn RightsStore>,
    pub fleet: Arc<dyn FleetView>,
    /// Resolved node batch, deduplicated in request order
    pub nodes: Vec<String>,
}

impl ExecutionContext {
    pub fn new(
        user: impl Into<String>,
        rights: Arc<dyn RightsStore>,
        fleet: Arc<dyn FleetView>,
        nodes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut seen = HashSet::new();
        let nodes = nodes
            .into_iter()
            .map(Into::into)
            .filter(|node: &String| seen.insert(node.clone()))
            .collect();
        Self {
            user: user.into(),
            rights,
            fleet,
            nodes,
        }
    }

    /// Check that the user holds `operation` over the whole batch
    pub async fn authorize(&self, operation: Operation) -> Result<()> {
        if self
            .rights
            .granted(&self.user, &self.nodes, operation)
            .await?
        {
            Ok(())
        } else {
            warn!(user = %self.user, %operation, nodes = self.nodes.len(), "Rights check denied");
            Err(MacrostepError::AuthorizationDenied {
                user: self.user.clone(),
                operation,
            })
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("user", &self.user)
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}
