//! The Node type and its lifecycle state

use fleetboot_bmc::NodeController;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which environment a node is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeState {
    /// Environment cannot be vouched for (e.g. a reboot went wrong)
    #[default]
    Unknown,
    /// Normal firmware/production environment
    Production,
    /// Network-booted deployment environment
    DeployEnv,
    /// Freshly provisioned, recorded environment
    DeployedEnv,
}

impl NodeState {
    /// Internal string representation for serialization/storage
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Unknown => "unknown",
            NodeState::Production => "production",
            NodeState::DeployEnv => "deploy-env",
            NodeState::DeployedEnv => "deployed-env",
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical node in the fleet
///
/// Inventory data only; the node's current state lives in the fleet view.
#[derive(Clone)]
pub struct Node {
    /// Identity of the node
    pub hostname: String,

    /// Address probed for reachability (defaults to the hostname)
    pub address: Option<String>,

    /// VLAN the node belongs on once rebooted
    pub vlan: Option<String>,

    /// How this node is powered, rebooted and reached on its console
    pub bindings: Arc<dyn NodeController>,
}

impl Node {
    pub fn new(hostname: impl Into<String>, bindings: Arc<dyn NodeController>) -> Self {
        Self {
            hostname: hostname.into(),
            address: None,
            vlan: None,
            bindings,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_vlan(mut self, vlan: impl Into<String>) -> Self {
        self.vlan = Some(vlan.into());
        self
    }

    /// Host to probe when checking whether the node is up
    pub fn probe_target(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.hostname)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("hostname", &self.hostname)
            .field("address", &self.address)
            .field("vlan", &self.vlan)
            .finish_non_exhaustive()
    }
}
