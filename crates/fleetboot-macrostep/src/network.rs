//! Network-side primitives: VLAN assignment and key delivery
//!
//! Both are external mechanisms reached through configured command
//! templates. The traits are the seam tests replace.

use crate::error::{MacrostepError, Result};
use async_trait::async_trait;
use fleetboot_bmc::shell::{run_command, DEFAULT_COMMAND_TIMEOUT};
use fleetboot_common::{render_command, NetworkSettings, Node};
use minijinja::context;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Moves nodes onto their target VLAN
#[async_trait]
pub trait VlanSwitcher: Send + Sync {
    async fn set_vlan(&self, node: &Node) -> Result<()>;
}

/// Hands the deployment key to nodes booted in the deployment environment
#[async_trait]
pub trait KeyDistributor: Send + Sync {
    /// Deliver to one node
    async fn deliver_direct(&self, node: &Node) -> Result<()>;

    /// Deliver to a batch through the fan-out tree
    async fn deliver_tree(&self, nodes: &[Node]) -> Result<()>;

    /// Whether `deliver_tree` is available
    fn has_tree(&self) -> bool {
        true
    }
}

/// VLAN and key handling backed by command templates
#[derive(Debug, Clone)]
pub struct CommandNetwork {
    vlan_command: Option<String>,
    key_direct_command: Option<String>,
    key_tree_command: Option<String>,
    deploy_key: Option<PathBuf>,
    timeout: Duration,
}

impl CommandNetwork {
    pub fn new(settings: &NetworkSettings) -> Self {
        Self {
            vlan_command: settings.vlan_command.clone(),
            key_direct_command: settings.key_direct_command.clone(),
            key_tree_command: settings.key_tree_command.clone(),
            deploy_key: settings.deploy_key.clone(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn key(&self) -> String {
        self.deploy_key
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VlanSwitcher for CommandNetwork {
    async fn set_vlan(&self, node: &Node) -> Result<()> {
        // Without a command, VLAN membership is static.
        let Some(template) = &self.vlan_command else {
            debug!(node = %node.hostname, "No VLAN command, membership left as is");
            return Ok(());
        };
        let Some(vlan) = &node.vlan else {
            return Err(MacrostepError::NotConfigured("node VLAN"));
        };

        let command = render_command(
            "network.vlan_command",
            template,
            context! {
                node => &node.hostname,
                address => node.probe_target(),
                vlan => vlan,
            },
        )?;
        run_command(&command, self.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyDistributor for CommandNetwork {
    async fn deliver_direct(&self, node: &Node) -> Result<()> {
        let template = self
            .key_direct_command
            .as_ref()
            .ok_or(MacrostepError::NotConfigured("key delivery command"))?;

        let command = render_command(
            "network.key_direct_command",
            template,
            context! {
                node => &node.hostname,
                address => node.probe_target(),
                key => self.key(),
            },
        )?;
        run_command(&command, self.timeout).await?;
        Ok(())
    }

    async fn deliver_tree(&self, nodes: &[Node]) -> Result<()> {
        let template = self
            .key_tree_command
            .as_ref()
            .ok_or(MacrostepError::NotConfigured("key tree command"))?;

        let hostnames: Vec<&str> = nodes.iter().map(|n| n.hostname.as_str()).collect();
        let addresses: Vec<&str> = nodes.iter().map(|n| n.probe_target()).collect();
        let command = render_command(
            "network.key_tree_command",
            template,
            context! {
                nodes => hostnames,
                addresses => addresses,
                key => self.key(),
            },
        )?;
        run_command(&command, self.timeout).await?;
        Ok(())
    }

    fn has_tree(&self) -> bool {
        self.key_tree_command.is_some()
    }
}
