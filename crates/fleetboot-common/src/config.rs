//! Fleetboot configuration
//!
//! One YAML document describes the probe and reboot tuning, the PXE profile
//! store, the network commands, the node inventory with its command tables,
//! the per-node override table and the rights table.
//!
//! Loading is all-or-nothing: the document is parsed, then every section is
//! validated, and only a fully valid configuration can be turned into a
//! fleet. A single unknown command kind anywhere rejects the whole file.

use crate::error::{FleetError, Result};
use crate::fleet::MemoryFleet;
use crate::node::Node;
use crate::rights::{Grant, MemoryRights};
use fleetboot_bmc::{CommandController, CommandKind, IpmiConfig, IpmiController, NodeController};
use fleetboot_ipxe::{FilePxeSwitcher, IpxeConfig, IpxeScriptGenerator};
use minijinja::{context, Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reachability probe tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Deadline of a single connect attempt, in milliseconds
    pub connect_timeout_ms: u64,
    /// Cap on connect attempts in flight at once
    pub max_outstanding: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            max_outstanding: 512,
        }
    }
}

impl ProbeSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Reboot and readiness tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebootSettings {
    /// How long a node may take to come back, in seconds
    pub timeout: u64,
    /// Delay between two readiness polls, in seconds
    pub poll_interval: u64,
    /// Port that answers once the user environment is up
    pub ssh_port: u16,
    /// Port of the agent running in the deployment environment
    pub deploy_agent_port: u16,
    /// Extra ports that must accept in the user environment
    pub user_ports_up: Vec<u16>,
    /// Ports that must refuse in the user environment
    pub user_ports_down: Vec<u16>,
    /// Nodes handled concurrently by one step
    pub parallelism: usize,
    /// Bound on a single power/reboot/network command, in seconds
    pub command_timeout: u64,
}

impl Default for RebootSettings {
    fn default() -> Self {
        Self {
            timeout: 600,
            poll_interval: 5,
            ssh_port: 22,
            deploy_agent_port: 25300,
            user_ports_up: Vec::new(),
            user_ports_down: Vec::new(),
            parallelism: 64,
            command_timeout: 120,
        }
    }
}

impl RebootSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}

/// Where per-node boot profiles are written and how they are rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PxeSettings {
    pub profile_dir: PathBuf,
    #[serde(flatten)]
    pub ipxe: IpxeConfig,
}

impl Default for PxeSettings {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("/var/lib/fleetboot/pxe"),
            ipxe: IpxeConfig::default(),
        }
    }
}

impl PxeSettings {
    /// Build the profile switcher for this store
    pub fn switcher(&self) -> FilePxeSwitcher {
        FilePxeSwitcher::new(
            self.profile_dir.clone(),
            IpxeScriptGenerator::new(self.ipxe.clone()),
        )
    }
}

/// Network-side commands run around a reboot
///
/// Each command is a template rendered per run with `node`, `address`,
/// `vlan`, `key` and `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Moves one node onto its VLAN; no command means VLANs are static
    pub vlan_command: Option<String>,
    /// VLAN used for nodes without their own
    pub default_vlan: Option<String>,
    /// Path of the key handed to the deployment environment
    pub deploy_key: Option<PathBuf>,
    /// Delivers the key to one node
    pub key_direct_command: Option<String>,
    /// Delivers the key to a whole batch through a fan-out tree
    pub key_tree_command: Option<String>,
}

/// One inventory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub hostname: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub vlan: Option<String>,
    /// BMC reached with ipmitool for kinds missing from `commands`
    #[serde(default)]
    pub ipmi: Option<IpmiConfig>,
    /// Command templates keyed by command kind
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub probe: ProbeSettings,
    pub reboot: RebootSettings,
    pub pxe: PxeSettings,
    pub network: NetworkSettings,
    pub nodes: Vec<NodeEntry>,
    /// node -> { command kind -> command }, applied over `nodes[].commands`
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,
    pub rights: HashMap<String, Vec<Grant>>,
}

impl FleetConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FleetConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path).await?;
        let config = Self::from_yaml(&yaml)?;
        info!(
            path = %path.display(),
            nodes = config.nodes.len(),
            users = config.rights.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check every section without building anything
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.nodes {
            if entry.hostname.trim().is_empty() {
                return Err(FleetError::InvalidConfig(
                    "node with empty hostname".to_string(),
                ));
            }
            if !seen.insert(entry.hostname.as_str()) {
                return Err(FleetError::DuplicateNode(entry.hostname.clone()));
            }
            parse_command_table(&entry.hostname, &entry.commands)?;
        }

        for (node, table) in &self.overrides {
            if !seen.contains(node.as_str()) {
                return Err(FleetError::OverrideForUnknownNode(node.clone()));
            }
            parse_command_table(node, table)?;
        }

        if self.reboot.parallelism == 0 {
            return Err(FleetError::InvalidConfig(
                "reboot.parallelism must be at least 1".to_string(),
            ));
        }
        if self.reboot.poll_interval == 0 {
            return Err(FleetError::InvalidConfig(
                "reboot.poll_interval must be at least 1 second".to_string(),
            ));
        }
        if self.probe.max_outstanding == 0 {
            return Err(FleetError::InvalidConfig(
                "probe.max_outstanding must be at least 1".to_string(),
            ));
        }

        for (name, template) in [
            ("network.vlan_command", &self.network.vlan_command),
            ("network.key_direct_command", &self.network.key_direct_command),
            ("network.key_tree_command", &self.network.key_tree_command),
        ] {
            if let Some(template) = template {
                check_template(name, template)?;
            }
        }

        for (user, grants) in &self.rights {
            for grant in grants {
                if let crate::rights::NodePattern::Hosts(hosts) = &grant.nodes {
                    for host in hosts.iter().filter(|h| !seen.contains(h.as_str())) {
                        warn!(user, host, "Grant references a node missing from the inventory");
                    }
                }
            }
        }

        Ok(())
    }

    /// Build the fleet inventory with rendered node bindings
    ///
    /// Every command line is rendered before the first node is created, so
    /// a template error leaves nothing behind.
    pub fn build_fleet(&self) -> Result<MemoryFleet> {
        self.validate()?;

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for entry in &self.nodes {
            let mut templates = parse_command_table(&entry.hostname, &entry.commands)?;
            if let Some(overrides) = self.overrides.get(&entry.hostname) {
                templates.extend(parse_command_table(&entry.hostname, overrides)?);
            }

            let vlan = entry.vlan.clone().or_else(|| self.network.default_vlan.clone());
            let address = entry.address.clone().unwrap_or_else(|| entry.hostname.clone());
            let mut commands = HashMap::with_capacity(templates.len());
            for (kind, template) in templates {
                let rendered = render_command(
                    &format!("{}.{}", entry.hostname, kind),
                    &template,
                    context! {
                        node => &entry.hostname,
                        address => &address,
                        vlan => &vlan,
                    },
                )?;
                commands.insert(kind, rendered);
            }

            let mut controller = CommandController::new(entry.hostname.clone(), commands)
                .with_timeout(self.reboot.command_timeout());
            if let Some(ipmi) = &entry.ipmi {
                let fallback: Arc<dyn NodeController> = Arc::new(
                    IpmiController::new(entry.hostname.clone(), ipmi.clone())
                        .with_timeout(self.reboot.command_timeout()),
                );
                controller = controller.with_fallback(fallback);
            }

            let mut node = Node::new(entry.hostname.clone(), Arc::new(controller));
            if let Some(address) = &entry.address {
                node = node.with_address(address.clone());
            }
            if let Some(vlan) = vlan {
                node = node.with_vlan(vlan);
            }
            debug!(node = %node.hostname, "Node bindings built");
            nodes.push(node);
        }

        Ok(MemoryFleet::new(nodes))
    }

    /// Build the rights store
    pub fn build_rights(&self) -> MemoryRights {
        MemoryRights::from_table(self.rights.clone())
    }
}

/// Turn a raw command table into recognised kinds
fn parse_command_table(
    node: &str,
    table: &BTreeMap<String, String>,
) -> Result<BTreeMap<CommandKind, String>> {
    table
        .iter()
        .map(|(key, command)| {
            let kind = CommandKind::from_str(key).map_err(|kind| FleetError::UnknownCommandKind {
                node: node.to_string(),
                kind,
            })?;
            check_template(&format!("{}.{}", node, key), command)?;
            Ok((kind, command.clone()))
        })
        .collect()
}

fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

fn check_template(context: &str, template: &str) -> Result<()> {
    template_env()
        .template_from_str(template)
        .map(|_| ())
        .map_err(|e| FleetError::Template {
            context: context.to_string(),
            message: e.to_string(),
        })
}

/// Render a command template; undefined variables are errors
pub fn render_command<S: Serialize>(context: &str, template: &str, vars: S) -> Result<String> {
    template_env()
        .render_str(template, vars)
        .map_err(|e| FleetError::Template {
            context: context.to_string(),
            message: e.to_string(),
        })
}
