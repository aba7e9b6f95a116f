//! Fleet view
//!
//! The fleet view maps node identity to inventory (bindings, address) and to
//! the node's current lifecycle state. Inventory is fixed once loaded; state
//! is the only mutable shared data, written one node key at a time.

use crate::error::Result;
use crate::node::{Node, NodeState};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock};
use tracing::trace;

const STATE_SHARDS: usize = 16;

/// Trait for fleet inventory and node state access
#[async_trait]
pub trait FleetView: Send + Sync {
    /// Look up a node in the inventory
    fn node(&self, hostname: &str) -> Option<Node>;

    /// All hostnames in the inventory, sorted
    fn hostnames(&self) -> Vec<String>;

    /// Current state of each requested node; `None` when nothing is stored
    async fn get_states(&self, nodes: &[String]) -> Result<HashMap<String, Option<NodeState>>>;

    /// Record a node's state
    async fn set_state(&self, node: &str, state: NodeState) -> Result<()>;
}

/// In-memory fleet with sharded state locking
pub struct MemoryFleet {
    inventory: HashMap<String, Node>,
    shards: Vec<RwLock<HashMap<String, NodeState>>>,
}

impl MemoryFleet {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        let inventory = nodes
            .into_iter()
            .map(|node| (node.hostname.clone(), node))
            .collect();
        Self {
            inventory,
            shards: (0..STATE_SHARDS).map(|_| RwLock::default()).collect(),
        }
    }

    /// Number of nodes in the inventory
    pub fn len(&self) -> usize {
        self.inventory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty()
    }

    fn shard(&self, node: &str) -> &RwLock<HashMap<String, NodeState>> {
        let mut hasher = DefaultHasher::new();
        node.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }
}

#[async_trait]
impl FleetView for MemoryFleet {
    fn node(&self, hostname: &str) -> Option<Node> {
        self.inventory.get(hostname).cloned()
    }

    fn hostnames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inventory.keys().cloned().collect();
        names.sort();
        names
    }

    async fn get_states(&self, nodes: &[String]) -> Result<HashMap<String, Option<NodeState>>> {
        Ok(nodes
            .iter()
            .map(|node| {
                let state = self
                    .shard(node)
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(node)
                    .copied();
                (node.clone(), state)
            })
            .collect())
    }

    async fn set_state(&self, node: &str, state: NodeState) -> Result<()> {
        trace!(node, %state, "Recording node state");
        self.shard(node)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.to_string(), state);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryFleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFleet")
            .field("nodes", &self.inventory.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetboot_bmc::CommandController;
    use std::sync::Arc;

    fn fleet(names: &[&str]) -> MemoryFleet {
        MemoryFleet::new(names.iter().map(|name| {
            Node::new(*name, Arc::new(CommandController::new(*name, HashMap::new())))
        }))
    }

    #[test]
    fn test_inventory_lookup() {
        let fleet = fleet(&["node-2", "node-1"]);

        assert_eq!(fleet.len(), 2);
        assert!(fleet.node("node-1").is_some());
        assert!(fleet.node("ghost").is_none());
        assert_eq!(fleet.hostnames(), vec!["node-1", "node-2"]);
    }

    #[tokio::test]
    async fn test_states_default_to_none() {
        let fleet = fleet(&["node-1", "node-2"]);
        fleet.set_state("node-1", NodeState::Production).await.unwrap();

        let states = fleet
            .get_states(&["node-1".into(), "node-2".into(), "ghost".into()])
            .await
            .unwrap();

        assert_eq!(states.len(), 3);
        assert_eq!(states["node-1"], Some(NodeState::Production));
        assert_eq!(states["node-2"], None);
        assert_eq!(states["ghost"], None);
    }

    #[tokio::test]
    async fn test_set_state_overwrites() {
        let fleet = fleet(&["node-1"]);
        fleet.set_state("node-1", NodeState::DeployEnv).await.unwrap();
        fleet.set_state("node-1", NodeState::DeployedEnv).await.unwrap();

        let states = fleet.get_states(&["node-1".into()]).await.unwrap();
        assert_eq!(states["node-1"], Some(NodeState::DeployedEnv));
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_distinct_nodes() {
        let names: Vec<String> = (0..200).map(|i| format!("node-{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let fleet = Arc::new(fleet(&refs));

        let mut handles = Vec::new();
        for name in names.clone() {
            let fleet = fleet.clone();
            handles.push(tokio::spawn(async move {
                fleet.set_state(&name, NodeState::DeployEnv).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let states = fleet.get_states(&names).await.unwrap();
        assert!(states.values().all(|s| *s == Some(NodeState::DeployEnv)));
    }
}
