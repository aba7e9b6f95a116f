//! Rights store
//!
//! A grant gives a user one operation (or every operation) over a set of
//! nodes. A request is allowed only when every requested node is covered.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

/// Operations guarded by the rights store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Reboot,
    Power,
    Console,
    NodesGet,
    /// Matches every operation
    #[serde(rename = "*")]
    Any,
}

impl Operation {
    fn covers(&self, requested: Operation) -> bool {
        *self == Operation::Any || *self == requested
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Reboot => write!(f, "reboot"),
            Operation::Power => write!(f, "power"),
            Operation::Console => write!(f, "console"),
            Operation::NodesGet => write!(f, "nodes_get"),
            Operation::Any => write!(f, "*"),
        }
    }
}

/// Which nodes a grant covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodePattern {
    /// `"*"`: every node
    All(AllNodes),
    /// Explicit hostnames
    Hosts(BTreeSet<String>),
}

/// Marker for the `"*"` pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllNodes;

impl Serialize for AllNodes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("*")
    }
}

impl<'de> Deserialize<'de> for AllNodes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "*" {
            Ok(AllNodes)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected \"*\" or a list of hostnames, got \"{}\"",
                s
            )))
        }
    }
}

impl NodePattern {
    pub fn all() -> Self {
        NodePattern::All(AllNodes)
    }

    pub fn hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NodePattern::Hosts(hosts.into_iter().map(Into::into).collect())
    }

    fn matches(&self, node: &str) -> bool {
        match self {
            NodePattern::All(_) => true,
            NodePattern::Hosts(hosts) => hosts.contains(node),
        }
    }
}

impl FromStr for NodePattern {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim() == "*" {
            Ok(NodePattern::all())
        } else {
            Ok(NodePattern::hosts(
                s.split(',').map(str::trim).filter(|h| !h.is_empty()),
            ))
        }
    }
}

/// One entry of a user's rights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub operation: Operation,
    pub nodes: NodePattern,
}

/// Trait for rights lookups
#[async_trait]
pub trait RightsStore: Send + Sync {
    /// Whether `user` may run `operation` on every node in `nodes`
    async fn granted(&self, user: &str, nodes: &[String], operation: Operation) -> Result<bool>;

    /// Grants held by a user
    async fn grants(&self, user: &str) -> Result<Vec<Grant>>;
}

/// In-memory rights table
#[derive(Debug, Clone, Default)]
pub struct MemoryRights {
    grants: HashMap<String, Vec<Grant>>,
}

impl MemoryRights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(grants: HashMap<String, Vec<Grant>>) -> Self {
        Self { grants }
    }

    /// Add a grant for a user
    pub fn grant(mut self, user: impl Into<String>, operation: Operation, nodes: NodePattern) -> Self {
        self.grants
            .entry(user.into())
            .or_default()
            .push(Grant { operation, nodes });
        self
    }
}

#[async_trait]
impl RightsStore for MemoryRights {
    async fn granted(&self, user: &str, nodes: &[String], operation: Operation) -> Result<bool> {
        let Some(grants) = self.grants.get(user) else {
            return Ok(false);
        };
        Ok(nodes.iter().all(|node| {
            grants
                .iter()
                .any(|g| g.operation.covers(operation) && g.nodes.matches(node))
        }))
    }

    async fn grants(&self, user: &str) -> Result<Vec<Grant>> {
        Ok(self.grants.get(user).cloned().unwrap_or_default())
    }
}
