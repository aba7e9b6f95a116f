//! API resource kinds and their URL prefixes

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Resource kinds of the fleet API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    Deployment,
    Reboot,
    Power,
    Stats,
    Environments,
    Nodes,
    Rights,
}

impl ApiKind {
    pub const ALL: [ApiKind; 7] = [
        ApiKind::Deployment,
        ApiKind::Reboot,
        ApiKind::Power,
        ApiKind::Stats,
        ApiKind::Environments,
        ApiKind::Nodes,
        ApiKind::Rights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKind::Deployment => "deployment",
            ApiKind::Reboot => "reboot",
            ApiKind::Power => "power",
            ApiKind::Stats => "stats",
            ApiKind::Environments => "environments",
            ApiKind::Nodes => "nodes",
            ApiKind::Rights => "rights",
        }
    }

    /// URL path prefix the kind is served under
    pub fn path_prefix(&self) -> &'static str {
        match self {
            ApiKind::Deployment => "/deployment",
            ApiKind::Reboot => "/reboot",
            ApiKind::Power => "/power",
            ApiKind::Stats => "/stats",
            ApiKind::Environments => "/environments",
            ApiKind::Nodes => "/nodes",
            ApiKind::Rights => "/rights",
        }
    }

    /// Whether this server answers the kind (the rest belong to other services)
    pub fn is_served(&self) -> bool {
        matches!(
            self,
            ApiKind::Reboot | ApiKind::Power | ApiKind::Nodes | ApiKind::Rights
        )
    }

    /// Kind owning a request path
    pub fn from_path(path: &str) -> Option<Self> {
        ApiKind::ALL.iter().copied().find(|kind| {
            path.strip_prefix(kind.path_prefix())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown API kind: {}", s))
    }
}
