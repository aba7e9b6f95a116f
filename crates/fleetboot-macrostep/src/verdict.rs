//! Per-node verdicts and run reports

use crate::definitions::Macrostep;
use chrono::{DateTime, Utc};
use fleetboot_bmc::PowerState;
use fleetboot_common::NodeState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress of one node through a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Still moving through the step list
    Pending,
    /// Reached the end of the step list
    Success,
    /// Dropped at `step` (`None` when the node never entered the run)
    Failed {
        step: Option<usize>,
        kind: Option<String>,
        reason: String,
    },
    /// Wait window closed at `step`
    TimedOut { step: usize },
}

impl NodeOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, NodeOutcome::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Success)
    }
}

/// Final word on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVerdict {
    #[serde(flatten)]
    pub outcome: NodeOutcome,
    /// Fleet state after the run; `None` when the fleet holds no record
    pub state: Option<NodeState>,
    /// Power state observed by a status step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,
}

impl NodeVerdict {
    pub fn pending() -> Self {
        Self {
            outcome: NodeOutcome::Pending,
            state: None,
            power: None,
        }
    }
}

/// Result of one macrostep run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacrostepReport {
    pub macrostep: Macrostep,
    pub level: u8,
    /// One entry per node of the requested batch
    pub verdicts: BTreeMap<String, NodeVerdict>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MacrostepReport {
    /// Nodes that went through every step
    pub fn succeeded(&self) -> Vec<&str> {
        self.verdicts
            .iter()
            .filter(|(_, v)| v.outcome.is_success())
            .map(|(node, _)| node.as_str())
            .collect()
    }

    /// Nodes dropped along the way, failed or timed out
    pub fn failed(&self) -> Vec<&str> {
        self.verdicts
            .iter()
            .filter(|(_, v)| !v.outcome.is_success())
            .map(|(node, _)| node.as_str())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.verdicts.values().all(|v| v.outcome.is_success())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
