//! Step records
//!
//! A step is one primitive invocation inside a macrostep. Steps carry only
//! their static arguments; the execution level and run arguments are
//! supplied by the executor.

use fleetboot_bmc::PowerMode;
use fleetboot_ipxe::BootProfile;
use serde::{Deserialize, Serialize};

/// Which PXE transition a `switch_pxe` step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PxeSwitchKind {
    /// Pin the profile named in the run arguments
    Pinned,
    /// Production environment to deployment environment
    ProductionToDeploy,
    /// Deployment environment to the freshly recorded environment
    DeployToDeployed,
}

impl PxeSwitchKind {
    /// Profile the node boots next; `None` when a pinned name is missing
    pub fn profile(&self, pinned: Option<&str>) -> Option<BootProfile> {
        match self {
            PxeSwitchKind::Pinned => pinned.map(|name| BootProfile::Pinned(name.to_string())),
            PxeSwitchKind::ProductionToDeploy => Some(BootProfile::DeployEnv),
            PxeSwitchKind::DeployToDeployed => Some(BootProfile::Deployed),
        }
    }
}

/// How readiness is observed after a reboot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStyle {
    /// Poll until the required ports accept and the forbidden ones refuse
    #[default]
    Classical,
    /// Wait for the boot port to go down first, then poll as classical
    Kexec,
}

/// Environment a `wait_reboot` step expects the node to come back in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    /// The user environment (ssh plus configured user ports)
    User,
    /// The deployment environment (deployment agent port)
    Deploy,
}

/// Key delivery topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDistribution {
    /// One fan-out delivery for the whole batch
    Tree,
    /// One delivery per node
    Direct,
}

/// A single step of a macrostep definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Power { mode: PowerMode },
    Reboot,
    SetVlan,
    SwitchPxe { profile: PxeSwitchKind },
    WaitReboot { style: ProbeStyle, target: TargetState },
    SendKey { distribution: KeyDistribution },
}

impl Step {
    /// Primitive name, as used in logs and verdicts
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Power { .. } => "power",
            Step::Reboot => "reboot",
            Step::SetVlan => "set_vlan",
            Step::SwitchPxe { .. } => "switch_pxe",
            Step::WaitReboot { .. } => "wait_reboot",
            Step::SendKey { .. } => "send_key",
        }
    }

    /// Whether the step issues the reboot signal
    pub fn is_reboot(&self) -> bool {
        matches!(self, Step::Reboot)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Power { mode } => write!(f, "power({})", mode),
            Step::SwitchPxe { profile } => write!(f, "switch_pxe({:?})", profile),
            Step::WaitReboot { style, target } => {
                write!(f, "wait_reboot({:?}, {:?})", style, target)
            }
            Step::SendKey { distribution } => write!(f, "send_key({:?})", distribution),
            other => f.write_str(other.kind()),
        }
    }
}
