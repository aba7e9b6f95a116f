//! Macrostep definitions
//!
//! Each macrostep is a fixed, ordered list of steps. `switch_pxe` always
//! comes before `reboot`, and `set_vlan` always sits between `reboot` and
//! `wait_reboot`.

use crate::error::MacrostepError;
use crate::step::{KeyDistribution, ProbeStyle, PxeSwitchKind, Step, TargetState};
use fleetboot_bmc::PowerMode;
use fleetboot_common::{NodeState, Operation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const POWER_ON: &[Step] = &[Step::Power { mode: PowerMode::On }];
const POWER_OFF: &[Step] = &[Step::Power { mode: PowerMode::Off }];
const POWER_STATUS: &[Step] = &[Step::Power {
    mode: PowerMode::Status,
}];

const REBOOT_SIMPLE: &[Step] = &[
    Step::Reboot,
    Step::SetVlan,
    Step::WaitReboot {
        style: ProbeStyle::Classical,
        target: TargetState::User,
    },
];

const REBOOT_SET_PXE: &[Step] = &[
    Step::SwitchPxe {
        profile: PxeSwitchKind::Pinned,
    },
    Step::Reboot,
    Step::SetVlan,
    Step::WaitReboot {
        style: ProbeStyle::Classical,
        target: TargetState::User,
    },
];

const REBOOT_DEPLOY_ENV: &[Step] = &[
    Step::SwitchPxe {
        profile: PxeSwitchKind::ProductionToDeploy,
    },
    Step::Reboot,
    Step::SetVlan,
    Step::WaitReboot {
        style: ProbeStyle::Classical,
        target: TargetState::Deploy,
    },
    Step::SendKey {
        distribution: KeyDistribution::Tree,
    },
];

const REBOOT_RECORDED_ENV: &[Step] = &[
    Step::SwitchPxe {
        profile: PxeSwitchKind::DeployToDeployed,
    },
    Step::Reboot,
    Step::SetVlan,
    Step::WaitReboot {
        style: ProbeStyle::Classical,
        target: TargetState::User,
    },
];

/// Named scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Macrostep {
    PowerOn,
    PowerOff,
    PowerStatus,
    RebootSimple,
    RebootSetPxe,
    RebootDeployEnv,
    RebootRecordedEnv,
}

impl Macrostep {
    pub const ALL: [Macrostep; 7] = [
        Macrostep::PowerOn,
        Macrostep::PowerOff,
        Macrostep::PowerStatus,
        Macrostep::RebootSimple,
        Macrostep::RebootSetPxe,
        Macrostep::RebootDeployEnv,
        Macrostep::RebootRecordedEnv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Macrostep::PowerOn => "power_on",
            Macrostep::PowerOff => "power_off",
            Macrostep::PowerStatus => "power_status",
            Macrostep::RebootSimple => "reboot_simple",
            Macrostep::RebootSetPxe => "reboot_set_pxe",
            Macrostep::RebootDeployEnv => "reboot_deploy_env",
            Macrostep::RebootRecordedEnv => "reboot_recorded_env",
        }
    }

    /// Power macrostep for a mode
    pub fn power(mode: PowerMode) -> Self {
        match mode {
            PowerMode::On => Macrostep::PowerOn,
            PowerMode::Off => Macrostep::PowerOff,
            PowerMode::Status => Macrostep::PowerStatus,
        }
    }

    /// Ordered step list
    pub fn steps(&self) -> &'static [Step] {
        match self {
            Macrostep::PowerOn => POWER_ON,
            Macrostep::PowerOff => POWER_OFF,
            Macrostep::PowerStatus => POWER_STATUS,
            Macrostep::RebootSimple => REBOOT_SIMPLE,
            Macrostep::RebootSetPxe => REBOOT_SET_PXE,
            Macrostep::RebootDeployEnv => REBOOT_DEPLOY_ENV,
            Macrostep::RebootRecordedEnv => REBOOT_RECORDED_ENV,
        }
    }

    /// State recorded for nodes that complete the whole step list
    pub fn reached_state(&self) -> Option<NodeState> {
        match self {
            Macrostep::RebootDeployEnv => Some(NodeState::DeployEnv),
            Macrostep::RebootRecordedEnv => Some(NodeState::DeployedEnv),
            _ => None,
        }
    }

    /// Right a user needs to run this macrostep
    pub fn operation(&self) -> Operation {
        match self {
            Macrostep::PowerOn | Macrostep::PowerOff | Macrostep::PowerStatus => Operation::Power,
            _ => Operation::Reboot,
        }
    }

    /// Whether running this macrostep may write node state
    pub fn mutates_state(&self) -> bool {
        self.steps().iter().any(Step::is_reboot)
    }

    /// Whether the step list needs a pinned profile name
    pub fn needs_profile(&self) -> bool {
        self.steps().iter().any(|step| {
            matches!(
                step,
                Step::SwitchPxe {
                    profile: PxeSwitchKind::Pinned
                }
            )
        })
    }
}

impl std::fmt::Display for Macrostep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Macrostep {
    type Err = MacrostepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Macrostep::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| MacrostepError::UnknownMacrostep(s.to_string()))
    }
}

/// Reboot scenarios as callers name them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootKind {
    #[default]
    Simple,
    SetPxe,
    DeployEnv,
    RecordedEnv,
}

impl RebootKind {
    pub fn macrostep(&self) -> Macrostep {
        match self {
            RebootKind::Simple => Macrostep::RebootSimple,
            RebootKind::SetPxe => Macrostep::RebootSetPxe,
            RebootKind::DeployEnv => Macrostep::RebootDeployEnv,
            RebootKind::RecordedEnv => Macrostep::RebootRecordedEnv,
        }
    }
}

impl FromStr for RebootKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "simple" => Ok(RebootKind::Simple),
            "set_pxe" => Ok(RebootKind::SetPxe),
            "deploy_env" => Ok(RebootKind::DeployEnv),
            "recorded_env" => Ok(RebootKind::RecordedEnv),
            _ => Err(format!(
                "unknown reboot kind '{}' (expected simple, set-pxe, deploy-env or recorded-env)",
                s
            )),
        }
    }
}
