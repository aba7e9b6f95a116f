//! Common types for node bindings

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

/// Power state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    /// Machine is powered on
    On,
    /// Machine is powered off
    Off,
    /// Power state is unknown
    Unknown,
}

impl PowerState {
    /// Interpret the output of a power status command
    pub fn from_status_output(output: &str) -> Self {
        let lower = output.to_lowercase();
        if lower.contains("is on") || lower.trim() == "on" {
            PowerState::On
        } else if lower.contains("is off") || lower.trim() == "off" {
            PowerState::Off
        } else {
            PowerState::Unknown
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Requested power operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    On,
    Off,
    Status,
}

impl std::fmt::Display for PowerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerMode::On => write!(f, "on"),
            PowerMode::Off => write!(f, "off"),
            PowerMode::Status => write!(f, "status"),
        }
    }
}

impl FromStr for PowerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(PowerMode::On),
            "off" => Ok(PowerMode::Off),
            "status" => Ok(PowerMode::Status),
            other => Err(format!("unknown power mode '{}' (expected on, off or status)", other)),
        }
    }
}

/// Escalation rung of a power or reboot binding
///
/// An execution level maps onto a rung: 0 is soft, 1 is hard, 2 is very hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    /// Ask the running OS (ssh reboot, ACPI soft-off)
    Soft,
    /// Out-of-band reset through the BMC
    Hard,
    /// Power cut at the PDU or equivalent
    VeryHard,
}

impl EscalationLevel {
    /// Map an execution level onto a rung
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(EscalationLevel::Soft),
            1 => Some(EscalationLevel::Hard),
            2 => Some(EscalationLevel::VeryHard),
            _ => None,
        }
    }

    /// Numeric execution level of this rung
    pub fn level(&self) -> u8 {
        match self {
            EscalationLevel::Soft => 0,
            EscalationLevel::Hard => 1,
            EscalationLevel::VeryHard => 2,
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationLevel::Soft => write!(f, "soft"),
            EscalationLevel::Hard => write!(f, "hard"),
            EscalationLevel::VeryHard => write!(f, "very_hard"),
        }
    }
}

/// Recognised keys of a node's command table
///
/// Configuration files name these in snake_case. Anything else is rejected
/// when the configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    RebootSoft,
    RebootHard,
    RebootVeryHard,
    Console,
    PowerOnSoft,
    PowerOnHard,
    PowerOnVeryHard,
    PowerOffSoft,
    PowerOffHard,
    PowerOffVeryHard,
    PowerStatus,
}

impl CommandKind {
    /// Every recognised command kind
    pub const ALL: [CommandKind; 11] = [
        CommandKind::RebootSoft,
        CommandKind::RebootHard,
        CommandKind::RebootVeryHard,
        CommandKind::Console,
        CommandKind::PowerOnSoft,
        CommandKind::PowerOnHard,
        CommandKind::PowerOnVeryHard,
        CommandKind::PowerOffSoft,
        CommandKind::PowerOffHard,
        CommandKind::PowerOffVeryHard,
        CommandKind::PowerStatus,
    ];

    /// Configuration key for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::RebootSoft => "reboot_soft",
            CommandKind::RebootHard => "reboot_hard",
            CommandKind::RebootVeryHard => "reboot_very_hard",
            CommandKind::Console => "console",
            CommandKind::PowerOnSoft => "power_on_soft",
            CommandKind::PowerOnHard => "power_on_hard",
            CommandKind::PowerOnVeryHard => "power_on_very_hard",
            CommandKind::PowerOffSoft => "power_off_soft",
            CommandKind::PowerOffHard => "power_off_hard",
            CommandKind::PowerOffVeryHard => "power_off_very_hard",
            CommandKind::PowerStatus => "power_status",
        }
    }

    /// Reboot command for a rung
    pub fn reboot(level: EscalationLevel) -> Self {
        match level {
            EscalationLevel::Soft => CommandKind::RebootSoft,
            EscalationLevel::Hard => CommandKind::RebootHard,
            EscalationLevel::VeryHard => CommandKind::RebootVeryHard,
        }
    }

    /// Power-on command for a rung
    pub fn power_on(level: EscalationLevel) -> Self {
        match level {
            EscalationLevel::Soft => CommandKind::PowerOnSoft,
            EscalationLevel::Hard => CommandKind::PowerOnHard,
            EscalationLevel::VeryHard => CommandKind::PowerOnVeryHard,
        }
    }

    /// Power-off command for a rung
    pub fn power_off(level: EscalationLevel) -> Self {
        match level {
            EscalationLevel::Soft => CommandKind::PowerOffSoft,
            EscalationLevel::Hard => CommandKind::PowerOffHard,
            EscalationLevel::VeryHard => CommandKind::PowerOffVeryHard,
        }
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CommandKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPMI connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpmiConfig {
    /// BMC IP address
    pub address: IpAddr,
    /// BMC port (default 623)
    #[serde(default = "default_ipmi_port")]
    pub port: u16,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

fn default_ipmi_port() -> u16 {
    623
}

impl IpmiConfig {
    /// Create new IPMI config
    pub fn new(address: IpAddr, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address,
            port: default_ipmi_port(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Set custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}
