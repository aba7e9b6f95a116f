//! IPMI protocol implementation
//!
//! IPMI (Intelligent Platform Management Interface) is the most common
//! BMC protocol for server hardware. Operations shell out to `ipmitool`
//! over the `lanplus` interface.

use async_trait::async_trait;
use std::time::Duration;

use crate::controller::{NodeController, NodeOperation};
use crate::error::Result;
use crate::shell::{run_command, DEFAULT_COMMAND_TIMEOUT};
use crate::types::{EscalationLevel, IpmiConfig, PowerState};

/// IPMI controller using external ipmitool
#[derive(Debug, Clone)]
pub struct IpmiController {
    node: String,
    config: IpmiConfig,
    timeout: Duration,
}

impl IpmiController {
    /// Create a new IPMI controller for a node
    pub fn new(node: impl Into<String>, config: IpmiConfig) -> Self {
        Self {
            node: node.into(),
            config,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Bound each ipmitool invocation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the BMC address
    pub fn address(&self) -> &std::net::IpAddr {
        &self.config.address
    }

    /// Build the full ipmitool command line for a chassis subcommand
    fn command_line(&self, command: &[&str]) -> String {
        format!(
            "ipmitool -I lanplus -H {} -p {} -U {} -P {} {}",
            self.config.address,
            self.config.port,
            self.config.username,
            self.config.password,
            command.join(" ")
        )
    }

    async fn execute_ipmi(&self, command: &[&str]) -> Result<String> {
        run_command(&self.command_line(command), self.timeout).await
    }
}

#[async_trait]
impl NodeController for IpmiController {
    fn node(&self) -> &str {
        &self.node
    }

    async fn power_on(&self, _level: EscalationLevel) -> Result<()> {
        self.execute_ipmi(&["chassis", "power", "on"]).await?;
        Ok(())
    }

    async fn power_off(&self, level: EscalationLevel) -> Result<()> {
        let mode = match level {
            EscalationLevel::Soft => "soft",
            EscalationLevel::Hard | EscalationLevel::VeryHard => "off",
        };
        self.execute_ipmi(&["chassis", "power", mode]).await?;
        Ok(())
    }

    async fn power_status(&self) -> Result<PowerState> {
        let output = self.execute_ipmi(&["chassis", "power", "status"]).await?;
        Ok(PowerState::from_status_output(&output))
    }

    async fn reboot(&self, level: EscalationLevel) -> Result<()> {
        match level {
            EscalationLevel::Soft => {
                self.execute_ipmi(&["chassis", "power", "reset"]).await?;
            }
            EscalationLevel::Hard => {
                self.execute_ipmi(&["chassis", "power", "cycle"]).await?;
            }
            EscalationLevel::VeryHard => {
                self.execute_ipmi(&["chassis", "power", "off"]).await?;
                self.execute_ipmi(&["chassis", "power", "on"]).await?;
            }
        }
        Ok(())
    }

    fn console_command(&self) -> Option<String> {
        Some(self.command_line(&["sol", "activate"]))
    }

    fn supports_operation(&self, _op: NodeOperation) -> bool {
        // IPMI supports all operations
        true
    }
}
