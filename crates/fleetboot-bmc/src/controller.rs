//! Node controller trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EscalationLevel, PowerState};

/// Trait for per-node power, reboot and console operations
///
/// Implementations handle the backend-specific details (command table, IPMI).
#[async_trait]
pub trait NodeController: Send + Sync {
    /// Name of the node this controller drives
    fn node(&self) -> &str;

    /// Power on the machine
    async fn power_on(&self, level: EscalationLevel) -> Result<()>;

    /// Power off the machine
    async fn power_off(&self, level: EscalationLevel) -> Result<()>;

    /// Get current power state
    async fn power_status(&self) -> Result<PowerState>;

    /// Send the reboot signal
    async fn reboot(&self, level: EscalationLevel) -> Result<()>;

    /// Command line that attaches to the node's console
    fn console_command(&self) -> Option<String>;

    /// Check if the controller supports a specific operation
    fn supports_operation(&self, op: NodeOperation) -> bool;
}

/// Node operations for capability checking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOperation {
    PowerOn(EscalationLevel),
    PowerOff(EscalationLevel),
    PowerStatus,
    Reboot(EscalationLevel),
    Console,
}
