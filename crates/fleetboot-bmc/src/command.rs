//! Command-table controller
//!
//! Each node carries a table of command lines keyed by [`CommandKind`].
//! Missing entries fall through to an optional backend controller (usually
//! IPMI); with no fallback the operation fails with a missing binding.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::controller::{NodeController, NodeOperation};
use crate::error::{BmcError, Result};
use crate::shell::{run_command, DEFAULT_COMMAND_TIMEOUT};
use crate::types::{CommandKind, EscalationLevel, PowerState};

/// Controller driven by a node's command table
pub struct CommandController {
    node: String,
    commands: HashMap<CommandKind, String>,
    fallback: Option<Arc<dyn NodeController>>,
    timeout: Duration,
}

impl CommandController {
    /// Create a controller from already-rendered command lines
    pub fn new(node: impl Into<String>, commands: HashMap<CommandKind, String>) -> Self {
        Self {
            node: node.into(),
            commands,
            fallback: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use another controller for kinds missing from the table
    pub fn with_fallback(mut self, fallback: Arc<dyn NodeController>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Bound each command invocation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line configured for a kind, if any
    pub fn command(&self, kind: CommandKind) -> Option<&str> {
        self.commands.get(&kind).map(|s| s.as_str())
    }

    fn missing(&self, kind: CommandKind) -> BmcError {
        BmcError::MissingBinding {
            node: self.node.clone(),
            kind: kind.to_string(),
        }
    }

    async fn run(&self, kind: CommandKind) -> Option<Result<String>> {
        let command = self.commands.get(&kind)?;
        debug!(node = %self.node, %kind, "Dispatching binding");
        Some(run_command(command, self.timeout).await)
    }
}

#[async_trait]
impl NodeController for CommandController {
    fn node(&self) -> &str {
        &self.node
    }

    async fn power_on(&self, level: EscalationLevel) -> Result<()> {
        let kind = CommandKind::power_on(level);
        match (self.run(kind).await, &self.fallback) {
            (Some(result), _) => result.map(|_| ()),
            (None, Some(fallback)) => fallback.power_on(level).await,
            (None, None) => Err(self.missing(kind)),
        }
    }

    async fn power_off(&self, level: EscalationLevel) -> Result<()> {
        let kind = CommandKind::power_off(level);
        match (self.run(kind).await, &self.fallback) {
            (Some(result), _) => result.map(|_| ()),
            (None, Some(fallback)) => fallback.power_off(level).await,
            (None, None) => Err(self.missing(kind)),
        }
    }

    async fn power_status(&self) -> Result<PowerState> {
        let kind = CommandKind::PowerStatus;
        match (self.run(kind).await, &self.fallback) {
            (Some(result), _) => result.map(|out| PowerState::from_status_output(&out)),
            (None, Some(fallback)) => fallback.power_status().await,
            (None, None) => Err(self.missing(kind)),
        }
    }

    async fn reboot(&self, level: EscalationLevel) -> Result<()> {
        let kind = CommandKind::reboot(level);
        match (self.run(kind).await, &self.fallback) {
            (Some(result), _) => result.map(|_| ()),
            (None, Some(fallback)) => fallback.reboot(level).await,
            (None, None) => Err(self.missing(kind)),
        }
    }

    fn console_command(&self) -> Option<String> {
        self.commands
            .get(&CommandKind::Console)
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|f| f.console_command()))
    }

    fn supports_operation(&self, op: NodeOperation) -> bool {
        let kind = match op {
            NodeOperation::PowerOn(level) => CommandKind::power_on(level),
            NodeOperation::PowerOff(level) => CommandKind::power_off(level),
            NodeOperation::PowerStatus => CommandKind::PowerStatus,
            NodeOperation::Reboot(level) => CommandKind::reboot(level),
            NodeOperation::Console => CommandKind::Console,
        };
        self.commands.contains_key(&kind)
            || self
                .fallback
                .as_ref()
                .is_some_and(|f| f.supports_operation(op))
    }
}

impl std::fmt::Debug for CommandController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandController")
            .field("node", &self.node)
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.as_ref().map(|f| f.node().to_string()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(CommandKind, &str)]) -> HashMap<CommandKind, String> {
        entries
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_reboot_runs_level_command() {
        let controller = CommandController::new(
            "node-1",
            table(&[
                (CommandKind::RebootSoft, "true"),
                (CommandKind::RebootHard, "false"),
            ]),
        );

        assert!(controller.reboot(EscalationLevel::Soft).await.is_ok());
        assert!(matches!(
            controller.reboot(EscalationLevel::Hard).await,
            Err(BmcError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binding_without_fallback() {
        let controller = CommandController::new("node-1", HashMap::new());

        let err = controller.reboot(EscalationLevel::VeryHard).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "no reboot_very_hard binding for node node-1"
        );
        assert!(!controller.supports_operation(NodeOperation::Reboot(EscalationLevel::VeryHard)));
    }

    #[tokio::test]
    async fn test_power_status_parses_output() {
        let controller = CommandController::new(
            "node-1",
            table(&[(CommandKind::PowerStatus, "echo 'Chassis Power is off'")]),
        );
        assert_eq!(controller.power_status().await.unwrap(), PowerState::Off);
    }

    #[tokio::test]
    async fn test_fallback_used_for_missing_kind() {
        let fallback = Arc::new(CommandController::new(
            "node-1",
            table(&[
                (CommandKind::PowerOnHard, "true"),
                (CommandKind::Console, "conman node-1"),
            ]),
        ));
        let controller = CommandController::new("node-1", HashMap::new()).with_fallback(fallback);

        assert!(controller.power_on(EscalationLevel::Hard).await.is_ok());
        assert!(controller.supports_operation(NodeOperation::PowerOn(EscalationLevel::Hard)));
        assert_eq!(controller.console_command().as_deref(), Some("conman node-1"));
    }

    #[test]
    fn test_table_entry_wins_over_fallback_console() {
        let fallback = Arc::new(CommandController::new(
            "node-1",
            table(&[(CommandKind::Console, "ipmi-sol")]),
        ));
        let controller = CommandController::new(
            "node-1",
            table(&[(CommandKind::Console, "ssh console-server node-1")]),
        )
        .with_fallback(fallback);

        assert_eq!(
            controller.console_command().as_deref(),
            Some("ssh console-server node-1")
        );
        assert_eq!(controller.command(CommandKind::Console), Some("ssh console-server node-1"));
    }
}
