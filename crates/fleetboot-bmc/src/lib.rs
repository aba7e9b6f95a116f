//! Fleetboot node bindings
//!
//! This crate provides the per-node primitive bindings: how *this* node is
//! powered on or off, how it is rebooted, and which command opens its
//! console. Each operation exists at three escalation levels (soft, hard,
//! very hard).
//!
//! # Supported Backends
//!
//! - **Command table**: shell commands configured per node and per command kind
//! - **IPMI**: `ipmitool` against the node's BMC, used when no command is configured
//!
//! # Example
//!
//! ```no_run
//! use fleetboot_bmc::{CommandController, CommandKind, EscalationLevel, NodeController};
//! use std::collections::HashMap;
//!
//! # async fn example() -> fleetboot_bmc::Result<()> {
//! let commands = HashMap::from([
//!     (CommandKind::RebootSoft, "ssh root@node-1 reboot".to_string()),
//!     (CommandKind::RebootHard, "pdu-ctl node-1 cycle".to_string()),
//! ]);
//! let controller = CommandController::new("node-1", commands);
//!
//! controller.reboot(EscalationLevel::Soft).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod controller;
pub mod error;
pub mod ipmi;
pub mod shell;
pub mod types;

pub use command::CommandController;
pub use controller::{NodeController, NodeOperation};
pub use error::{BmcError, Result};
pub use ipmi::IpmiController;
pub use types::{CommandKind, EscalationLevel, IpmiConfig, PowerMode, PowerState};
