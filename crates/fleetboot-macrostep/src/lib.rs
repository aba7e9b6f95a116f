//! Fleetboot Macrostep Engine
//!
//! A macrostep is a named, fixed sequence of node primitives (power,
//! reboot, PXE switch, VLAN, wait-for-reboot, key delivery) that moves a
//! batch of nodes from one boot environment to another.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              MacrostepExecutor                       │
//! │  ExecutionContext: user, rights, fleet, node batch   │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │   Macrostep definitions (step tables)       │    │
//! │  └─────────────────────────────────────────────┘    │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │   StepPrimitives                            │    │
//! │  │   bindings | PXE | VLAN | keys | prober     │    │
//! │  └─────────────────────────────────────────────┘    │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │   MacrostepReport + MacrostepEvent stream   │    │
//! │  └─────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fleetboot_macrostep::{ExecutionContext, Macrostep, MacrostepArgs, MacrostepExecutor};
//!
//! let ctx = ExecutionContext::new("alice", rights, fleet, ["node-1", "node-2"]);
//! let report = executor
//!     .run(&ctx, Macrostep::RebootDeployEnv, 0, &MacrostepArgs::default())
//!     .await?;
//!
//! for node in report.failed() {
//!     println!("{node}: {:?}", report.verdicts[node].outcome);
//! }
//! ```

pub mod context;
pub mod definitions;
pub mod error;
pub mod executor;
pub mod network;
pub mod primitives;
pub mod step;
pub mod verdict;
pub mod wait;

pub use context::ExecutionContext;
pub use definitions::{Macrostep, RebootKind};
pub use error::{MacrostepError, Result};
pub use executor::{MacrostepArgs, MacrostepEvent, MacrostepExecutor};
pub use network::{CommandNetwork, KeyDistributor, VlanSwitcher};
pub use primitives::{StepPrimitives, StepResult, DEFAULT_PARALLELISM};
pub use step::{KeyDistribution, ProbeStyle, PxeSwitchKind, Step, TargetState};
pub use verdict::{MacrostepReport, NodeOutcome, NodeVerdict};
pub use wait::{wait_reboot, WaitOutcome, WaitPolicy};
