//! Fleetboot common types
//!
//! Shared by the macrostep engine, the API server and the CLI:
//!
//! - [`node`]: nodes, their lifecycle state and primitive bindings
//! - [`fleet`]: the fleet view (inventory + per-node state store)
//! - [`rights`]: which user may run which operation on which nodes
//! - [`config`]: YAML configuration, validated all-or-nothing

pub mod config;
pub mod error;
pub mod fleet;
pub mod node;
pub mod rights;

pub use config::*;
pub use error::{FleetError, Result};
pub use fleet::{FleetView, MemoryFleet};
pub use node::{Node, NodeState};
pub use rights::{Grant, MemoryRights, NodePattern, Operation, RightsStore};
