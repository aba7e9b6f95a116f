//! Error types for macrostep runs
//!
//! Only failures that stop a run before any primitive executes are errors.
//! A node failing a step is a verdict, not an error.

use fleetboot_bmc::BmcError;
use fleetboot_common::{FleetError, Operation};
use thiserror::Error;

/// Error type for macrostep runs
#[derive(Debug, Error)]
pub enum MacrostepError {
    /// Rights check failed; nothing was executed
    #[error("user '{user}' is not granted {operation} on the requested nodes")]
    AuthorizationDenied { user: String, operation: Operation },

    /// No definition with this name
    #[error("unknown macrostep: {0}")]
    UnknownMacrostep(String),

    /// Execution level outside the supported escalation rungs
    #[error("invalid execution level {0} (expected 0, 1 or 2)")]
    InvalidLevel(i64),

    /// Run requested without nodes
    #[error("empty node batch")]
    EmptyBatch,

    /// Argument the definition needs was not supplied
    #[error("macrostep {macrostep} requires argument '{argument}'")]
    MissingArgument {
        macrostep: String,
        argument: &'static str,
    },

    /// Network command not configured for this primitive
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// A command run on behalf of a primitive failed
    #[error(transparent)]
    Command(#[from] BmcError),

    /// Fleet view, rights store or template rendering failed
    #[error(transparent)]
    Fleet(#[from] FleetError),
}

/// Result type for macrostep operations
pub type Result<T> = std::result::Result<T, MacrostepError>;
