//! Error types for node binding operations

use std::time::Duration;
use thiserror::Error;

/// Error type for node binding operations
#[derive(Debug, Error)]
pub enum BmcError {
    /// No binding configured for this operation on this node
    #[error("no {kind} binding for node {node}")]
    MissingBinding { node: String, kind: String },

    /// Command exited unsuccessfully
    #[error("command `{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Command could not be started
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command did not finish in time
    #[error("command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for node binding operations
pub type Result<T> = std::result::Result<T, BmcError>;
