//! Error types for PXE profile handling

use thiserror::Error;

/// Error type for iPXE operations
#[derive(Debug, Error)]
pub enum IpxeError {
    /// Missing required configuration
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Invalid profile name
    #[error("invalid profile name: {0}")]
    InvalidProfile(String),

    /// Node name cannot be used as a profile file name
    #[error("invalid node name: {0}")]
    InvalidNode(String),

    /// Failed to write or read a profile file
    #[error("profile I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for iPXE operations
pub type Result<T> = std::result::Result<T, IpxeError>;
