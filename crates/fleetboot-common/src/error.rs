use thiserror::Error;

/// Errors raised by fleet inventory, rights and configuration handling
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("unknown command kind '{kind}' for node {node}")]
    UnknownCommandKind { node: String, kind: String },

    #[error("override table references unknown node: {0}")]
    OverrideForUnknownNode(String),

    #[error("node declared twice: {0}")]
    DuplicateNode(String),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("template error in {context}: {message}")]
    Template { context: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("state store error: {0}")]
    Store(String),
}

impl FleetError {
    /// Whether this error belongs to configuration loading (fatal at startup)
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, FleetError::UnknownNode(_) | FleetError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
