use thiserror::Error;

use crate::traits::AgentId;

/// Errors raised by the simulation core.
#[derive(Debug, Error)]
pub enum SimError {
    /// An argument fell outside the range an operation accepts.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The routing strategy selector did not recognise a name.
    #[error("Unknown algorithm: {name}")]
    UnknownAlgorithm { name: String },

    /// No live agent of the expected kind has this id.
    #[error("Unknown agent: {id}")]
    UnknownAgent { id: AgentId },

    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("No samples recorded")]
    NoSamples,

    #[error("Destination of request {request} is already set")]
    DestinationAlreadySet { request: AgentId },

    #[error("Metrics histogram: {0}")]
    Metrics(String),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
