//! Error types for demand resolution and fleet reconciliation.

use thiserror::Error;

/// Workflow document did not have the expected structure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid workflow document: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for ParseError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Why a call to a remote API failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteCause {
    /// The request never produced a response (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-success status code.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// A failed call to the build system or the compute provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} failed: {cause}")]
pub struct RemoteError {
    /// Short description of the call, e.g. `list jobs for run 42`.
    pub operation: String,

    #[source]
    pub cause: RemoteCause,
}

impl RemoteError {
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            cause: RemoteCause::Transport(message.into()),
        }
    }

    pub fn status(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            cause: RemoteCause::Status {
                status,
                body: body.into(),
            },
        }
    }

    pub fn decode(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            cause: RemoteCause::Decode(message.into()),
        }
    }

    /// Status code returned by the remote, if it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match &self.cause {
            RemoteCause::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ReconcileError {
    /// Stable machine-readable code for reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "workflow_parse_error",
            Self::Remote(_) => "remote_error",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}
