use std::time::Duration;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure of a single backend invocation.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed { command: String, status: String, stdout: String, stderr: String },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

impl GatewayError {
    /// Diagnostic text the backend wrote to stderr, if it got that far.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            GatewayError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::TimedOut { .. })
    }
}
