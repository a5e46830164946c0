//! Error taxonomy for the agent.
//!
//! `Connection` is the only retryable class: it means the control socket
//! itself failed (dial, read, write, EOF). Everything else is a domain
//! failure and must bubble to the caller untouched.

use thiserror::Error;

/// Result type used throughout the agent.
pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Transport-level failure on a runtime control channel.
    ///
    /// Distinguished from well-formed error responses; this is the only
    /// variant the retry wrapper acts on.
    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// The runtime answered with a well-formed error response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A script run inside a container exited nonzero.
    ///
    /// Carries the captured output so callers can surface diagnostics.
    #[error("script exited with status {exit_status}")]
    ScriptFailed {
        exit_status: i64,
        stdout: String,
        stderr: String,
    },

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// True for transport-level failures that a retry wrapper may act on.
    pub fn is_connection(&self) -> bool {
        matches!(self, AgentError::Connection(_))
    }
}
