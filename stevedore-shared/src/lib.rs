//! Stevedore shared - common code for the agent and the runtime control protocol.
//!
//! This crate contains the wire protocol spoken over the container runtime's
//! control socket, transport addressing, and the error taxonomy used on both
//! sides of that channel.

pub mod errors;
pub mod protocol;
pub mod transport;

pub use errors::{AgentError, AgentResult};
pub use transport::Transport;
