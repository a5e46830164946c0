//! Stevedore - per-host agent for a platform control plane.
//!
//! The agent drives a separate container runtime daemon over a narrow
//! request/response protocol and exposes just enough HTTP surface for the
//! control plane and operators to retrieve in-container files without
//! direct container access.
//!
//! Four subsystems carry the weight:
//!
//! - [`runtime`]: the container control client (per-channel connection
//!   reuse, retry-on-disconnect, limits and bind mounts)
//! - [`directory`]: HMAC-signed, time-limited file access URLs
//! - [`health`]: port-reachability and marker-file readiness pollers
//! - [`lifecycle`]: signal-driven graceful shutdown and evacuation

pub mod api;
pub mod bus;
pub mod config;
pub mod directory;
pub mod health;
pub mod lifecycle;
pub mod registry;
pub mod runtime;

pub use config::AgentConfig;
pub use runtime::{ContainerClient, ContainerHandle};
pub use stevedore_shared::{AgentError, AgentResult, Transport};
