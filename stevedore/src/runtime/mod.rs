//! Container control client.
//!
//! Translates lifecycle intents (create, limit, run, destroy, network
//! setup) into protocol calls against the container runtime daemon, one
//! connection per named channel, recovering transparently from dropped
//! connections.

mod client;
mod connection;

pub use client::{ContainerClient, ContainerHandle, ContainerInfo, ScriptOutput, SpawnLimits};
pub use connection::Connection;
