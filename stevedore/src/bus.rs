//! Outbound announcement seams.
//!
//! The lifecycle coordinator talks to the cluster through these traits;
//! the binary wires in logging implementations, tests wire in recorders.

use async_trait::async_trait;
use serde::Serialize;

use crate::registry::InstanceState;

/// Notice that an instance has left service.
#[derive(Debug, Clone, Serialize)]
pub struct ExitedNotice {
    pub instance_id: String,
    /// State the instance held when the notice was decided, before any
    /// transition the sender is about to apply.
    pub state: InstanceState,
    pub reason: String,
}

/// Cluster-facing announcements.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Announce that this agent is leaving the cluster.
    async fn publish_goodbye(&self);

    /// Announce that an instance has exited or is being drained.
    async fn publish_exited(&self, notice: &ExitedNotice);

    /// Withdraw this agent's directory server from service discovery.
    async fn unregister_directory(&self);

    /// Block until queued announcements have been handed off.
    async fn flush(&self);
}

/// Periodic presence advertising.
pub trait Advertiser: Send + Sync {
    /// Stop advertising capacity; the agent takes no new placements.
    fn stop(&self);
}

/// Bus that records announcements to the log only.
///
/// Stands in until a real cluster transport is wired up; shutdown and
/// evacuation sequencing are observable either way.
#[derive(Default)]
pub struct LoggingBus;

#[async_trait]
impl MessageBus for LoggingBus {
    async fn publish_goodbye(&self) {
        tracing::info!("announcing goodbye to cluster");
    }

    async fn publish_exited(&self, notice: &ExitedNotice) {
        tracing::info!(
            instance_id = %notice.instance_id,
            state = %notice.state,
            reason = %notice.reason,
            "announcing instance exit"
        );
    }

    async fn unregister_directory(&self) {
        tracing::info!("withdrawing directory server registration");
    }

    async fn flush(&self) {}
}

#[derive(Default)]
pub struct LoggingAdvertiser;

impl Advertiser for LoggingAdvertiser {
    fn stop(&self) {
        tracing::info!("stopped advertising capacity");
    }
}
