//! Agent lifecycle coordination.
//!
//! Shutdown runs exactly once: it announces departure, stops advertising,
//! withdraws the directory server, drains every instance and staging task
//! concurrently, flushes the bus, then marks the agent terminated.
//! Evacuation is re-entrant and announces draining instances without
//! touching their containers; a poller decides when to proceed to
//! shutdown based on the returned verdict.

mod signals;

pub use signals::install_signal_handlers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::bus::{Advertiser, ExitedNotice, MessageBus};
use crate::registry::{Instance, InstanceRegistry, InstanceState, StagingRegistry, StagingTask};

/// Coarse phase of the agent itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Running,
    Evacuating,
    ShuttingDown,
    Terminated,
}

/// Tears down the container behind an instance or staging task.
#[async_trait]
pub trait InstanceStopper: Send + Sync {
    async fn stop_instance(&self, instance: &Instance);
    async fn stop_task(&self, task: &StagingTask);
}

pub struct LifecycleConfig {
    /// Evacuation proceeds to shutdown no later than this, instances
    /// drained or not.
    pub evacuation_bail_out: Duration,
}

pub struct Lifecycle {
    phase: RwLock<AgentPhase>,
    evacuation_started_at: Mutex<Option<Instant>>,
    goodbye_sent: AtomicBool,
    shutdown_entered: AtomicBool,
    instances: Arc<InstanceRegistry>,
    tasks: Arc<StagingRegistry>,
    bus: Arc<dyn MessageBus>,
    advertiser: Arc<dyn Advertiser>,
    stopper: Arc<dyn InstanceStopper>,
    terminated: Notify,
    config: LifecycleConfig,
}

impl Lifecycle {
    pub fn new(
        instances: Arc<InstanceRegistry>,
        tasks: Arc<StagingRegistry>,
        bus: Arc<dyn MessageBus>,
        advertiser: Arc<dyn Advertiser>,
        stopper: Arc<dyn InstanceStopper>,
        config: LifecycleConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            phase: RwLock::new(AgentPhase::Running),
            evacuation_started_at: Mutex::new(None),
            goodbye_sent: AtomicBool::new(false),
            shutdown_entered: AtomicBool::new(false),
            instances,
            tasks,
            bus,
            advertiser,
            stopper,
            terminated: Notify::new(),
            config,
        })
    }

    pub fn phase(&self) -> AgentPhase {
        *self.phase.read()
    }

    /// Whether new placements may be accepted.
    pub fn accepting_work(&self) -> bool {
        self.phase() == AgentPhase::Running
    }

    /// Block until shutdown has fully completed.
    pub async fn wait_terminated(&self) {
        loop {
            if self.phase() == AgentPhase::Terminated {
                return;
            }
            let notified = self.terminated.notified();
            if self.phase() == AgentPhase::Terminated {
                return;
            }
            notified.await;
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Run the full shutdown sequence. Re-entry is a no-op: later callers
    /// return immediately while the first runs the sequence to completion.
    pub async fn shutdown(&self) {
        if self.shutdown_entered.swap(true, Ordering::SeqCst) {
            tracing::debug!("shutdown already in progress");
            return;
        }
        tracing::info!("shutting down");
        *self.phase.write() = AgentPhase::ShuttingDown;

        self.send_goodbye_once().await;
        self.advertiser.stop();
        self.bus.unregister_directory().await;

        self.drain_all().await;

        self.bus.flush().await;
        *self.phase.write() = AgentPhase::Terminated;
        self.terminated.notify_waiters();
        tracing::info!("shutdown complete");
    }

    async fn drain_all(&self) {
        type StopFuture = std::pin::Pin<Box<dyn std::future::Future<Output = (&'static str, String)> + Send>>;
        let mut work: FuturesUnordered<StopFuture> = FuturesUnordered::new();
        for instance in self.instances.instances() {
            let stopper = self.stopper.clone();
            work.push(Box::pin(async move {
                stopper.stop_instance(&instance).await;
                ("instance", instance.id().to_string())
            }));
        }
        for task in self.tasks.tasks() {
            let stopper = self.stopper.clone();
            work.push(Box::pin(async move {
                stopper.stop_task(&task).await;
                ("staging task", task.id().to_string())
            }));
        }

        let total = work.len();
        tracing::info!(total, "draining instances and staging tasks");
        while let Some((kind, id)) = work.next().await {
            tracing::info!(kind, id, "drained");
        }
    }

    /// Announce departure at most once across shutdown, evacuation, and
    /// the quiet-exit signal.
    pub async fn send_goodbye_once(&self) {
        if !self.goodbye_sent.swap(true, Ordering::SeqCst) {
            self.bus.publish_goodbye().await;
        }
    }

    /// Stop advertising capacity without otherwise changing phase.
    pub fn stop_advertising(&self) {
        self.advertiser.stop();
    }

    // ========================================================================
    // Evacuation
    // ========================================================================

    /// Advance evacuation by one tick.
    ///
    /// Safe to call repeatedly; the goodbye is latched and already-drained
    /// instances are skipped. Returns `true` once shutdown should follow,
    /// either because every instance and task has settled or because the
    /// bail-out window has elapsed.
    pub async fn evacuate(&self) -> bool {
        // Shutdown preempts evacuation: once it has begun, a straggling
        // evacuation tick must not flip the phase back.
        if self.shutdown_entered.load(Ordering::SeqCst) {
            return true;
        }

        let started_at = *self
            .evacuation_started_at
            .lock()
            .get_or_insert_with(Instant::now);

        self.send_goodbye_once().await;
        *self.phase.write() = AgentPhase::Evacuating;

        for instance in self.instances.instances() {
            let state = instance.state();
            if !state.is_alive() {
                continue;
            }
            // Announce with the pre-transition state so observers see what
            // the instance was doing when evacuation caught it.
            self.bus
                .publish_exited(&ExitedNotice {
                    instance_id: instance.id().to_string(),
                    state,
                    reason: "evacuation".to_string(),
                })
                .await;
            instance.set_state(InstanceState::Evacuating);
        }

        let all_settled = self
            .instances
            .instances()
            .iter()
            .all(|i| i.state().is_terminal())
            && self.tasks.tasks().is_empty();
        if all_settled {
            tracing::info!("evacuation complete; all workloads settled");
            return true;
        }
        if started_at.elapsed() >= self.config.evacuation_bail_out {
            tracing::warn!(
                elapsed_secs = started_at.elapsed().as_secs(),
                "evacuation bail-out window elapsed; proceeding to shutdown"
            );
            return true;
        }
        false
    }
}
