//! Instance and staging-task registries.
//!
//! The registries' full state machines belong to the control-plane glue;
//! this module carries just enough for the directory server to resolve
//! paths and for the lifecycle coordinator to drain work: state flags,
//! working directories, and narrow lookup traits implemented by in-memory
//! adapters.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ============================================================================
// Instance state
// ============================================================================

/// Lifecycle state of an application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Born,
    Starting,
    Resuming,
    Running,
    Evacuating,
    Stopping,
    Stopped,
    Crashed,
    Deleted,
}

impl InstanceState {
    /// States that still carry (or are about to carry) live work.
    ///
    /// Evacuation marks exactly this set as draining.
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            InstanceState::Born
                | InstanceState::Starting
                | InstanceState::Resuming
                | InstanceState::Running
        )
    }

    /// States from which no further work will be produced.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceState::Stopping
                | InstanceState::Stopped
                | InstanceState::Crashed
                | InstanceState::Deleted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Born => "born",
            InstanceState::Starting => "starting",
            InstanceState::Resuming => "resuming",
            InstanceState::Running => "running",
            InstanceState::Evacuating => "evacuating",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Crashed => "crashed",
            InstanceState::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Instances
// ============================================================================

/// An application instance known to this agent.
pub struct Instance {
    id: String,
    state: RwLock<InstanceState>,
    working_dir: RwLock<Option<PathBuf>>,
}

impl Instance {
    pub fn new(id: impl Into<String>, state: InstanceState) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            state: RwLock::new(state),
            working_dir: RwLock::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> InstanceState {
        *self.state.read()
    }

    pub fn set_state(&self, state: InstanceState) {
        *self.state.write() = state;
    }

    /// Working directory on the host, set once the container materializes.
    pub fn working_dir(&self) -> Option<PathBuf> {
        self.working_dir.read().clone()
    }

    pub fn set_working_dir(&self, dir: impl Into<PathBuf>) {
        *self.working_dir.write() = Some(dir.into());
    }
}

/// In-memory instance registry.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<HashMap<String, Arc<Instance>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, instance: Arc<Instance>) {
        self.instances
            .write()
            .insert(instance.id().to_string(), instance);
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<Instance>> {
        self.instances.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Instance>> {
        self.instances.read().get(id).cloned()
    }

    pub fn instances(&self) -> Vec<Arc<Instance>> {
        self.instances.read().values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

// ============================================================================
// Staging tasks
// ============================================================================

/// A staging task whose container files this agent may serve and whose
/// work it must drain on shutdown.
pub struct StagingTask {
    id: String,
    container_dir: RwLock<Option<PathBuf>>,
}

impl StagingTask {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            container_dir: RwLock::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host-side mount of the task's container, if materialized.
    pub fn container_dir(&self) -> Option<PathBuf> {
        self.container_dir.read().clone()
    }

    pub fn set_container_dir(&self, dir: impl Into<PathBuf>) {
        *self.container_dir.write() = Some(dir.into());
    }
}

/// In-memory staging task registry.
#[derive(Default)]
pub struct StagingRegistry {
    tasks: RwLock<HashMap<String, Arc<StagingTask>>>,
}

impl StagingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task: Arc<StagingTask>) {
        self.tasks.write().insert(task.id().to_string(), task);
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<StagingTask>> {
        self.tasks.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<StagingTask>> {
        self.tasks.read().get(id).cloned()
    }

    pub fn tasks(&self) -> Vec<Arc<StagingTask>> {
        self.tasks.read().values().cloned().collect()
    }
}

// ============================================================================
// Lookup seams for the directory server
// ============================================================================

/// Resolve an instance id to its working directory.
pub trait InstanceLookup: Send + Sync {
    /// `None` when the instance is unknown; `Some` with `working_dir: None`
    /// when it exists but its directory is not yet available.
    fn lookup_instance(&self, id: &str) -> Option<InstancePathRef>;
}

/// Resolve a staging task id to its container mount.
pub trait TaskLookup: Send + Sync {
    fn lookup_task(&self, id: &str) -> Option<TaskPathRef>;
}

pub struct InstancePathRef {
    pub working_dir: Option<PathBuf>,
}

pub struct TaskPathRef {
    pub container_dir: Option<PathBuf>,
}

impl InstanceLookup for InstanceRegistry {
    fn lookup_instance(&self, id: &str) -> Option<InstancePathRef> {
        self.get(id).map(|instance| InstancePathRef {
            working_dir: instance.working_dir(),
        })
    }
}

impl TaskLookup for StagingRegistry {
    fn lookup_task(&self, id: &str) -> Option<TaskPathRef> {
        self.get(id).map(|task| TaskPathRef {
            container_dir: task.container_dir(),
        })
    }
}
