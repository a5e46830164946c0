//! High-level container operations over the control protocol.

use std::sync::Arc;
use std::time::Duration;

use stevedore_shared::protocol::{
    BindMountSpec, PortMapping, Request, Response, ResponseData,
};
use stevedore_shared::{AgentError, AgentResult, Transport};

use super::connection::ChannelCache;

/// Channel used for container lifecycle calls.
const LIFECYCLE_CHANNEL: &str = "app";

/// Pause between reconnect attempts so a dead socket is not hammered.
const RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Opaque container identifier issued by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Captured output of a completed script run or linked job.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub exit_status: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Resource limits attached to a spawn request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnLimits {
    pub nofile: Option<u64>,
    pub nproc: Option<u64>,
}

/// Runtime information about an existing container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub state: String,
    pub container_path: String,
    pub host_ip: String,
}

/// Client for one container's lifetime against the runtime daemon.
///
/// Owns the container handle from creation until destroy clears it.
pub struct ContainerClient {
    channels: ChannelCache,
    handle: parking_lot::Mutex<Option<ContainerHandle>>,
}

impl ContainerClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            channels: ChannelCache::new(transport),
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// The current container handle, if a container exists.
    pub fn handle(&self) -> Option<ContainerHandle> {
        self.handle.lock().clone()
    }

    fn require_handle(&self) -> AgentResult<String> {
        self.handle
            .lock()
            .as_ref()
            .map(|h| h.0.clone())
            .ok_or_else(|| AgentError::InvalidState("no container handle".into()))
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Create a container carrying all bind mounts in a single call.
    ///
    /// Never retried: creation is not idempotent and a retry could leave a
    /// duplicate container behind.
    pub async fn create(&self, bind_mounts: &[BindMountSpec]) -> AgentResult<ContainerHandle> {
        let request = Request::Create {
            bind_mounts: bind_mounts.iter().map(BindMountSpec::resolve).collect(),
        };
        let data = self.call(LIFECYCLE_CHANNEL, &request).await?;
        match data {
            Some(ResponseData::Created { handle }) => {
                let handle = ContainerHandle(handle);
                tracing::info!(handle = %handle, "container created");
                *self.handle.lock() = Some(handle.clone());
                Ok(handle)
            }
            other => Err(unexpected_payload("created", other)),
        }
    }

    pub async fn limit_cpu(&self, shares: u64) -> AgentResult<()> {
        let request = Request::LimitCpu {
            handle: self.require_handle()?,
            shares,
        };
        self.call_with_retry(LIFECYCLE_CHANNEL, &request).await?;
        Ok(())
    }

    pub async fn limit_memory(&self, bytes: u64) -> AgentResult<()> {
        let request = Request::LimitMemory {
            handle: self.require_handle()?,
            bytes,
        };
        self.call_with_retry(LIFECYCLE_CHANNEL, &request).await?;
        Ok(())
    }

    /// Apply disk limits; only present fields are transmitted.
    pub async fn limit_disk(
        &self,
        byte_limit: Option<u64>,
        inode_limit: Option<u64>,
    ) -> AgentResult<()> {
        let request = Request::LimitDisk {
            handle: self.require_handle()?,
            byte_limit,
            inode_limit,
        };
        self.call_with_retry(LIFECYCLE_CHANNEL, &request).await?;
        Ok(())
    }

    /// Request an inbound port mapping.
    ///
    /// Call at most once per container: a repeated call allocates a second
    /// mapping, which is wasted work rather than an error.
    pub async fn setup_inbound_network(&self) -> AgentResult<PortMapping> {
        let request = Request::NetIn {
            handle: self.require_handle()?,
        };
        let data = self.call_with_retry(LIFECYCLE_CHANNEL, &request).await?;
        match data {
            Some(ResponseData::NetIn {
                host_port,
                container_port,
            }) => Ok(PortMapping {
                host_port,
                container_port,
            }),
            other => Err(unexpected_payload("net_in", other)),
        }
    }

    /// Fetch runtime information about the container.
    pub async fn info(&self) -> AgentResult<ContainerInfo> {
        let request = Request::Info {
            handle: self.require_handle()?,
        };
        let data = self.call_with_retry(LIFECYCLE_CHANNEL, &request).await?;
        match data {
            Some(ResponseData::Info {
                state,
                container_path,
                host_ip,
            }) => Ok(ContainerInfo {
                state,
                container_path,
                host_ip,
            }),
            other => Err(unexpected_payload("info", other)),
        }
    }

    /// Run a script to completion inside the container.
    ///
    /// A nonzero exit status is a domain error carrying the captured
    /// output; it is never retried.
    pub async fn run_script(
        &self,
        name: &str,
        script: &str,
        privileged: bool,
        discard_output: bool,
    ) -> AgentResult<ScriptOutput> {
        let request = Request::Run {
            handle: self.require_handle()?,
            script: script.to_string(),
            privileged,
            discard_output,
        };
        tracing::debug!(script = name, "running script in container");
        let data = self.call(LIFECYCLE_CHANNEL, &request).await?;
        match data {
            Some(ResponseData::Run {
                exit_status,
                stdout,
                stderr,
            }) => script_result(name, exit_status, stdout, stderr),
            other => Err(unexpected_payload("run", other)),
        }
    }

    /// Start a long-running job without blocking on its completion.
    ///
    /// Resource limits ride on the spawn request itself.
    pub async fn spawn(&self, script: &str, limits: SpawnLimits) -> AgentResult<u32> {
        let request = Request::Spawn {
            handle: self.require_handle()?,
            script: script.to_string(),
            nofile: limits.nofile,
            nproc: limits.nproc,
        };
        let data = self.call(LIFECYCLE_CHANNEL, &request).await?;
        match data {
            Some(ResponseData::Spawned { job_id }) => Ok(job_id),
            other => Err(unexpected_payload("spawned", other)),
        }
    }

    /// Block until the spawned job completes, failing on nonzero exit.
    pub async fn link_or_fail(&self, job_id: u32) -> AgentResult<ScriptOutput> {
        let request = Request::Link {
            handle: self.require_handle()?,
            job_id,
        };
        let data = self.call(LIFECYCLE_CHANNEL, &request).await?;
        match data {
            Some(ResponseData::Linked {
                exit_status,
                stdout,
                stderr,
            }) => script_result("linked job", exit_status, stdout, stderr),
            other => Err(unexpected_payload("linked", other)),
        }
    }

    /// Gracefully stop the container's processes.
    pub async fn stop(&self) -> AgentResult<()> {
        let request = Request::Stop {
            handle: self.require_handle()?,
        };
        self.call_with_retry(LIFECYCLE_CHANNEL, &request).await?;
        Ok(())
    }

    /// Destroy the container, best-effort.
    ///
    /// Errors are swallowed and logged: destroy runs from cleanup paths
    /// that must not fail the surrounding shutdown. The handle is cleared
    /// unconditionally, whether or not the runtime call succeeds.
    pub async fn destroy(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let request = Request::Destroy {
            handle: handle.0.clone(),
        };
        match self.call(LIFECYCLE_CHANNEL, &request).await {
            Ok(_) => tracing::info!(handle = %handle, "container destroyed"),
            Err(err) => {
                tracing::warn!(handle = %handle, error = %err, "destroy failed; continuing")
            }
        }
    }

    // ========================================================================
    // Call plumbing
    // ========================================================================

    /// One request/response exchange on the named channel, no retry.
    pub async fn call(
        &self,
        channel: &str,
        request: &Request,
    ) -> AgentResult<Option<ResponseData>> {
        let connection = self.channels.channel(channel);
        expect_data(connection.exchange(request).await?)
    }

    /// Exchange with unbounded retry on connection-level failures only.
    ///
    /// Domain failures pass straight through. The retry counter escalates
    /// in the log so a wedged runtime is visible; callers needing a bound
    /// wrap this with an external timeout.
    pub async fn call_with_retry(
        &self,
        channel: &str,
        request: &Request,
    ) -> AgentResult<Option<ResponseData>> {
        let connection = self.channels.channel(channel);
        let mut retries: u64 = 0;
        loop {
            match connection.exchange(request).await {
                Err(err) if err.is_connection() => {
                    retries += 1;
                    tracing::warn!(
                        channel,
                        retries,
                        error = %err,
                        "runtime connection failed; retrying"
                    );
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(err) => return Err(err),
                Ok(response) => return expect_data(response),
            }
        }
    }

    /// Connection for a named channel; exposed for callers that speak the
    /// protocol directly.
    pub fn channel(&self, name: &str) -> Arc<super::Connection> {
        self.channels.channel(name)
    }
}

/// Map an error response to a protocol error, success to its payload.
fn expect_data(response: Response) -> AgentResult<Option<ResponseData>> {
    match response {
        Response::Ok(payload) => Ok(payload.data),
        Response::Error(err) => Err(AgentError::Protocol(err.message)),
    }
}

fn script_result(
    name: &str,
    exit_status: i64,
    stdout: String,
    stderr: String,
) -> AgentResult<ScriptOutput> {
    if exit_status != 0 {
        tracing::warn!(script = name, exit_status, "script exited nonzero");
        return Err(AgentError::ScriptFailed {
            exit_status,
            stdout,
            stderr,
        });
    }
    Ok(ScriptOutput {
        exit_status,
        stdout,
        stderr,
    })
}

fn unexpected_payload(expected: &str, got: Option<ResponseData>) -> AgentError {
    AgentError::Protocol(format!(
        "unexpected response payload: expected {expected}, got {got:?}"
    ))
}
