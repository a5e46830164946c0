//! Wire protocol for the container runtime control channel.
//!
//! # Protocol format
//!
//! - **Transport**: persistent stream socket (Unix or TCP)
//! - **Encoding**: JSON
//! - **Framing**: newline-delimited (each message ends with `\n`)
//!
//! Requests and responses pair one-to-one in FIFO order per connection.
//! A well-formed `error` response is a domain failure; a socket-level
//! failure (dial, EOF, read/write) is a [`AgentError::Connection`].

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{AgentError, AgentResult};

// =============================================================================
// Container creation types
// =============================================================================

/// Access mode of a bind mount, as transmitted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindMountMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// A host-path-to-container-path binding, fully resolved.
///
/// Submitted once at creation time and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindMount {
    pub src_path: String,
    pub dst_path: String,
    pub mode: BindMountMode,
}

/// Caller-facing bind mount intent with optional fields.
///
/// The destination defaults to the source path and the mode defaults to
/// read-only when left unspecified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindMountSpec {
    pub src_path: String,
    #[serde(default)]
    pub dst_path: Option<String>,
    #[serde(default)]
    pub mode: Option<BindMountMode>,
}

impl BindMountSpec {
    pub fn new(src_path: impl Into<String>) -> Self {
        Self {
            src_path: src_path.into(),
            dst_path: None,
            mode: None,
        }
    }

    pub fn dst_path(mut self, dst_path: impl Into<String>) -> Self {
        self.dst_path = Some(dst_path.into());
        self
    }

    pub fn mode(mut self, mode: BindMountMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Resolve defaults into the wire representation.
    pub fn resolve(&self) -> BindMount {
        BindMount {
            src_path: self.src_path.clone(),
            dst_path: self
                .dst_path
                .clone()
                .unwrap_or_else(|| self.src_path.clone()),
            mode: self.mode.unwrap_or_default(),
        }
    }
}

/// A host-port-to-container-port mapping, populated once per container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

// =============================================================================
// Request types
// =============================================================================

/// Request from the agent to the container runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Create a container carrying all bind mounts in one call.
    Create { bind_mounts: Vec<BindMount> },

    /// Gracefully stop the container's processes.
    Stop { handle: String },

    /// Destroy the container and release its resources.
    Destroy { handle: String },

    /// Fetch runtime information about the container.
    Info { handle: String },

    LimitCpu {
        handle: String,
        shares: u64,
    },

    LimitMemory {
        handle: String,
        bytes: u64,
    },

    /// Only present fields are transmitted.
    LimitDisk {
        handle: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        byte_limit: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        inode_limit: Option<u64>,
    },

    /// Request an inbound port mapping.
    NetIn { handle: String },

    /// Run a script to completion inside the container.
    Run {
        handle: String,
        script: String,
        privileged: bool,
        discard_output: bool,
    },

    /// Start a long-running job; resource limits ride on the request.
    Spawn {
        handle: String,
        script: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        nofile: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        nproc: Option<u64>,
    },

    /// Block until the spawned job completes.
    Link { handle: String, job_id: u32 },
}

// =============================================================================
// Response types
// =============================================================================

/// Response from the container runtime to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok(OkPayload),
    Error(ErrorPayload),
}

impl Response {
    /// Creates a success response with no data.
    pub fn ok() -> Self {
        Self::Ok(OkPayload { data: None })
    }

    /// Creates a success response with data.
    pub fn ok_with_data(data: ResponseData) -> Self {
        Self::Ok(OkPayload { data: Some(data) })
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Success payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

/// Response data variants, one per request kind that returns a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Container handle issued on successful creation.
    Created { handle: String },

    /// Runtime information about an existing container.
    Info {
        state: String,
        container_path: String,
        host_ip: String,
    },

    /// Allocated port mapping.
    NetIn {
        host_port: u16,
        container_port: u16,
    },

    /// Completed script run.
    Run {
        exit_status: i64,
        stdout: String,
        stderr: String,
    },

    /// Job identifier for a spawned process.
    Spawned { job_id: u32 },

    /// Completed spawned job.
    Linked {
        exit_status: i64,
        stdout: String,
        stderr: String,
    },
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

// =============================================================================
// Wire format helpers
// =============================================================================

impl Request {
    /// Serializes the request to a JSON line (with trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserializes a request from a JSON line.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s.trim())
    }
}

impl Response {
    /// Serializes the response to a JSON line (with trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserializes a response from a JSON line.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s.trim())
    }
}

/// Write one request frame to the control channel.
///
/// I/O failures surface as [`AgentError::Connection`].
pub async fn write_request<W>(writer: &mut W, request: &Request) -> AgentResult<()>
where
    W: AsyncWrite + Unpin,
{
    let line = request.to_json_line()?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(AgentError::Connection)?;
    writer.flush().await.map_err(AgentError::Connection)?;
    Ok(())
}

/// Read one response frame from the control channel.
///
/// EOF counts as a connection failure: the runtime never half-closes a
/// healthy control channel.
pub async fn read_response<R>(reader: &mut R) -> AgentResult<Response>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(AgentError::Connection)?;
    if n == 0 {
        return Err(AgentError::Connection(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "runtime closed control channel",
        )));
    }
    Ok(Response::from_json(&line)?)
}

/// Read one request frame; used by runtime-side fakes and daemons.
///
/// Returns `Ok(None)` on clean EOF.
pub async fn read_request<R>(reader: &mut R) -> AgentResult<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(AgentError::Connection)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(Request::from_json(&line)?))
}

/// Write one response frame; used by runtime-side fakes and daemons.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> AgentResult<()>
where
    W: AsyncWrite + Unpin,
{
    let line = response.to_json_line()?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(AgentError::Connection)?;
    writer.flush().await.map_err(AgentError::Connection)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mount_spec_defaults_resolve() {
        let mount = BindMountSpec::new("/var/data/app").resolve();
        assert_eq!(mount.src_path, "/var/data/app");
        assert_eq!(mount.dst_path, "/var/data/app");
        assert_eq!(mount.mode, BindMountMode::ReadOnly);
    }

    #[test]
    fn bind_mount_spec_explicit_fields_win() {
        let mount = BindMountSpec::new("/var/data/app")
            .dst_path("/home/app")
            .mode(BindMountMode::ReadWrite)
            .resolve();
        assert_eq!(mount.dst_path, "/home/app");
        assert_eq!(mount.mode, BindMountMode::ReadWrite);
    }

    #[test]
    fn create_request_serialization() {
        let req = Request::Create {
            bind_mounts: vec![BindMountSpec::new("/tmp/app").resolve()],
        };
        let json = req.to_json_line().unwrap();
        assert!(json.contains("\"op\":\"create\""));
        assert!(json.contains("\"mode\":\"read_only\""));
        assert!(json.ends_with('\n'));

        let parsed = Request::from_json(&json).unwrap();
        assert!(matches!(parsed, Request::Create { bind_mounts } if bind_mounts.len() == 1));
    }

    #[test]
    fn limit_disk_omits_absent_fields() {
        let req = Request::LimitDisk {
            handle: "h-1".into(),
            byte_limit: Some(1024),
            inode_limit: None,
        };
        let json = req.to_json_line().unwrap();
        assert!(json.contains("\"byte_limit\":1024"));
        assert!(!json.contains("inode_limit"));
    }

    #[test]
    fn response_serialization() {
        let resp = Response::ok();
        let json = resp.to_json_line().unwrap();
        assert!(json.contains("\"status\":\"ok\""));

        let resp = Response::error("unknown handle");
        let json = resp.to_json_line().unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("unknown handle"));
    }

    #[test]
    fn run_response_round_trip() {
        let resp = Response::ok_with_data(ResponseData::Run {
            exit_status: 1,
            stdout: "out".into(),
            stderr: "err".into(),
        });
        let json = resp.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"run\""));

        let parsed = Response::from_json(&json).unwrap();
        match parsed {
            Response::Ok(OkPayload {
                data: Some(ResponseData::Run { exit_status, .. }),
            }) => assert_eq!(exit_status, 1),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn frame_helpers_round_trip() {
        let mut buf = Vec::new();
        let req = Request::NetIn {
            handle: "h-2".into(),
        };
        write_request(&mut buf, &req).await.unwrap();

        let mut reader = std::io::Cursor::new(buf);
        let parsed = read_request(&mut reader).await.unwrap().unwrap();
        assert!(matches!(parsed, Request::NetIn { handle } if handle == "h-2"));

        // Clean EOF reads as None on the request side.
        assert!(read_request(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn response_eof_is_a_connection_error() {
        let mut reader = std::io::Cursor::new(Vec::new());
        let err = read_response(&mut reader).await.unwrap_err();
        assert!(err.is_connection());
    }
}
