//! Connection management for the runtime control socket.
//!
//! One `Connection` per logical channel. The underlying stream is dialed
//! lazily on first use and discarded when an exchange fails at the
//! transport level, so the next call re-dials.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufStream};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use stevedore_shared::protocol::{self, Request, Response};
use stevedore_shared::{AgentError, AgentResult, Transport};

/// Buffered bidirectional stream suitable for newline-framed exchanges.
trait ControlIo: AsyncBufRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncBufRead + AsyncWrite + Send + Unpin> ControlIo for T {}

/// A single control channel to the runtime.
///
/// The inner mutex serializes exchanges: at most one request is in flight
/// per channel, which also guarantees at most one dial attempt at a time.
pub struct Connection {
    transport: Transport,
    io: tokio::sync::Mutex<Option<Box<dyn ControlIo>>>,
}

impl Connection {
    /// Create a lazy connection (does not dial immediately).
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            io: tokio::sync::Mutex::new(None),
        }
    }

    /// Send one request and read its response.
    ///
    /// On a transport failure the cached stream is dropped so the next
    /// exchange dials a fresh one. Domain errors leave the stream alone:
    /// the channel is still healthy.
    pub async fn exchange(&self, request: &Request) -> AgentResult<Response> {
        let mut guard = self.io.lock().await;

        if guard.is_none() {
            *guard = Some(self.dial().await?);
        }
        let io = guard
            .as_mut()
            .ok_or_else(|| AgentError::Internal("connection slot empty after dial".into()))?;

        match roundtrip(io, request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                if err.is_connection() {
                    *guard = None;
                }
                Err(err)
            }
        }
    }

    async fn dial(&self) -> AgentResult<Box<dyn ControlIo>> {
        match &self.transport {
            #[cfg(unix)]
            Transport::Unix { socket_path } => {
                tracing::debug!(socket = %socket_path.display(), "dialing runtime control socket");
                let stream = UnixStream::connect(socket_path)
                    .await
                    .map_err(AgentError::Connection)?;
                Ok(Box::new(BufStream::new(stream)))
            }
            #[cfg(not(unix))]
            Transport::Unix { socket_path } => Err(AgentError::Config(format!(
                "unix transport {} unsupported on this platform",
                socket_path.display()
            ))),
            Transport::Tcp { port } => {
                tracing::debug!(port, "dialing runtime control socket over TCP");
                let stream = TcpStream::connect(("127.0.0.1", *port))
                    .await
                    .map_err(AgentError::Connection)?;
                Ok(Box::new(BufStream::new(stream)))
            }
        }
    }
}

async fn roundtrip(io: &mut Box<dyn ControlIo>, request: &Request) -> AgentResult<Response> {
    protocol::write_request(io, request).await?;
    protocol::read_response(io).await
}

/// Cache of one connection per channel name.
///
/// Read and replaced under a short lock; no pooling beyond one-per-channel.
pub(crate) struct ChannelCache {
    transport: Transport,
    channels: parking_lot::Mutex<HashMap<String, Arc<Connection>>>,
}

impl ChannelCache {
    pub(crate) fn new(transport: Transport) -> Self {
        Self {
            transport,
            channels: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the connection for a channel name.
    pub(crate) fn channel(&self, name: &str) -> Arc<Connection> {
        let mut channels = self.channels.lock();
        channels
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Connection::new(self.transport.clone())))
            .clone()
    }
}
