//! TCP port readiness check.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{HealthOutcome, HealthProbe};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Polls a TCP endpoint until a connection succeeds.
pub struct PortCheck {
    host: String,
    port: u16,
    retry_interval: Duration,
}

impl PortCheck {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Start probing; resolves `Ready` on the first successful connect.
    pub fn start(self, timeout: Duration) -> HealthProbe {
        HealthProbe::spawn(move |cancel| self.run(cancel, timeout))
    }

    async fn run(self, cancel: CancellationToken, timeout: Duration) -> HealthOutcome {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return HealthOutcome::Stopped,
                _ = &mut deadline => {
                    tracing::debug!(host = %self.host, port = self.port, "port check timed out");
                    return HealthOutcome::TimedOut;
                }
                attempt = TcpStream::connect((self.host.as_str(), self.port)) => {
                    match attempt {
                        Ok(_) => {
                            tracing::debug!(host = %self.host, port = self.port, "port is accepting connections");
                            return HealthOutcome::Ready;
                        }
                        Err(err) => {
                            tracing::trace!(host = %self.host, port = self.port, error = %err, "port not ready");
                            tokio::select! {
                                _ = cancel.cancelled() => return HealthOutcome::Stopped,
                                _ = &mut deadline => return HealthOutcome::TimedOut,
                                _ = tokio::time::sleep(self.retry_interval) => {}
                            }
                        }
                    }
                }
            }
        }
    }
}
