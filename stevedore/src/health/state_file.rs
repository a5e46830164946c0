//! State-file readiness check.
//!
//! The instance's startup machinery writes a small JSON document whose
//! `state` field flips to `RUNNING` once the app is up. Until the file
//! parses and says so, the instance is not ready; a missing or garbled
//! file is simply not-yet-ready, never an error.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{HealthOutcome, HealthProbe};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const READY_STATE: &str = "RUNNING";

/// Polls a JSON state file until it reports the running state.
pub struct StateFileCheck {
    path: PathBuf,
    poll_interval: Duration,
}

impl StateFileCheck {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start polling; checks immediately, then on each interval tick.
    pub fn start(self, timeout: Duration) -> HealthProbe {
        HealthProbe::spawn(move |cancel| self.run(cancel, timeout))
    }

    async fn run(self, cancel: CancellationToken, timeout: Duration) -> HealthOutcome {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            if file_ready(&self.path).await {
                tracing::debug!(path = %self.path.display(), "state file reports running");
                return HealthOutcome::Ready;
            }
            tokio::select! {
                _ = cancel.cancelled() => return HealthOutcome::Stopped,
                _ = &mut deadline => {
                    tracing::debug!(path = %self.path.display(), "state file check timed out");
                    return HealthOutcome::TimedOut;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

async fn file_ready(path: &std::path::Path) -> bool {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::trace!(path = %path.display(), error = %err, "state file unreadable");
            return false;
        }
    };
    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(doc) => doc.get("state").and_then(|s| s.as_str()) == Some(READY_STATE),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "state file not yet parseable");
            false
        }
    }
}
