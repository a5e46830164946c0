//! Instance health checks.
//!
//! A check runs as a background task racing readiness against a deadline
//! and an external stop signal. Exactly one outcome is delivered.

mod port;
mod state_file;

pub use port::PortCheck;
pub use state_file::StateFileCheck;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Terminal result of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The readiness condition held before the deadline.
    Ready,
    /// The deadline elapsed first.
    TimedOut,
    /// The check was cancelled from outside.
    Stopped,
}

/// Handle to a running health check.
pub struct HealthProbe {
    outcome: oneshot::Receiver<HealthOutcome>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthProbe {
    pub(crate) fn spawn<F>(run: impl FnOnce(CancellationToken) -> F) -> Self
    where
        F: std::future::Future<Output = HealthOutcome> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let fut = run(cancel.clone());
        let task = tokio::spawn(async move {
            // The receiver may be gone if the caller dropped the probe;
            // the outcome is then simply unobserved.
            let _ = tx.send(fut.await);
        });
        Self {
            outcome: rx,
            cancel,
            task,
        }
    }

    /// Wait for the check to conclude.
    pub async fn wait(mut self) -> HealthOutcome {
        // Poll the receiver by reference: the field cannot be moved out
        // while `Drop` is implemented. A dropped sender means the task was
        // aborted or panicked; report that as an external stop rather than
        // surfacing a join error.
        (&mut self.outcome).await.unwrap_or(HealthOutcome::Stopped)
    }

    /// Cancel the check; a pending `wait` resolves to `Stopped`.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for HealthProbe {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}
