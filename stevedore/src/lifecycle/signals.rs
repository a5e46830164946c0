//! Signal-driven lifecycle transitions.
//!
//! SIGINT and SIGTERM trigger shutdown. SIGUSR1 announces departure and
//! stops advertising but leaves workloads running. SIGUSR2 starts
//! evacuation, polling until the coordinator says shutdown may follow.

use std::sync::Arc;
use std::time::Duration;

use super::Lifecycle;

const EVACUATION_POLL: Duration = Duration::from_secs(1);

/// Spawn the signal dispatch task.
#[cfg(unix)]
pub fn install_signal_handlers(lifecycle: Arc<Lifecycle>) -> tokio::task::JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    // A signal kind the platform refuses is logged and ignored rather
    // than aborting startup.
    let register = |kind: SignalKind, name: &str| match signal(kind) {
        Ok(stream) => Some(stream),
        Err(err) => {
            tracing::warn!(signal = name, error = %err, "failed to register signal handler");
            None
        }
    };

    let mut sigint = register(SignalKind::interrupt(), "SIGINT");
    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
    let mut sigusr1 = register(SignalKind::user_defined1(), "SIGUSR1");
    let mut sigusr2 = register(SignalKind::user_defined2(), "SIGUSR2");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = recv(&mut sigint) => {
                    tracing::info!("caught SIGINT");
                    lifecycle.shutdown().await;
                    return;
                }
                _ = recv(&mut sigterm) => {
                    tracing::info!("caught SIGTERM");
                    lifecycle.shutdown().await;
                    return;
                }
                _ = recv(&mut sigusr1) => {
                    tracing::info!("caught SIGUSR1; leaving cluster quietly");
                    lifecycle.send_goodbye_once().await;
                    lifecycle.stop_advertising();
                }
                _ = recv(&mut sigusr2) => {
                    tracing::info!("caught SIGUSR2; evacuating");
                    // Poll on a separate task so SIGINT/SIGTERM still force
                    // an immediate shutdown while evacuation drains.
                    let lifecycle = lifecycle.clone();
                    tokio::spawn(async move {
                        loop {
                            if lifecycle.evacuate().await {
                                lifecycle.shutdown().await;
                                return;
                            }
                            tokio::time::sleep(EVACUATION_POLL).await;
                        }
                    });
                }
            }
        }
    })
}

#[cfg(unix)]
async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) {
    match stream {
        Some(stream) => {
            stream.recv().await;
        }
        // Unregistered kinds never fire.
        None => std::future::pending().await,
    }
}

/// Non-unix fallback: Ctrl-C triggers shutdown, the other signals do not
/// exist on this platform.
#[cfg(not(unix))]
pub fn install_signal_handlers(lifecycle: Arc<Lifecycle>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("caught interrupt");
            lifecycle.shutdown().await;
        }
    })
}
