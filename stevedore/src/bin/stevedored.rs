//! stevedored - per-host agent daemon.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use stevedore::api::{control_router, ControlHandler};
use stevedore::bus::{LoggingAdvertiser, LoggingBus};
use stevedore::config::AgentConfig;
use stevedore::directory::{DirectoryServer, UrlSigner};
use stevedore::lifecycle::{
    install_signal_handlers, InstanceStopper, Lifecycle, LifecycleConfig,
};
use stevedore::registry::{
    Instance, InstanceRegistry, InstanceState, StagingRegistry, StagingTask,
};
use stevedore::runtime::ContainerClient;

#[derive(Parser, Debug)]
#[command(name = "stevedored", about = "Per-host platform agent")]
struct Args {
    /// Path to a JSON configuration file; defaults apply when omitted.
    #[arg(short, long, env = "STEVEDORE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Override the HTTP listen address.
    #[arg(long, env = "STEVEDORE_LISTEN_ADDR")]
    listen_addr: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => AgentConfig::default(),
    };
    if let Some(addr) = &args.listen_addr {
        config.listen_addr = addr.clone();
    }
    config.sanitize().context("invalid configuration")?;
    Ok(config)
}

/// Stops workloads by destroying their containers through the runtime.
struct RuntimeStopper {
    client: Arc<ContainerClient>,
}

#[async_trait]
impl InstanceStopper for RuntimeStopper {
    async fn stop_instance(&self, instance: &Instance) {
        tracing::info!(instance_id = instance.id(), "stopping instance");
        instance.set_state(InstanceState::Stopping);
        if let Err(err) = self.client.stop().await {
            tracing::warn!(instance_id = instance.id(), error = %err, "stop failed");
        }
        self.client.destroy().await;
        instance.set_state(InstanceState::Stopped);
    }

    async fn stop_task(&self, task: &StagingTask) {
        tracing::info!(task_id = task.id(), "stopping staging task");
        self.client.destroy().await;
    }
}

/// Placeholder control handler until the staging and droplet pipelines
/// land; accepted requests are registered and logged.
struct LoggingControlHandler {
    instances: Arc<InstanceRegistry>,
    tasks: Arc<StagingRegistry>,
}

#[async_trait]
impl ControlHandler for LoggingControlHandler {
    async fn stage(&self, request: Value) {
        let task_id = request
            .get("task_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tracing::info!(task_id, "accepted staging request");
        self.tasks.register(StagingTask::new(task_id));
    }

    async fn start_app(&self, request: Value) {
        let instance_id = request
            .get("instance_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tracing::info!(instance_id, "accepted start request");
        self.instances
            .register(Instance::new(instance_id, InstanceState::Born));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::info!(listen_addr = %config.listen_addr, "starting stevedored");

    let instances = Arc::new(InstanceRegistry::new());
    let tasks = Arc::new(StagingRegistry::new());
    let client = Arc::new(ContainerClient::new(config.runtime_transport()));

    let bus = Arc::new(LoggingBus);
    let advertiser = Arc::new(LoggingAdvertiser);
    let stopper = Arc::new(RuntimeStopper {
        client: client.clone(),
    });
    let lifecycle = Lifecycle::new(
        instances.clone(),
        tasks.clone(),
        bus,
        advertiser,
        stopper,
        LifecycleConfig {
            evacuation_bail_out: config.evacuation_bail_out(),
        },
    );

    let signer = Arc::new(UrlSigner::new(config.url_max_age()));
    let directory = DirectoryServer::new(signer, instances.clone(), tasks.clone());
    let handler = Arc::new(LoggingControlHandler {
        instances: instances.clone(),
        tasks: tasks.clone(),
    });

    let app = directory
        .router()
        .merge(control_router(lifecycle.clone(), handler));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "http server listening");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "http server exited");
        }
    });

    install_signal_handlers(lifecycle.clone());
    lifecycle.wait_terminated().await;
    Ok(())
}
