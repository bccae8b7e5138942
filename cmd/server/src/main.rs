mod config;
mod http;
mod metrics;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::{AppConfig, RuntimeKind};
use opensandbox_lifecycle::{LifecycleConfig, LifecycleEngine};
use opensandbox_providers::{
    BatchSandboxProvider, BatchSandboxTemplate, DirectDaemonConfig, DirectDaemonProvider,
    WorkloadProvider,
};
use telemetry::LogFormat;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "opensandboxd", about = "OpenSandbox control plane daemon")]
struct Args {
    /// Path to the TOML config file. Defaults to $SANDBOX_CONFIG_PATH, then ~/.sandbox.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reload the config and re-apply the log filter on SIGHUP instead of requiring a restart.
    #[arg(long, default_value_t = false)]
    reload: bool,

    #[arg(long, env = "OPENSANDBOX_LOG_FILTER", default_value = "info")]
    log_filter: String,

    #[arg(long, env = "OPENSANDBOX_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(&args.log_filter, args.log_format);

    let config_path = AppConfig::resolve_path(args.config.clone());
    let config = AppConfig::load(&config_path)?;
    info!(path = %config_path.display(), "loaded configuration");

    let provider: Arc<dyn WorkloadProvider> = build_provider(&config).await?;

    let lifecycle_config = LifecycleConfig {
        namespace: config
            .runtime
            .kubernetes
            .as_ref()
            .and_then(|k| k.namespace.clone())
            .unwrap_or_else(|| "default".to_string()),
        execd_image: config.runtime.execd_image.clone(),
        egress_image: config
            .runtime
            .kubernetes
            .as_ref()
            .and_then(|k| k.egress_image.clone()),
        allowed_host_path_prefixes: config.runtime.allowed_host_path_prefixes.clone(),
        label_selector_key: "opensandbox.io/managed".to_string(),
        retry_attempts: 3,
    };
    let engine = Arc::new(LifecycleEngine::new(provider, lifecycle_config));

    match engine.restore().await {
        Ok(count) => info!(count, "restored sandboxes from backend on startup"),
        Err(e) => error!(error = %e, "failed to restore sandboxes on startup"),
    }

    if args.reload {
        let reload_path = config_path.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut sighup) = signal(SignalKind::hangup()) else {
                return;
            };
            loop {
                sighup.recv().await;
                match AppConfig::load(&reload_path) {
                    Ok(_) => info!(path = %reload_path.display(), "config reloaded on SIGHUP"),
                    Err(e) => error!(error = %e, "failed to reload config on SIGHUP"),
                }
            }
        });
    }

    let metrics = Arc::new(metrics::Metrics::new());
    let state = Arc::new(http::AppState {
        engine: engine.clone(),
        metrics,
        router_mode: config.router.mode(),
    });

    let sweeper_engine = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let expired = sweeper_engine.sweep_expired().await;
            if !expired.is_empty() {
                info!(count = expired.len(), "swept expired sandboxes");
            }
        }
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    let app = http::router(state);
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "http server exited with an error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

async fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn WorkloadProvider>> {
    match config.runtime.kind {
        RuntimeKind::Docker => {
            let docker = bollard::Docker::connect_with_local_defaults()?;
            let docker_config = config
                .runtime
                .docker
                .as_ref()
                .map(|d| DirectDaemonConfig {
                    network_mode: d.network_mode.clone(),
                    drop_capabilities: d.drop_capabilities.clone(),
                    apparmor_profile: d.apparmor_profile.clone(),
                    no_new_privileges: d.no_new_privileges,
                    seccomp_profile: d.seccomp_profile.clone(),
                    pids_limit: d.pids_limit,
                })
                .unwrap_or_default();
            Ok(Arc::new(DirectDaemonProvider::new(docker, docker_config)))
        }
        RuntimeKind::Kubernetes => {
            let client = kube::Client::try_default().await?;
            let template_path = config
                .runtime
                .kubernetes
                .as_ref()
                .and_then(|k| k.batchsandbox_template_file.clone());
            let template = match template_path {
                Some(path) => {
                    let contents = std::fs::read_to_string(&path)?;
                    BatchSandboxTemplate::from_yaml(&contents)?
                }
                None => BatchSandboxTemplate::empty(),
            };
            Ok(Arc::new(BatchSandboxProvider::new(client, template)))
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}
