use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use traffic_guard::{
    create_router, AlertDispatcher, AlertSink, ApiState, CommandSink, MemoryStore, SharedStore,
    StateFile, TrafficEngine, TrafficGuardConfig, WebhookSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = TrafficGuardConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config);

    info!(
        host = %config.server_host,
        port = config.server_port,
        limit_bytes = config.limit_bytes,
        state_file = %config.state_file.display(),
        workers = config.workers,
        "starting traffic-guard service"
    );

    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let state_file = Arc::new(StateFile::new(config.state_file.clone()));
    let alerts = AlertDispatcher::new(Arc::clone(&store), build_alert_sinks(&config)?);
    let config = Arc::new(config);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid server bind address")?;
    let listener = StdTcpListener::bind(addr).context("failed to bind TCP listener")?;
    listener
        .set_nonblocking(true)
        .context("failed to make listener non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!(%local_addr, "traffic-guard listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers = JoinSet::new();
    let mut timers = Vec::new();

    for worker_id in 0..config.workers {
        let engine = TrafficEngine::new(
            worker_id,
            Arc::clone(&store),
            Arc::clone(&state_file),
            alerts.clone(),
            &config,
        );
        if let Some(timer) = engine.start() {
            timers.push(timer);
        }

        let worker_listener = TcpListener::from_std(
            listener
                .try_clone()
                .context("failed to clone listener for worker")?,
        )?;
        let router = create_router(Arc::new(ApiState::new(engine, Arc::clone(&config))));
        let mut shutdown = shutdown_rx.clone();

        servers.spawn(async move {
            axum::serve(worker_listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await
        });
    }

    shutdown_signal().await;
    info!("traffic-guard shutting down");
    let _ = shutdown_tx.send(true);

    while let Some(joined) = servers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "worker server failed"),
            Err(err) => error!(error = %err, "worker task panicked"),
        }
    }
    for timer in timers {
        timer.shutdown().await;
    }

    info!("traffic-guard shutdown complete");
    Ok(())
}

fn init_tracing(config: &TrafficGuardConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn build_alert_sinks(config: &TrafficGuardConfig) -> Result<Vec<Arc<dyn AlertSink>>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();

    if let Some(command) = &config.alert_command {
        let sink = CommandSink::parse(command, config.alert_timeout())
            .context("TRAFFIC_ALERT_COMMAND is invalid")?;
        sinks.push(Arc::new(sink));
    }
    if let Some(url) = &config.alert_webhook {
        let sink = WebhookSink::new(url.clone(), config.alert_timeout())
            .context("failed to build alert webhook client")?;
        sinks.push(Arc::new(sink));
    }

    if sinks.is_empty() {
        warn!("no alert command or webhook configured; ceiling alerts are only logged");
    }
    Ok(sinks)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
