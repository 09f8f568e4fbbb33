use std::sync::Arc;

use tracing::info;

use pulse_evaluator::config::EvaluatorConfig;
use pulse_evaluator::windows::WindowRuntime;
use pulse_evaluator::{cycle, escalation};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = EvaluatorConfig::from_env()?;
    let pool = pulse_db::connect(&config.core.database_url, 10).await?;
    info!("pulse-evaluator connected to database");

    let windows = Arc::new(WindowRuntime::new());
    let listener = pulse_db::Listener::connect(&config.core.notify_database_url, "telemetry_inserted").await?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let escalation_pool = pool.clone();
    let escalation_poll = config.poll;
    let mut escalation_shutdown = shutdown_rx.clone();
    let escalation_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(escalation_poll);
        loop {
            tokio::select! {
                _ = escalation_shutdown.changed() => break,
                _ = ticker.tick() => escalation::sweep(&escalation_pool).await,
            }
        }
        info!("escalation sweep task stopped");
    });

    let cycle_handle = tokio::spawn(async move {
        let mut notifications = listener.notifications;
        let mut ticker = tokio::time::interval(config.core.fallback_poll);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    cycle::run_once(&pool, chrono::Duration::from_std(config.heartbeat_stale).unwrap_or_default(), &windows).await;
                }
                notification = notifications.recv() => {
                    if notification.is_none() {
                        break;
                    }
                    tokio::time::sleep(config.core.debounce).await;
                    while notifications.try_recv().is_ok() {}
                    cycle::run_once(&pool, chrono::Duration::from_std(config.heartbeat_stale).unwrap_or_default(), &windows).await;
                }
            }
        }
        info!("evaluation cycle task stopped");
    });

    shutdown_signal().await;
    info!("pulse-evaluator shutting down");
    let _ = shutdown_tx.send(true);

    let _ = escalation_handle.await;
    let _ = cycle_handle.await;

    info!("pulse-evaluator shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
