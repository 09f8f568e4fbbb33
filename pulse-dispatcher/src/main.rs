use tracing::info;

use pulse_dispatcher::config::DispatcherConfig;
use pulse_dispatcher::{escalation_pass, primary_pass};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = DispatcherConfig::from_env()?;
    let pool = pulse_db::connect(&config.core.database_url, 10).await?;
    info!("pulse-dispatcher connected to database");

    let listener = pulse_db::Listener::connect(&config.core.notify_database_url, "new_fleet_alert").await?;
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let dispatch_handle = tokio::spawn(async move {
        let mut notifications = listener.notifications;
        let mut ticker = tokio::time::interval(config.core.fallback_poll);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => run_passes(&pool, &config).await,
                notification = notifications.recv() => {
                    if notification.is_none() {
                        break;
                    }
                    tokio::time::sleep(config.core.debounce).await;
                    while notifications.try_recv().is_ok() {}
                    run_passes(&pool, &config).await;
                }
            }
        }
        info!("dispatch task stopped");
    });

    shutdown_signal().await;
    info!("pulse-dispatcher shutting down");
    let _ = shutdown_tx.send(true);
    let _ = dispatch_handle.await;

    info!("pulse-dispatcher shut down");
    Ok(())
}

async fn run_passes(pool: &sqlx::PgPool, config: &DispatcherConfig) {
    let primary = primary_pass::run_once(pool, config).await;
    let escalated = escalation_pass::run_once(pool, config).await;
    if primary > 0 || escalated > 0 {
        info!(primary, escalated, "dispatch cycle enqueued jobs");
    }
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
