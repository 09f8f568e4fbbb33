use std::sync::Arc;

use tracing::{info, warn};

use pulse_delivery_worker::config::WorkerConfig;
use pulse_delivery_worker::{dispatch, lease};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(WorkerConfig::from_env()?);
    let pool = pulse_db::connect(&config.core.database_url, config.worker_count as u32 + 5).await?;
    info!(workers = config.worker_count, "pulse-delivery-worker connected to database");

    let listener = pulse_db::Listener::connect(&config.core.notify_database_url, "new_delivery_job").await?;
    let wake = Arc::new(tokio::sync::Notify::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let waker_wake = wake.clone();
    let waker_poll = config.core.fallback_poll;
    let mut waker_shutdown = shutdown_rx.clone();
    let waker_handle = tokio::spawn(async move {
        let mut notifications = listener.notifications;
        let mut ticker = tokio::time::interval(waker_poll);
        loop {
            tokio::select! {
                _ = waker_shutdown.changed() => break,
                _ = ticker.tick() => waker_wake.notify_waiters(),
                notification = notifications.recv() => {
                    if notification.is_none() {
                        break;
                    }
                    waker_wake.notify_waiters();
                }
            }
        }
        info!("delivery waker task stopped");
    });

    let maintenance_pool = pool.clone();
    let maintenance_config = config.clone();
    let mut maintenance_shutdown = shutdown_rx.clone();
    let maintenance_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(maintenance_config.poll);
        loop {
            tokio::select! {
                _ = maintenance_shutdown.changed() => break,
                _ = ticker.tick() => {
                    match lease::requeue_stuck(&maintenance_pool, maintenance_config.stuck_job_minutes).await {
                        Ok(0) => {}
                        Ok(n) => info!(n, "requeued stuck delivery jobs"),
                        Err(err) => warn!(%err, "failed to requeue stuck delivery jobs"),
                    }
                }
            }
        }
        info!("stuck-job maintenance task stopped");
    });

    let mut worker_handles = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count {
        let worker_pool = pool.clone();
        let worker_config = config.clone();
        let worker_wake = wake.clone();
        let mut worker_shutdown = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = worker_shutdown.changed() => break,
                    _ = worker_wake.notified() => {}
                    _ = tokio::time::sleep(worker_config.poll) => {}
                }
                match lease::claim_batch(&worker_pool, worker_config.batch_size).await {
                    Ok(jobs) if jobs.is_empty() => {}
                    Ok(jobs) => {
                        for job in jobs {
                            dispatch::handle_job(&worker_pool, &worker_config, job).await;
                        }
                    }
                    Err(err) => warn!(%err, worker_id, "failed to lease delivery jobs"),
                }
            }
            info!(worker_id, "delivery worker task stopped");
        }));
    }

    shutdown_signal().await;
    info!("pulse-delivery-worker shutting down");
    let _ = shutdown_tx.send(true);

    let _ = waker_handle.await;
    let _ = maintenance_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }

    info!("pulse-delivery-worker shut down");
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
