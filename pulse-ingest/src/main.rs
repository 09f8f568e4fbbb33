use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::info;

use pulse_ingest::auth_cache::AuthCache;
use pulse_ingest::batch_writer::BatchWriter;
use pulse_ingest::broker::{self, InboundMessage};
use pulse_ingest::config::IngestConfig;
use pulse_ingest::pipeline::{self, PipelineContext};
use pulse_ingest::rate_limit::RateLimiter;
use pulse_ingest::settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = IngestConfig::from_env()?;
    let pool = pulse_db::connect(&config.core.database_url, 10).await?;
    info!("pulse-ingest connected to database");

    let initial_settings = settings::load(&pool).await.unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to load initial app_settings, using defaults");
        settings::RuntimeSettings::default()
    });
    let rate_limit_rps = initial_settings.rate_limit_rps;
    let rate_limit_burst = initial_settings.rate_limit_burst;
    let shared_settings = Arc::new(RwLock::new(initial_settings));

    let auth_cache = AuthCache::new(config.auth_cache_ttl, config.auth_cache_max_size);
    let rate_limiter = RateLimiter::new(rate_limit_rps, rate_limit_burst);
    let batch_writer = Arc::new(BatchWriter::new(config.max_buffer_size, config.batch_size));

    let ctx = Arc::new(PipelineContext {
        pool: pool.clone(),
        auth_cache,
        rate_limiter,
        batch_writer: Arc::clone(&batch_writer),
        settings: Arc::clone(&shared_settings),
        require_token: config.require_token,
        auto_provision: config.auto_provision,
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let (msg_tx, msg_rx) = mpsc::channel::<InboundMessage>(config.queue_size);

    let mut worker_handles = Vec::with_capacity(config.worker_count);
    let msg_rx = Arc::new(tokio::sync::Mutex::new(msg_rx));
    for worker_id in 0..config.worker_count {
        let ctx = Arc::clone(&ctx);
        let msg_rx = Arc::clone(&msg_rx);
        let mut shutdown_rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            loop {
                let next = {
                    let mut rx = msg_rx.lock().await;
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => None,
                        message = rx.recv() => message,
                    }
                };
                match next {
                    Some(message) => {
                        pipeline::process(&ctx, &message.topic, &message.payload).await;
                    }
                    None => break,
                }
            }
            info!(worker_id, "ingest worker stopped");
        }));
    }

    let settings_poll_handle = settings::spawn_poller(pool.clone(), Arc::clone(&shared_settings), config.settings_poll);

    let flush_pool = pool.clone();
    let flush_writer = Arc::clone(&batch_writer);
    let flush_interval = config.flush_interval;
    let flush_shutdown = shutdown_rx.clone();
    let flush_handle = tokio::spawn(async move {
        flush_writer.run(&flush_pool, flush_interval, flush_shutdown).await;
    });

    let broker_shutdown = shutdown_rx.clone();
    let broker_handle = tokio::spawn(broker::run(
        config.mqtt_host.clone(),
        config.mqtt_port,
        config.mqtt_topic.clone(),
        msg_tx,
        broker_shutdown,
    ));

    shutdown_signal().await;
    info!("pulse-ingest shutting down");
    let _ = shutdown_tx.send(true);
    settings_poll_handle.abort();

    let _ = broker_handle.await;
    let _ = flush_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }

    info!("pulse-ingest shut down");
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

