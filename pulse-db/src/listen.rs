//! Dedicated `LISTEN`/`NOTIFY` connection.
//!
//! Uses a single `PgListener` connected through `notify_database_url`
//! rather than the pooled connection, so it survives in front of a
//! transaction-pooling proxy that would otherwise drop session state
//! (`spec.md` §5, §7 "Infrastructure errors"). On a connection error the
//! listener reconnects with a short fixed delay rather than propagating --
//! the caller always gets *some* stream of wakeups, possibly delayed.

use std::time::Duration;

use sqlx::postgres::PgListener;
use tokio::sync::mpsc;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// A channel a service's waker task can wait on for `NOTIFY` events on a
/// single channel name. Closed only if the sender task itself panics.
pub struct Listener {
    pub notifications: mpsc::Receiver<()>,
}

impl Listener {
    /// Connect and start forwarding `NOTIFY <channel>` events onto an
    /// internal channel. Every notification collapses to a unit `()` --
    /// callers always re-scan rather than trust the payload, per
    /// `spec.md` §6 ("receivers re-scan").
    ///
    /// # Errors
    /// Returns an error only if the *first* connection attempt fails; once
    /// running, reconnects happen silently (logged) in the background.
    pub async fn connect(database_url: &str, channel: &str) -> Result<Self, sqlx::Error> {
        let mut pg_listener = PgListener::connect(database_url).await?;
        pg_listener.listen(channel).await?;

        let (tx, rx) = mpsc::channel(16);
        let database_url = database_url.to_owned();
        let channel = channel.to_owned();

        tokio::spawn(async move {
            let mut listener = pg_listener;
            loop {
                match listener.recv().await {
                    Ok(_notification) => {
                        if tx.send(()).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, channel, "listen connection dropped, reconnecting");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        match PgListener::connect(&database_url).await {
                            Ok(mut fresh) => {
                                if fresh.listen(&channel).await.is_ok() {
                                    listener = fresh;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(%err, "failed to reconnect listen connection");
                            }
                        }
                    }
                }
            }
        });

        Ok(Self { notifications: rx })
    }
}
