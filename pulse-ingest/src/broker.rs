//! MQTT broker subscription, feeding raw `(topic, payload)` pairs to the
//! pipeline worker pool over a bounded channel (`spec.md` §4.1, §6).
//!
//! A slow worker pool does not block the broker connection: a full channel
//! drops the message and counts it, rather than applying MQTT backpressure
//! all the way to the device fleet.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

/// One inbound message pulled off the broker, not yet parsed or validated.
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Connect to the broker, subscribe to `topic_filter`, and forward messages
/// onto `tx` until the connection is dropped or the process shuts down.
pub async fn run(
    host: String,
    port: u16,
    topic_filter: String,
    tx: mpsc::Sender<InboundMessage>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let client_id = format!("pulse-ingest-{}", uuid::Uuid::new_v4());
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(std::time::Duration::from_secs(30));

    let (client, mut event_loop) = AsyncClient::new(options, 256);
    if let Err(err) = client.subscribe(&topic_filter, QoS::AtLeastOnce).await {
        tracing::error!(%err, topic_filter, "failed to subscribe to broker topic");
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = client.disconnect().await;
                break;
            }
            event = event_loop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if tx.try_send(message).is_err() {
                            tracing::warn!("pipeline queue full, dropping inbound message");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(%err, "broker connection error, retrying");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
