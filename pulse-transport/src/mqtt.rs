//! MQTT broker-publish delivery (`spec.md` §4.4, "mqtt/broker"). None of
//! the five teacher-tier repos in the retrieval pack depend on `rumqttc`
//! (only a standalone `other_examples/` file does); that file was read only
//! to confirm `rumqttc`'s real API shape (`AsyncClient::new` returning a
//! client/event-loop pair that must be polled to flush a publish), not as a
//! grounding source. This module is otherwise original, built from the
//! delivery contract in `spec.md` §4.4.
//!
//! `rumqttc::AsyncClient::publish` only queues the packet; nothing reaches
//! the broker until the paired `EventLoop` is polled. Since each delivery
//! job is a one-shot publish rather than a long-lived subscriber, this
//! module opens a fresh connection per send, polls until the publish is
//! acknowledged (or immediately, for QoS 0), then disconnects.

use std::time::Duration;

use pulse_core::config::Mode;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};

use crate::error::DeliveryError;
use crate::ssrf;

pub struct MqttTarget<'a> {
    pub broker_url: &'a str,
    pub qos: u8,
    pub retain: bool,
}

pub async fn publish(
    target: MqttTarget<'_>,
    mode: Mode,
    topic: &str,
    payload: &[u8],
    timeout: Duration,
) -> Result<(), DeliveryError> {
    let (host, port) = parse_broker_url(target.broker_url)?;
    ssrf::check_host(&host, mode).await?;

    let client_id = format!("pulse-delivery-{}", uuid::Uuid::new_v4());
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(Duration::from_secs(5));

    let (client, mut event_loop) = AsyncClient::new(options, 16);
    let qos = qos_from_u8(target.qos);

    client
        .publish(topic, qos, target.retain, payload)
        .await
        .map_err(|e| DeliveryError::Connection(format!("mqtt publish failed: {e}")))?;

    let outcome = tokio::time::timeout(timeout, wait_for_ack(&mut event_loop, qos)).await;
    let _ = client.disconnect().await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout(timeout)),
    }
}

async fn wait_for_ack(event_loop: &mut rumqttc::EventLoop, qos: QoS) -> Result<(), DeliveryError> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(_))) if qos == QoS::AtMostOnce => return Ok(()),
            Ok(Event::Incoming(Packet::PubAck(_) | Packet::PubComp(_))) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(DeliveryError::Connection(format!("mqtt event loop error: {e}"))),
        }
    }
}

fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

fn parse_broker_url(broker_url: &str) -> Result<(String, u16), DeliveryError> {
    let url = reqwest::Url::parse(broker_url)
        .map_err(|e| DeliveryError::Configuration(format!("invalid broker url: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| DeliveryError::Configuration("broker url has no host".to_owned()))?
        .to_owned();
    let port = url.port().unwrap_or(1883);
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_mapping_matches_integration_field() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
        assert_eq!(qos_from_u8(9), QoS::AtMostOnce);
    }

    #[test]
    fn parses_broker_url_with_explicit_port() {
        let (host, port) = parse_broker_url("mqtt://broker.example.com:8883").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn defaults_to_standard_mqtt_port() {
        let (_, port) = parse_broker_url("mqtt://broker.example.com").unwrap();
        assert_eq!(port, 1883);
    }

    #[test]
    fn rejects_unparseable_broker_url() {
        assert!(parse_broker_url("not a url").is_err());
    }

    #[tokio::test]
    async fn rejects_loopback_broker_in_prod() {
        let target = MqttTarget {
            broker_url: "mqtt://127.0.0.1:1883",
            qos: 1,
            retain: false,
        };
        let err = publish(target, Mode::Prod, "t", b"x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::SsrfBlocked(_)));
    }
}
