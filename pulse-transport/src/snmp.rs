//! SNMP trap delivery (`spec.md` §4.4, "snmp"). No teacher or example repo
//! in the retrieval pack uses the `snmp` crate anywhere; this module is
//! written directly against its synchronous `SyncSession` API, wrapped in
//! `spawn_blocking` since that session type has no async variant.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use pulse_core::config::Mode;
use pulse_core::domain::SnmpCredentials;
use snmp::{SyncSession, Value};

use crate::error::DeliveryError;
use crate::ssrf;

pub struct SnmpTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub credentials: &'a SnmpCredentials,
    pub oid_prefix: &'a str,
}

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Send a v2c trap with `varbinds` (`(oid_suffix, value)` pairs) appended to
/// `target.oid_prefix`.
///
/// # Errors
/// Returns [`DeliveryError::Configuration`] for SNMPv3 credentials -- the
/// underlying `snmp` crate implements only v1/v2c.
pub async fn send_trap(target: SnmpTarget<'_>, mode: Mode, varbinds: Vec<(String, String)>) -> Result<(), DeliveryError> {
    ssrf::check_host(target.host, mode).await?;

    let community = match target.credentials {
        SnmpCredentials::V2c { community } => community.clone(),
        SnmpCredentials::V3 { .. } => {
            // TODO: add SNMPv3 USM support once the `snmp` crate (or a
            // replacement) exposes it; v0.2 only implements v1/v2c traps.
            return Err(DeliveryError::Configuration(
                "SNMPv3 credentials are not supported by the current SNMP transport".to_owned(),
            ));
        }
    };

    let destination = resolve(target.host, target.port)?;
    let oid_prefix = target.oid_prefix.to_owned();

    tokio::task::spawn_blocking(move || send_trap_blocking(destination, &community, &oid_prefix, &varbinds))
        .await
        .map_err(|e| DeliveryError::Other(format!("snmp worker task panicked: {e}")))?
}

fn send_trap_blocking(
    destination: SocketAddr,
    community: &str,
    oid_prefix: &str,
    varbinds: &[(String, String)],
) -> Result<(), DeliveryError> {
    let mut session = SyncSession::new(destination, community.as_bytes(), Some(SEND_TIMEOUT), 0)
        .map_err(|e| DeliveryError::Connection(format!("snmp session error: {e}")))?;

    let full_oids: Vec<String> = varbinds
        .iter()
        .map(|(suffix, _)| format!("{oid_prefix}.{suffix}"))
        .collect();
    let bound: Vec<(&str, Value)> = full_oids
        .iter()
        .zip(varbinds.iter())
        .map(|(oid, (_, value))| (oid.as_str(), Value::OctetString(value.as_bytes())))
        .collect();

    session
        .send_trap(0, oid_prefix, &bound)
        .map_err(|e| DeliveryError::Connection(format!("snmp trap send failed: {e:?}")))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, DeliveryError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| DeliveryError::Connection(format!("snmp host resolution failed: {e}")))?
        .next()
        .ok_or_else(|| DeliveryError::Connection("snmp host resolved to no addresses".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn v3_credentials_return_a_configuration_error() {
        let creds = SnmpCredentials::V3 {
            user: "admin".into(),
            auth_key: "authkey".into(),
            priv_key: "privkey".into(),
        };
        let target = SnmpTarget {
            host: "203.0.113.10",
            port: 162,
            credentials: &creds,
            oid_prefix: "1.3.6.1.4.1.9999",
        };
        let err = send_trap(target, Mode::Dev, vec![]).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[tokio::test]
    async fn loopback_host_is_rejected_before_any_session_is_opened() {
        let creds = SnmpCredentials::V2c {
            community: "public".into(),
        };
        let target = SnmpTarget {
            host: "127.0.0.1",
            port: 162,
            credentials: &creds,
            oid_prefix: "1.3.6.1.4.1.9999",
        };
        let err = send_trap(target, Mode::Prod, vec![]).await.unwrap_err();
        assert!(matches!(err, DeliveryError::SsrfBlocked(_)));
    }
}
