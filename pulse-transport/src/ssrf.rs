//! SSRF guard for outbound delivery (`spec.md` §4.4, "SSRF policy"). Every
//! webhook, SMTP, and SNMP destination is checked before a connection is
//! attempted: scheme is enforced by mode, then -- in PROD only -- the
//! hostname is DNS-resolved and every returned address is checked against
//! the loopback/link-local/private/reserved ranges a delivery worker must
//! never be tricked into reaching.
//!
//! No teacher or example repo in the retrieval pack implements SSRF
//! protection anywhere in its core crates; this module is written directly
//! from the policy in `spec.md` §4.4 rather than adapted from an existing
//! file.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use hickory_resolver::TokioAsyncResolver;
use pulse_core::config::Mode;
use reqwest::Url;

use crate::error::DeliveryError;

/// Validate a webhook URL's scheme, then resolve and check its host.
pub async fn check_url(url: &Url, mode: Mode) -> Result<(), DeliveryError> {
    match (mode, url.scheme()) {
        (Mode::Prod, "https") | (Mode::Dev, "http" | "https") => {}
        (Mode::Prod, other) => {
            return Err(DeliveryError::SsrfBlocked(format!(
                "scheme {other} is not permitted in PROD mode"
            )));
        }
        (Mode::Dev, other) => {
            return Err(DeliveryError::SsrfBlocked(format!(
                "unsupported scheme {other}"
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| DeliveryError::SsrfBlocked("URL has no host".to_owned()))?;
    check_host(host, mode).await
}

/// Validate a bare hostname, used for SMTP and SNMP targets which carry no
/// URL scheme of their own (`spec.md` §4.4: "These checks also apply to
/// SMTP and SNMP hosts on equivalent terms").
pub async fn check_host(host: &str, mode: Mode) -> Result<(), DeliveryError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return reject_if_blocked(ip);
    }

    if mode != Mode::Prod {
        return Ok(());
    }

    let resolver = TokioAsyncResolver::tokio_from_system_conf()
        .map_err(|e| DeliveryError::Connection(format!("resolver init failed: {e}")))?;
    let response = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| DeliveryError::Connection(format!("DNS resolution failed: {e}")))?;

    for ip in response.iter() {
        reject_if_blocked(ip)?;
    }
    Ok(())
}

fn reject_if_blocked(ip: IpAddr) -> Result<(), DeliveryError> {
    if is_blocked(ip) {
        Err(DeliveryError::SsrfBlocked(format!("blocked_ip:{ip}")))
    } else {
        Ok(())
    }
}

/// `true` if `ip` falls in a range a delivery worker must never reach:
/// loopback, link-local, multicast, unspecified, RFC1918 private, CGNAT
/// (`100.64.0.0/10`), IPv6 unique-local/site-local, or the cloud metadata
/// address `169.254.169.254`.
#[must_use]
pub fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_private()
        || ip.is_broadcast()
        || is_cgnat(ip)
}

/// `100.64.0.0/10`, the carrier-grade NAT range.
fn is_cgnat(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 100 && (64..=127).contains(&b)
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    let segments = ip.segments();
    is_unique_local(segments) || is_link_local6(segments) || is_deprecated_site_local(segments)
}

/// `fc00::/7`.
fn is_unique_local(segments: [u16; 8]) -> bool {
    segments[0] & 0xfe00 == 0xfc00
}

/// `fe80::/10`.
fn is_link_local6(segments: [u16; 8]) -> bool {
    segments[0] & 0xffc0 == 0xfe80
}

/// `fec0::/10`, the deprecated IPv6 site-local range (`spec.md` §4.4 calls
/// this out by name alongside RFC1918).
fn is_deprecated_site_local(segments: [u16; 8]) -> bool {
    segments[0] & 0xffc0 == 0xfec0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_v4_is_allowed() {
        assert!(!is_blocked(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))));
    }

    #[test]
    fn loopback_is_blocked() {
        assert!(is_blocked(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_blocked(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn cloud_metadata_address_is_blocked() {
        assert!(is_blocked(IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254))));
    }

    #[test]
    fn rfc1918_ranges_are_blocked() {
        assert!(is_blocked(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(is_blocked(IpAddr::V4(Ipv4Addr::new(172, 16, 5, 5))));
        assert!(is_blocked(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
    }

    #[test]
    fn cgnat_range_is_blocked() {
        assert!(is_blocked(IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1))));
        assert!(is_blocked(IpAddr::V4(Ipv4Addr::new(100, 100, 0, 1))));
        assert!(!is_blocked(IpAddr::V4(Ipv4Addr::new(100, 63, 0, 1))));
        assert!(!is_blocked(IpAddr::V4(Ipv4Addr::new(100, 128, 0, 1))));
    }

    #[test]
    fn ipv6_unique_local_and_link_local_are_blocked() {
        assert!(is_blocked(IpAddr::V6("fc00::1".parse().unwrap())));
        assert!(is_blocked(IpAddr::V6("fe80::1".parse().unwrap())));
    }

    #[test]
    fn ipv4_mapped_ipv6_is_checked_against_v4_rules() {
        let mapped: Ipv6Addr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(is_blocked(IpAddr::V6(mapped)));
    }

    #[tokio::test]
    async fn dev_mode_skips_resolution_for_plain_hostnames() {
        // DEV mode never resolves, so an unresolvable hostname does not error.
        assert!(check_host("definitely-not-a-real-host.invalid", Mode::Dev)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn literal_loopback_ip_is_rejected_regardless_of_mode() {
        assert!(check_host("127.0.0.1", Mode::Dev).await.is_err());
        assert!(check_host("127.0.0.1", Mode::Prod).await.is_err());
    }

    #[tokio::test]
    async fn http_scheme_rejected_in_prod() {
        let url = Url::parse("http://example.com/hook").unwrap();
        assert!(check_url(&url, Mode::Prod).await.is_err());
    }

    #[tokio::test]
    async fn https_literal_private_ip_rejected_in_prod() {
        let url = Url::parse("https://10.0.0.5/hook").unwrap();
        assert!(check_url(&url, Mode::Prod).await.is_err());
    }
}
