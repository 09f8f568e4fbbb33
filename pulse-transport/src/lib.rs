//! Outbound delivery for Pulse (`spec.md` §4.4).
//!
//! Every sender here is a pure function/struct operating on values the
//! caller (`pulse-delivery-worker::dispatch`) already loaded from the
//! database; nothing in this crate touches `sqlx`. The [`ssrf`] guard runs
//! ahead of every webhook, SMTP, and SNMP destination per the policy in
//! `spec.md` §4.4.

pub mod backoff;
pub mod email;
pub mod error;
pub mod mqtt;
pub mod snmp;
pub mod ssrf;
pub mod webhook;

pub use error::DeliveryError;
