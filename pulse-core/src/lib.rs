//! Domain types, error taxonomy, and shared configuration for Pulse.
//!
//! This crate has no I/O: it is imported by every other Pulse crate and
//! binary as the common vocabulary for tenants, devices, rules, alerts,
//! integrations, and delivery jobs.

pub mod config;
pub mod domain;
pub mod error;
pub mod types;

pub use error::{IngestRejection, PulseError};
