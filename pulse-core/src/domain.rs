//! Domain entities and enums for the Pulse data model (spec §3).
//!
//! These types carry no I/O: `pulse-db` maps them to and from rows, and
//! `pulse-rules` / `pulse-transport` operate on them in memory. Where the
//! original system used a polymorphic JSON blob (rule `conditions`,
//! integration `config`), this module models the tagged union directly
//! (`RuleSpec`, `IntegrationSpec`) per the Design Note in spec §9 --
//! untyped JSON is permitted only at the `pulse-db` column boundary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AlertId, DeviceId, IntegrationId, JobId, RouteId, RuleId, SiteId, TenantId};

// ---------------------------------------------------------------------
// Device registry & state
// ---------------------------------------------------------------------

/// Status of a device in the tenant's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegistryStatus {
    Active,
    Revoked,
    Deleted,
}

/// A registered device and its shared-secret credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistryEntry {
    pub tenant_id: TenantId,
    pub device_id: DeviceId,
    pub site_id: SiteId,
    pub status: RegistryStatus,
    /// SHA-256 hex digest of the device's shared secret.
    pub provision_token_hash: Option<String>,
    pub metadata: serde_json::Value,
}

/// Kind of inbound message on the device topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    Telemetry,
    Heartbeat,
}

/// One append-only telemetry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub time: DateTime<Utc>,
    pub tenant_id: TenantId,
    pub device_id: DeviceId,
    pub site_id: SiteId,
    pub msg_type: MsgType,
    pub seq: i64,
    pub metrics: HashMap<String, f64>,
}

/// Liveness classification for a device (spec §4.2 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceLiveness {
    Online,
    Stale,
    Offline,
}

/// Materialized current-state row for one device, maintained only by the
/// evaluator (or a shadow/command API outside this core).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub tenant_id: TenantId,
    pub device_id: DeviceId,
    pub status: DeviceLiveness,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_telemetry_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_state_change_at: Option<DateTime<Utc>>,
    pub latest_metrics: HashMap<String, f64>,
    pub desired_state: Option<serde_json::Value>,
    pub reported_state: Option<serde_json::Value>,
    pub desired_version: i64,
    pub reported_version: i64,
    pub shadow_updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------

/// Comparison operator used by threshold and window rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl Operator {
    /// Evaluate `value <op> threshold`.
    #[must_use]
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            // Float equality uses an epsilon to avoid surprising misses on
            // values that arrive via a lossy wire encoding.
            Self::Eq => (value - threshold).abs() < f64::EPSILON,
            Self::Ne => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

/// How multiple conditions in a threshold rule combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    All,
    Any,
}

/// Aggregation function for a sliding-window rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Count,
    Sum,
}

impl Aggregation {
    /// Apply this aggregation to a non-empty slice of samples.
    ///
    /// Returns `None` for an empty slice (callers must enforce the
    /// "at least 2 samples" rule themselves; this only guards div-by-zero).
    #[must_use]
    pub fn apply(self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        Some(match self {
            Self::Avg => samples.iter().sum::<f64>() / samples.len() as f64,
            Self::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => samples.len() as f64,
            Self::Sum => samples.iter().sum(),
        })
    }
}

/// One condition within a threshold rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub metric_name: String,
    pub operator: Operator,
    pub threshold: f64,
    /// Overrides the rule-level `duration_seconds` for this condition when
    /// set. Per spec §9, a per-condition `duration_minutes` always takes
    /// precedence over the rule-level `duration_seconds`.
    pub duration_minutes: Option<i64>,
}

/// The type-specific body of an [`AlertRule`], replacing the source's
/// polymorphic `conditions` dict with a tagged union (spec §9 Design Note).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum RuleSpec {
    Threshold {
        conditions: Vec<Condition>,
        match_mode: MatchMode,
        /// Applies to conditions that don't set their own `duration_minutes`.
        duration_seconds: Option<i64>,
    },
    Window {
        metric_name: String,
        aggregation: Aggregation,
        window_seconds: i64,
        operator: Operator,
        threshold: f64,
    },
    Anomaly {
        metric_name: String,
        window_minutes: i64,
        min_samples: u32,
        z_threshold: f64,
    },
    TelemetryGap {
        metric_name: Option<String>,
        gap_minutes: i64,
    },
}

/// A tenant-defined alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub tenant_id: TenantId,
    pub rule_id: RuleId,
    pub enabled: bool,
    /// Severity 1-5; lower is worse.
    pub severity: u8,
    pub site_ids: Vec<SiteId>,
    pub group_ids: Vec<String>,
    pub spec: RuleSpec,
    pub escalation_minutes: Option<i64>,
}

// ---------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------

/// The kind of condition that produced a [`FleetAlert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertType {
    NoHeartbeat,
    Threshold,
    Window,
    Anomaly,
    NoTelemetry,
}

/// Lifecycle status of a [`FleetAlert`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Closed,
}

/// One alert instance, deduplicated by `(tenant_id, fingerprint)` while
/// `status` is `Open` or `Acknowledged` (spec §3 uniqueness invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetAlert {
    pub id: AlertId,
    pub tenant_id: TenantId,
    pub site_id: SiteId,
    pub device_id: DeviceId,
    pub alert_type: AlertType,
    pub fingerprint: String,
    pub status: AlertStatus,
    pub severity: u8,
    pub confidence: f64,
    pub summary: String,
    pub details: serde_json::Value,
    pub rule_id: Option<RuleId>,
    pub trigger_count: i64,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub silenced_until: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub escalation_level: i32,
    pub escalated_at: Option<DateTime<Utc>>,
}

impl FleetAlert {
    /// Fingerprint for a missed-heartbeat alert.
    #[must_use]
    pub fn heartbeat_fingerprint(device_id: &DeviceId) -> String {
        format!("NO_HEARTBEAT:{device_id}")
    }

    /// Fingerprint for a rule-driven alert on a device.
    #[must_use]
    pub fn rule_fingerprint(rule_id: &RuleId, device_id: &DeviceId) -> String {
        format!("RULE:{rule_id}:{device_id}")
    }

    /// `true` if this alert is suppressed by an active silence window.
    #[must_use]
    pub fn is_silenced(&self, now: DateTime<Utc>) -> bool {
        self.silenced_until.is_some_and(|until| until > now)
    }
}

// ---------------------------------------------------------------------
// Integrations & routes
// ---------------------------------------------------------------------

/// SNMP security configuration (v2c community string or v3 USM credentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum SnmpCredentials {
    V2c { community: String },
    V3 { user: String, auth_key: String, priv_key: String },
}

/// The type-specific body of an [`Integration`], replacing the source's
/// polymorphic `config` blob with a tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IntegrationSpec {
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Snmp {
        host: String,
        #[serde(default = "default_snmp_port")]
        port: u16,
        credentials: SnmpCredentials,
        oid_prefix: String,
    },
    Email {
        smtp_host: String,
        #[serde(default = "default_smtp_port")]
        smtp_port: u16,
        #[serde(default)]
        tls: bool,
        username: Option<String>,
        password: Option<String>,
        from_address: String,
        to_address: String,
    },
    Mqtt {
        broker_url: String,
        topic_template: String,
        #[serde(default)]
        qos: u8,
        #[serde(default)]
        retain: bool,
    },
}

fn default_snmp_port() -> u16 {
    162
}

fn default_smtp_port() -> u16 {
    587
}

/// A tenant-configured external delivery sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub tenant_id: TenantId,
    pub integration_id: IntegrationId,
    pub enabled: bool,
    pub spec: IntegrationSpec,
}

/// An event on which a route may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliverOnEvent {
    Open,
    Closed,
}

/// A filter expression joining alerts to an integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRoute {
    pub tenant_id: TenantId,
    pub route_id: RouteId,
    pub integration_id: IntegrationId,
    pub enabled: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub min_severity: Option<u8>,
    pub alert_types: Vec<AlertType>,
    pub site_ids: Vec<SiteId>,
    pub device_prefixes: Vec<String>,
    pub deliver_on: Vec<DeliverOnEvent>,
}

// ---------------------------------------------------------------------
// Delivery jobs & attempts
// ---------------------------------------------------------------------

/// Lifecycle status of a [`DeliveryJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One leased unit of delivery work: one alert event x one route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub alert_id: AlertId,
    pub integration_id: IntegrationId,
    pub route_id: RouteId,
    pub deliver_on_event: DeliverOnEvent,
    pub status: JobStatus,
    pub attempts: i32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable log of one delivery attempt against a [`DeliveryJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub job_id: JobId,
    pub attempt_no: i32,
    pub ok: bool,
    pub http_status: Option<i32>,
    pub latency_ms: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The payload shape handed to every delivery transport (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub alert_id: AlertId,
    pub site_id: SiteId,
    pub device_id: DeviceId,
    pub alert_type: AlertType,
    pub severity: u8,
    pub confidence: f64,
    pub summary: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<i32>,
}

// ---------------------------------------------------------------------
// Maintenance windows, silence, digest, metric mappings
// ---------------------------------------------------------------------

/// A time-bounded or recurring policy that suppresses new alert openings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub tenant_id: TenantId,
    pub enabled: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    /// For recurring windows: 0 (Sunday) - 6 (Saturday).
    pub recurring_days_of_week: Option<Vec<u8>>,
    /// For recurring windows: inclusive hour range in `[0, 24)`.
    pub recurring_hour_range: Option<(u8, u8)>,
    pub site_ids: Vec<SiteId>,
    pub device_types: Vec<String>,
}

/// A raw-to-normalized linear transform for one metric name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricMapping {
    pub tenant_id: TenantId,
    pub raw_metric_name: String,
    pub normalized_metric_name: String,
    pub multiplier: f64,
    pub offset: f64,
}

impl MetricMapping {
    /// Apply `raw * multiplier + offset`.
    #[must_use]
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.multiplier + self.offset
    }
}

/// Tenant-scoped digest mailer preferences. Carried as a first-class row
/// (see SPEC_FULL.md §3) even though the digest mailer itself is out of
/// scope for the core pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDigestSettings {
    pub tenant_id: TenantId,
    pub enabled: bool,
    pub cadence_minutes: i64,
    pub recipient: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_gt_lt_boundaries() {
        // LT with value == threshold does not fire; LTE does (spec §8).
        assert!(!Operator::Lt.compare(40.0, 40.0));
        assert!(Operator::Lte.compare(40.0, 40.0));
        assert!(Operator::Gt.compare(41.0, 40.0));
        assert!(!Operator::Gt.compare(40.0, 40.0));
        assert!(Operator::Gte.compare(40.0, 40.0));
    }

    #[test]
    fn operator_eq_ne() {
        assert!(Operator::Eq.compare(5.0, 5.0));
        assert!(!Operator::Eq.compare(5.0, 5.0001));
        assert!(Operator::Ne.compare(5.0, 6.0));
    }

    #[test]
    fn aggregation_empty_returns_none() {
        assert_eq!(Aggregation::Avg.apply(&[]), None);
    }

    #[test]
    fn aggregation_basic() {
        let samples = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(Aggregation::Sum.apply(&samples), Some(10.0));
        assert_eq!(Aggregation::Avg.apply(&samples), Some(2.5));
        assert_eq!(Aggregation::Min.apply(&samples), Some(1.0));
        assert_eq!(Aggregation::Max.apply(&samples), Some(4.0));
        assert_eq!(Aggregation::Count.apply(&samples), Some(4.0));
    }

    #[test]
    fn fingerprint_formulas() {
        let device = DeviceId::new("dev-1");
        let rule = RuleId::new("rule-1");
        assert_eq!(FleetAlert::heartbeat_fingerprint(&device), "NO_HEARTBEAT:dev-1");
        assert_eq!(
            FleetAlert::rule_fingerprint(&rule, &device),
            "RULE:rule-1:dev-1"
        );
    }

    #[test]
    fn metric_mapping_linear_transform() {
        let mapping = MetricMapping {
            tenant_id: TenantId::new("t1"),
            raw_metric_name: "temp_raw".into(),
            normalized_metric_name: "temp_c".into(),
            multiplier: 0.1,
            offset: -40.0,
        };
        assert!((mapping.apply(500.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rule_spec_serde_tag() {
        let spec = RuleSpec::Threshold {
            conditions: vec![Condition {
                metric_name: "temp_c".into(),
                operator: Operator::Gt,
                threshold: 40.0,
                duration_minutes: None,
            }],
            match_mode: MatchMode::All,
            duration_seconds: None,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["rule_type"], "threshold");
        let back: RuleSpec = serde_json::from_value(json).unwrap();
        assert!(matches!(back, RuleSpec::Threshold { .. }));
    }

    #[test]
    fn integration_spec_serde_tag() {
        let spec = IntegrationSpec::Webhook {
            url: "https://example.com/hook".into(),
            headers: HashMap::new(),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "webhook");
    }

    #[test]
    fn alert_silenced_only_while_in_future() {
        let mut alert = sample_alert();
        alert.silenced_until = Some(Utc::now() - chrono::Duration::seconds(5));
        assert!(!alert.is_silenced(Utc::now()));
        alert.silenced_until = Some(Utc::now() + chrono::Duration::seconds(5));
        assert!(alert.is_silenced(Utc::now()));
    }

    fn sample_alert() -> FleetAlert {
        FleetAlert {
            id: AlertId::new_v4(),
            tenant_id: TenantId::new("t1"),
            site_id: SiteId::new("site-1"),
            device_id: DeviceId::new("dev-1"),
            alert_type: AlertType::Threshold,
            fingerprint: "RULE:rule-1:dev-1".into(),
            status: AlertStatus::Open,
            severity: 3,
            confidence: 0.9,
            summary: "temp high".into(),
            details: serde_json::json!({}),
            rule_id: Some(RuleId::new("rule-1")),
            trigger_count: 1,
            created_at: Utc::now(),
            closed_at: None,
            silenced_until: None,
            acknowledged_by: None,
            acknowledged_at: None,
            escalation_level: 0,
            escalated_at: None,
        }
    }
}
