//! Process-local window-rule state (`spec.md` §4.2, §9 Design Note).
//!
//! Each `(tenant_id, device_id, rule_id)` triple owns one [`WindowBuffer`].
//! `device_id` and `rule_id` are tenant-scoped identifiers (`spec.md` §3),
//! so the tenant must be part of the key -- otherwise two tenants that
//! happen to name a device and rule the same way would share sliding-window
//! state, the same tenant-isolation hazard the auth cache guards against in
//! `pulse-ingest::auth_cache`. Buffers are not persisted: after a restart
//! they re-warm from live telemetry as new samples arrive, so a window rule
//! may under-fire for up to its `window_seconds` span immediately after a
//! redeploy. Acceptable per the resolved Open Question in `spec.md` §9 --
//! not a bug.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use pulse_core::types::{DeviceId, RuleId, TenantId};
use pulse_rules::WindowBuffer;

type Key = (TenantId, DeviceId, RuleId);

#[derive(Default)]
pub struct WindowRuntime {
    buffers: Mutex<HashMap<Key, WindowBuffer>>,
}

impl WindowRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a fresh sample into the buffer for `(tenant_id, device_id,
    /// rule_id)`, evicting anything older than `window_seconds`, then
    /// evaluate it.
    #[allow(clippy::too_many_arguments)]
    pub fn push_and_evaluate(
        &self,
        tenant_id: &TenantId,
        device_id: &DeviceId,
        rule_id: &RuleId,
        now: DateTime<Utc>,
        value: f64,
        window_seconds: i64,
        aggregation: pulse_core::domain::Aggregation,
        operator: pulse_core::domain::Operator,
        threshold: f64,
    ) -> Option<bool> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .entry((tenant_id.clone(), device_id.clone(), rule_id.clone()))
            .or_default();
        buffer.push_and_evict(now, value, window_seconds);
        buffer.evaluate(aggregation, operator, threshold)
    }

    /// Drop buffers for tenant/device pairs no longer in the registry,
    /// bounding memory use as tenants and devices are deleted.
    pub fn retain_devices(&self, live: &std::collections::HashSet<(TenantId, DeviceId)>) {
        self.buffers
            .lock()
            .retain(|(tenant_id, device_id, _), _| live.contains(&(tenant_id.clone(), device_id.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::domain::{Aggregation, Operator};

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn separate_device_keys_do_not_share_a_buffer() {
        let runtime = WindowRuntime::new();
        let tenant = TenantId::new("t1");
        let device_a = DeviceId::new("dev-a");
        let device_b = DeviceId::new("dev-b");
        let rule = RuleId::new("rule-1");

        runtime.push_and_evaluate(&tenant, &device_a, &rule, t(0), 100.0, 300, Aggregation::Avg, Operator::Gt, 1.0);
        let result =
            runtime.push_and_evaluate(&tenant, &device_b, &rule, t(0), 5.0, 300, Aggregation::Avg, Operator::Gt, 40.0);
        // dev-b has only one sample, below MIN_SAMPLES -- no verdict yet.
        assert_eq!(result, None);
    }

    #[test]
    fn same_device_and_rule_ids_do_not_cross_tenants() {
        let runtime = WindowRuntime::new();
        let tenant_a = TenantId::new("tenant-a");
        let tenant_b = TenantId::new("tenant-b");
        let device = DeviceId::new("dev-1");
        let rule = RuleId::new("rule-1");

        // tenant-a's buffer fills to a firing verdict...
        runtime.push_and_evaluate(&tenant_a, &device, &rule, t(0), 50.0, 300, Aggregation::Avg, Operator::Gt, 40.0);
        runtime.push_and_evaluate(&tenant_a, &device, &rule, t(10), 55.0, 300, Aggregation::Avg, Operator::Gt, 40.0);

        // ...but tenant-b, despite an identical (device_id, rule_id) pair,
        // starts from an empty buffer of its own.
        let result = runtime.push_and_evaluate(
            &tenant_b, &device, &rule, t(20), 55.0, 300, Aggregation::Avg, Operator::Gt, 40.0,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn accumulates_across_calls() {
        let runtime = WindowRuntime::new();
        let tenant = TenantId::new("t1");
        let device = DeviceId::new("dev-1");
        let rule = RuleId::new("rule-1");

        runtime.push_and_evaluate(&tenant, &device, &rule, t(0), 50.0, 300, Aggregation::Avg, Operator::Gt, 40.0);
        let result =
            runtime.push_and_evaluate(&tenant, &device, &rule, t(10), 55.0, 300, Aggregation::Avg, Operator::Gt, 40.0);
        assert_eq!(result, Some(true));
    }
}
