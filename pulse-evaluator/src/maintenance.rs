//! Maintenance-window matching (`spec.md` §4.2): suppresses new alert
//! openings for devices in-scope, but never blocks closing an alert whose
//! triggering condition has stopped.
//!
//! [`pulse_db::queries::maintenance::active_windows`] already filters to
//! windows whose absolute `starts_at`/`ends_at` bounds hold; this module
//! applies the recurring day-of-week/hour-range and site/device-type scope
//! on top, since those depend on `now` in the tenant's evaluation context.

use chrono::{DateTime, Datelike, Timelike, Utc};

use pulse_core::domain::MaintenanceWindow;
use pulse_core::types::SiteId;

/// `true` if `window` currently suppresses new alerts for this device.
#[must_use]
pub fn window_applies(
    window: &MaintenanceWindow,
    site_id: &SiteId,
    device_type: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    if !window.site_ids.is_empty() && !window.site_ids.contains(site_id) {
        return false;
    }
    if !window.device_types.is_empty() {
        match device_type {
            Some(dt) if window.device_types.iter().any(|t| t == dt) => {}
            _ => return false,
        }
    }
    if let Some(days) = &window.recurring_days_of_week {
        let today = now.weekday().num_days_from_sunday() as u8;
        if !days.contains(&today) {
            return false;
        }
    }
    if let Some((start, end)) = window.recurring_hour_range {
        let hour = now.hour() as u8;
        let in_range = if start <= end {
            hour >= start && hour <= end
        } else {
            // wraps past midnight, e.g. 22-6
            hour >= start || hour <= end
        };
        if !in_range {
            return false;
        }
    }
    true
}

/// `true` if any active window suppresses new alerts for this device.
#[must_use]
pub fn in_maintenance(
    windows: &[MaintenanceWindow],
    site_id: &SiteId,
    device_type: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    windows
        .iter()
        .any(|w| window_applies(w, site_id, device_type, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::types::TenantId;

    fn base_window() -> MaintenanceWindow {
        MaintenanceWindow {
            tenant_id: TenantId::new("t1"),
            enabled: true,
            starts_at: DateTime::from_timestamp(0, 0).unwrap(),
            ends_at: None,
            recurring_days_of_week: None,
            recurring_hour_range: None,
            site_ids: vec![],
            device_types: vec![],
        }
    }

    #[test]
    fn unscoped_window_applies_everywhere() {
        let window = base_window();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(window_applies(&window, &SiteId::new("site-1"), None, now));
    }

    #[test]
    fn site_scope_excludes_other_sites() {
        let mut window = base_window();
        window.site_ids = vec![SiteId::new("site-1")];
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(!window_applies(&window, &SiteId::new("site-2"), None, now));
        assert!(window_applies(&window, &SiteId::new("site-1"), None, now));
    }

    #[test]
    fn hour_range_wraps_past_midnight() {
        let mut window = base_window();
        window.recurring_hour_range = Some((22, 6));
        // 23:00 UTC on an arbitrary day.
        let late = DateTime::from_timestamp(1_700_002_800, 0).unwrap();
        assert_eq!(late.hour(), 23);
        assert!(window_applies(&window, &SiteId::new("site-1"), None, late));
    }

    #[test]
    fn device_type_scope_requires_a_match() {
        let mut window = base_window();
        window.device_types = vec!["sensor".into()];
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(!window_applies(&window, &SiteId::new("site-1"), Some("gateway"), now));
        assert!(window_applies(&window, &SiteId::new("site-1"), Some("sensor"), now));
        assert!(!window_applies(&window, &SiteId::new("site-1"), None, now));
    }
}
