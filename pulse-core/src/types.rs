//! Lightweight newtypes for the identifiers that thread through every
//! Pulse service. Wrapping bare `String`/`Uuid` values in distinct types
//! stops a `tenant_id` and a `device_id` from being swapped at a call site
//! by accident -- the compiler catches it instead of a production incident.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume `self`, returning the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(TenantId, "A tenant identifier -- the mandatory isolation predicate on every query.");
newtype_string!(DeviceId, "A device identifier, unique only within its tenant.");
newtype_string!(SiteId, "A site identifier, unique only within its tenant.");
newtype_string!(RuleId, "An alert-rule identifier, unique only within its tenant.");
newtype_string!(IntegrationId, "An integration identifier, unique only within its tenant.");
newtype_string!(RouteId, "An integration-route identifier, unique only within its tenant.");

macro_rules! newtype_uuid {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random (v4) identifier.
            #[must_use]
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing `Uuid`.
            #[must_use]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Return the inner `Uuid`.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

newtype_uuid!(AlertId, "Identifies one `fleet_alert` row.");
newtype_uuid!(JobId, "Identifies one `delivery_jobs` row.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_newtype_from_str_and_string() {
        let t = TenantId::from("acme");
        assert_eq!(t.as_str(), "acme");
        let t2 = TenantId::from("acme".to_string());
        assert_eq!(t, t2);
    }

    #[test]
    fn string_newtype_serde_roundtrip() {
        let d = DeviceId::new("dev-1");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"dev-1\"");
        let back: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn string_newtype_deref_and_display() {
        let s = SiteId::new("site-7");
        assert_eq!(&*s, "site-7");
        assert_eq!(format!("{s}"), "site-7");
    }

    #[test]
    fn uuid_newtype_roundtrip() {
        let id = AlertId::new_v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: AlertId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn distinct_newtypes_do_not_coerce() {
        // This is a compile-time property; the test documents intent.
        let tenant = TenantId::new("t1");
        let device = DeviceId::new("t1");
        assert_eq!(tenant.as_str(), device.as_str());
        // But `tenant == device` would not type-check -- that's the point.
    }
}
