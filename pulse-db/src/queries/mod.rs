//! One module per table family, each exposing the query/command shapes
//! the services need. All queries take `&PgPool` or `&mut PgConnection`
//! and return `sqlx::Result<T>`; callers at the service layer convert with
//! [`crate::error::map_sqlx`].

pub mod alerts;
pub mod device_state;
pub mod digest;
pub mod integrations;
pub mod jobs;
pub mod maintenance;
pub mod registry;
pub mod rules;
pub mod settings;
pub mod telemetry;
