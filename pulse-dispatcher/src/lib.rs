pub mod config;
pub mod escalation_pass;
pub mod payload;
pub mod primary_pass;
pub mod route_match;
