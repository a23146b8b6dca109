pub mod auth_gate;
pub mod http;
pub mod metrics;
