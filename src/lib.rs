//! coursegate library crate.
//!
//! The binary in `main.rs` wires these modules into an axum server; the
//! integration tests in `tests/` drive them directly.

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod revocation;
pub mod store;

use auth::codec::TokenCodec;
use revocation::service::RevocationService;
use store::postgres::PgStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub db: PgStore,
    pub codec: Arc<TokenCodec>,
    pub revocations: RevocationService,
    pub config: config::Config,
}
