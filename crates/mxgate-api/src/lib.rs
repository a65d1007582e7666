//! Data-plane API for mxgate
//!
//! REST endpoints for login, call control, contacts and monitoring info,
//! plus the SSE event stream. Everything runs against the session
//! published by the supervisor; handlers resolve it per request so a
//! reconnect or rebuild is picked up immediately.

pub mod dto;
pub mod handlers;

pub use handlers::configure;

use mxgate_pbx::{AuthCache, Supervisor};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared state of the data-plane application.
pub struct GatewayState {
    /// Owner of the live PBX session
    pub supervisor: Arc<Supervisor>,

    /// Short-TTL cache of verified user credentials
    pub auth_cache: AuthCache,

    /// Free-form parameters served at `GET /rules`
    pub params: HashMap<String, String>,
}
