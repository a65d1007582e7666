//! mxgate Core Library
//!
//! Foundational pieces shared by every mxgate crate:
//!
//! - Unified error handling with HTTP response mapping
//! - The persisted configuration document and its shared store

pub mod config;
pub mod error;

pub use config::{Config, ConfigStore, LogLevel};
pub use error::GatewayError;

/// Result type alias using GatewayError
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Realm reported in `WWW-Authenticate` challenges.
pub const REALM: &str = "mxgate";
