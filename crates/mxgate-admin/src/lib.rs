//! Admin surface and data-plane lifecycle for mxgate
//!
//! An independent HTTP application that edits the persisted configuration
//! document, serves the rewritten client manifest bundle and rebuilds the
//! data plane whenever PBX or bind settings change.

pub mod admin;
pub mod manifest;
pub mod proxy;

pub use admin::{configure, rebuild, AdminState, LogLevelHandle};
pub use proxy::Proxy;
