//! JWT Claims structure
//!
//! Claims carried by the bearer tokens issued to PBX users.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// JWT Claims
///
/// Self-contained: every request handler reads the user's extension from
/// here, there is no server-side session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (the user's PBX login)
    pub sub: String,

    /// The user's extension
    pub ext: String,

    /// Serial of the PBX that authenticated the user
    pub mx: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims for an authenticated user.
    ///
    /// The expiration is left at zero and set by the issuing
    /// [`JwtService`](crate::JwtService).
    pub fn new(login: &str, ext: &str, mx: &str) -> Self {
        Self {
            sub: login.to_string(),
            ext: ext.to_string(),
            mx: mx.to_string(),
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    /// Create claims with an explicit expiration offset in seconds.
    pub fn with_expiration(login: &str, ext: &str, mx: &str, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: login.to_string(),
            ext: ext.to_string(),
            mx: mx.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }
}
