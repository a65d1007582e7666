//! JWT token creation and validation service
//!
//! Bearer tokens are signed with an HS256 key generated at process start;
//! they are self-contained and do not survive a gateway restart.

use crate::claims::Claims;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mxgate_core::GatewayError;
use rand_core::{OsRng, RngCore};
use tracing::{debug, warn};

/// Default token lifetime in seconds (one hour).
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// JWT service for token creation and validation.
#[derive(Clone)]
pub struct JwtService {
    expiration_secs: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    /// Create a new JWT service over the given signing key.
    pub fn new(secret: &[u8], expiration_secs: i64) -> Self {
        Self {
            expiration_secs,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Create a service with a fresh random 64-byte key and the default
    /// one-hour lifetime.
    pub fn with_random_key() -> Self {
        let mut secret = [0u8; 64];
        OsRng.fill_bytes(&mut secret);
        Self::new(&secret, DEFAULT_TOKEN_TTL_SECS)
    }

    /// Issue a token for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if encoding fails.
    pub fn issue(&self, login: &str, ext: &str, mx: &str) -> Result<String, GatewayError> {
        let claims =
            Claims::with_expiration(login, ext, mx, self.expiration_secs);

        debug!(login = %claims.sub, ext = %claims.ext, "issuing token");

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::Internal(format!("token creation failed: {}", e)))
    }

    /// Validate a token and extract its claims.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidToken` for any verification failure,
    /// including expiration; the HTTP boundary maps it to 403.
    pub fn verify(&self, token: &str) -> Result<Claims, GatewayError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| {
                warn!(error = %e, "token validation failed");
                GatewayError::InvalidToken(e.to_string())
            })?;

        debug!(login = %data.claims.sub, ext = %data.claims.ext, "token validated");
        Ok(data.claims)
    }

    /// Token lifetime in seconds, reported to clients as `expires_in`.
    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("expiration_secs", &self.expiration_secs)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
