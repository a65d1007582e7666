//! Short-TTL cache of verified PBX credentials
//!
//! Avoids opening an ephemeral PBX bind for every login of the same user.
//! Entries are not evicted proactively; readers enforce the TTL.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a verified password stays valid without re-checking.
pub const AUTH_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

struct CacheItem {
    password: String,
    ext: String,
    inserted_at: Instant,
}

/// Mapping `login -> (password, extension, inserted_at)`.
#[derive(Clone, Default)]
pub struct AuthCache {
    inner: Arc<RwLock<HashMap<String, CacheItem>>>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached extension when the entry exists, the password
    /// matches exactly and the entry is not stale.
    pub fn check(&self, login: &str, password: &str) -> Option<String> {
        let map = self.inner.read().expect("auth cache lock");
        let item = map.get(login)?;
        if item.password != password || item.inserted_at.elapsed() > AUTH_CACHE_TTL {
            return None;
        }
        debug!(login = %login, "user login found in cache");
        Some(item.ext.clone())
    }

    /// Upsert a verified credential.
    pub fn add(&self, login: &str, password: &str, ext: &str) {
        let mut map = self.inner.write().expect("auth cache lock");
        if !map.contains_key(login) {
            debug!(login = %login, "adding user login to cache");
        }
        map.insert(
            login.to_string(),
            CacheItem {
                password: password.to_string(),
                ext: ext.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }
}
