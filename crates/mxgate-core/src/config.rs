//! Persisted gateway configuration
//!
//! One JSON document on disk holds everything the admin surface can edit:
//! admin credentials, the data-plane bind host, the log level and the PBX
//! connection settings. The document is rewritten atomically on change and
//! the running process derives state from it by rebuilding the data plane,
//! never by patching in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::GatewayError;
use crate::GatewayResult;

/// Admin surface credentials. The password is an Argon2 PHC hash, never
/// plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub login: String,

    #[serde(default)]
    pub password: String,
}

/// Data-plane HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Bind host for the data-plane server, `host[:port]`.
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub log_level: LogLevel,
}

/// PBX connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MxConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub login: String,

    #[serde(default)]
    pub password: String,
}

/// Log verbosity selector exposed on the admin form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    All,
    #[default]
    Info,
    Error,
}

impl LogLevel {
    /// Tracing filter directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::All => "trace",
            LogLevel::Info => "info",
            LogLevel::Error => "warn",
        }
    }

    /// Parse the admin form value; unknown values are rejected.
    pub fn from_form(value: &str) -> Option<Self> {
        match value {
            "ALL" => Some(LogLevel::All),
            "INFO" => Some(LogLevel::Info),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// The persisted configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub mx: MxConfig,

    /// Free-form parameters served to clients at `GET /rules`.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Config {
    /// Fill required defaults after loading.
    fn apply_defaults(&mut self) {
        if self.admin.login.is_empty() {
            self.admin.login = "Administrator".to_string();
        }
        if self.server.host.is_empty() {
            self.server.host = "localhost:8080".to_string();
        }
        if self.params.is_empty() {
            self.params
                .insert("phoneCountry".to_string(), "EE".to_string());
        }
    }

    /// True when all PBX settings needed for a session are present.
    pub fn mx_configured(&self) -> bool {
        !self.mx.host.is_empty() && !self.mx.login.is_empty() && !self.mx.password.is_empty()
    }

    /// Public base URL of the data-plane server, derived from the bind
    /// host. Default ports are elided.
    pub fn server_url(&self) -> String {
        let (host, port) = match self.server.host.rsplit_once(':') {
            Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
            _ => (self.server.host.as_str(), None),
        };
        let host = if host.is_empty() { "localhost" } else { host };
        match port {
            Some("80") | Some("http") | None => format!("http://{}", host),
            Some(port) => format!("http://{}:{}", host, port),
        }
    }

    /// Port the data plane binds to, defaulting to 80.
    pub fn bind_addr(&self) -> String {
        if self.server.host.rsplit_once(':').is_some_and(|(_, p)| {
            !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())
        }) {
            self.server.host.clone()
        } else {
            format!("{}:80", self.server.host)
        }
    }
}

/// Shared handle to the configuration document.
///
/// Readers take a cheap snapshot; writers mutate under the lock and
/// persist atomically before releasing it. The handle also publishes the
/// last data-plane build error for the admin form.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    config: RwLock<Config>,
    last_error: RwLock<Option<String>>,
}

impl ConfigStore {
    /// Load the document from `path`, filling defaults. A missing file is
    /// not an error; a malformed one is.
    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = match fs::read(&path) {
            Ok(data) => serde_json::from_slice::<Config>(&data)
                .map_err(|e| GatewayError::Config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(GatewayError::Config(format!("{}: {}", path.display(), e)));
            }
        };
        config.apply_defaults();

        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                config: RwLock::new(config),
                last_error: RwLock::new(None),
            }),
        })
    }

    /// Clone of the current document.
    pub fn snapshot(&self) -> Config {
        self.inner.config.read().expect("config lock").clone()
    }

    /// Mutate the document and persist it atomically (temp file + rename).
    pub fn update(&self, f: impl FnOnce(&mut Config)) -> GatewayResult<()> {
        let mut guard = self.inner.config.write().expect("config lock");
        f(&mut guard);
        let data = serde_json::to_vec_pretty(&*guard)?;
        drop(guard);

        let tmp = self.inner.path.with_extension("tmp");
        fs::write(&tmp, data)
            .and_then(|()| fs::rename(&tmp, &self.inner.path))
            .map_err(|e| {
                GatewayError::Config(format!("save {}: {}", self.inner.path.display(), e))
            })
    }

    /// Record the outcome of the last data-plane build.
    pub fn set_last_error(&self, err: Option<String>) {
        *self.inner.last_error.write().expect("config lock") = err;
    }

    /// Last data-plane build error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().expect("config lock").clone()
    }
}
