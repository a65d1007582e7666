//! Session supervisor
//!
//! Holds the one live PBX session and keeps it alive: a dedicated task
//! waits for transport termination, tears the dead session down and
//! reinstalls with the same credentials after a fixed backoff. The
//! published handle is swapped atomically; readers that already hold the
//! old session keep using it until they release their reference.

use crate::session::{LoginInfo, PbxSession};
use crate::transport;
use mxgate_core::{GatewayError, GatewayResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{error, info};

/// Fixed backoff between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(60);

type FatalHandler = Box<dyn Fn(String) + Send + Sync>;

/// Owner of the live PBX session.
pub struct Supervisor {
    host: String,
    login: String,
    password: String,
    reconnect_delay: Duration,
    read_timeout: Duration,
    current: RwLock<Arc<PbxSession>>,
    stopped: AtomicBool,
    fatal: Mutex<Option<FatalHandler>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("host", &self.host)
            .field("login", &self.login)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("read_timeout", &self.read_timeout)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Install the initial session and spawn the reconnect task.
    /// Fails if the first install fails; later failures are retried by
    /// the task.
    pub async fn start(host: &str, login: &str, password: &str) -> GatewayResult<Arc<Self>> {
        Self::start_with(host, login, password, RECONNECT_DELAY, transport::READ_TIMEOUT).await
    }

    /// As [`start`](Self::start) with explicit timing, for tests.
    pub async fn start_with(
        host: &str,
        login: &str,
        password: &str,
        reconnect_delay: Duration,
        read_timeout: Duration,
    ) -> GatewayResult<Arc<Self>> {
        let session = PbxSession::install_with(host, login, password, read_timeout).await?;
        let supervisor = Arc::new(Self {
            host: host.to_string(),
            login: login.to_string(),
            password: password.to_string(),
            reconnect_delay,
            read_timeout,
            current: RwLock::new(session),
            stopped: AtomicBool::new(false),
            fatal: Mutex::new(None),
        });

        tokio::spawn(reconnect_loop(Arc::clone(&supervisor)));
        Ok(supervisor)
    }

    /// Shared reference to the installed session; cheap.
    pub fn current(&self) -> Arc<PbxSession> {
        Arc::clone(&self.current.read().expect("session lock"))
    }

    /// Verify end-user credentials against the same PBX over an ephemeral
    /// bind.
    pub async fn verify_user(&self, login: &str, password: &str) -> GatewayResult<LoginInfo> {
        PbxSession::verify_user(&self.host, login, password).await
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Install a handler invoked with the reason when reconnection is
    /// abandoned for good, so the failure can be surfaced outside the
    /// supervisor task.
    pub fn on_fatal(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        *self.fatal.lock().expect("fatal lock") = Some(Box::new(handler));
    }

    fn report_fatal(&self, reason: String) {
        if let Some(handler) = self.fatal.lock().expect("fatal lock").as_ref() {
            handler(reason);
        }
    }

    /// Stop the supervisor and tear the session down. The reconnect task
    /// observes the flag and exits.
    pub async fn close(&self) {
        self.stopped.store(true, Ordering::Release);
        self.current().shutdown().await;
    }

    fn install_current(&self, session: Arc<PbxSession>) {
        *self.current.write().expect("session lock") = session;
    }
}

async fn reconnect_loop(supervisor: Arc<Supervisor>) {
    loop {
        let session = supervisor.current();
        let mut done = session.done();
        let terminated = *done.borrow_and_update();
        if !terminated {
            // A closed channel means the transport is gone too.
            let _ = done.changed().await;
        }

        if supervisor.stopped() {
            return;
        }

        // Unsolicited termination: drop the dead session's monitors so
        // readers of the stale handle see nothing monitored.
        session.shutdown().await;
        error!(host = %supervisor.host, "pbx connection lost");

        loop {
            info!(
                host = %supervisor.host,
                delay = ?supervisor.reconnect_delay,
                "reconnecting to pbx"
            );
            tokio::time::sleep(supervisor.reconnect_delay).await;
            if supervisor.stopped() {
                return;
            }

            match PbxSession::install_with(
                &supervisor.host,
                &supervisor.login,
                &supervisor.password,
                supervisor.read_timeout,
            )
            .await
            {
                Ok(session) => {
                    supervisor.install_current(session);
                    info!(host = %supervisor.host, "pbx session reinstalled");
                    break;
                }
                Err(err @ GatewayError::LoginRejected(_)) => {
                    error!(
                        host = %supervisor.host,
                        error = %err,
                        "pbx login rejected, reconnection abandoned"
                    );
                    supervisor.report_fatal(err.to_string());
                    return;
                }
                Err(e) => {
                    error!(host = %supervisor.host, error = %e, "pbx reconnect failed");
                }
            }
        }
    }
}
