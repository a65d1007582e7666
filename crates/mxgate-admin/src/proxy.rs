//! Data-plane lifecycle
//!
//! One `Proxy` is the whole data plane: the HTTP server bound to the
//! configured host plus the PBX session supervisor behind it. A config
//! change never patches the running plane; the admin surface closes the
//! old proxy and builds a fresh one from the new document.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use mxgate_api::GatewayState;
use mxgate_auth::JwtService;
use mxgate_core::{ConfigStore, GatewayError, GatewayResult};
use mxgate_pbx::{AuthCache, Supervisor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// The running data plane.
#[derive(Debug)]
pub struct Proxy {
    supervisor: Arc<Supervisor>,
    server: actix_web::dev::ServerHandle,
}

impl Proxy {
    /// Bring the data plane up: install the PBX session, then bind and
    /// spawn the HTTP server. Fails fast when the PBX settings are
    /// incomplete.
    ///
    /// A login rejection during a later reconnect permanently stops the
    /// supervisor; its reason is published on the store for the admin
    /// form to display.
    pub async fn build(store: &ConfigStore) -> GatewayResult<Proxy> {
        let config = store.snapshot();
        if !config.mx_configured() {
            return Err(GatewayError::Config("pbx not configured".to_string()));
        }

        let supervisor =
            Supervisor::start(&config.mx.host, &config.mx.login, &config.mx.password).await?;

        let last_error = store.clone();
        supervisor.on_fatal(move |reason| last_error.set_last_error(Some(reason)));

        let state = web::Data::new(GatewayState {
            supervisor: Arc::clone(&supervisor),
            auth_cache: AuthCache::new(),
            params: config.params.clone(),
        });
        let jwt = web::Data::new(JwtService::with_random_key());

        let bind = config.bind_addr();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(jwt.clone())
                .wrap(middleware::Logger::default())
                .wrap(Cors::permissive())
                .configure(mxgate_api::configure)
        })
        .client_request_timeout(Duration::from_secs(10))
        .disable_signals()
        .bind(&bind)
        .map_err(|e| {
            GatewayError::Config(format!("bind {}: {}", bind, e))
        })?
        .run();

        let handle = server.handle();
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!(error = %e, "data-plane server stopped");
            }
        });

        info!(addr = %bind, "data plane started");
        Ok(Proxy {
            supervisor,
            server: handle,
        })
    }

    /// The supervisor behind this proxy.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Tear the data plane down: HTTP server first, then the supervisor,
    /// which cascades into transport and broker closes.
    pub async fn close(self) {
        self.server.stop(true).await;
        self.supervisor.close().await;
        info!("data plane stopped");
    }
}
