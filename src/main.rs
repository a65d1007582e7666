//! mxgate service entry point
//!
//! Loads the persisted configuration, brings the data plane up and serves
//! the admin surface until interrupted. Exit codes: 1 when the
//! configuration cannot be loaded, 2 when the PBX cannot be reached at
//! startup.

use actix_web::{web, App, HttpServer};
use mxgate_admin::{AdminState, Proxy};
use mxgate_auth::PasswordService;
use mxgate_core::ConfigStore;
use std::env;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const DEFAULT_CONFIG: &str = "mxgate.json";
const DEFAULT_ADMIN_ADDR: &str = "127.0.0.1:8022";

/// Password of the freshly initialized admin account.
const DEFAULT_ADMIN_PASSWORD: &str = "mxgateadm";

/// Install the tracing subscriber behind a reload handle so the admin
/// surface can switch the level at runtime.
fn init_tracing() -> reload::Handle<EnvFilter, Registry> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    handle
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let reload_handle = init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "starting mxgate");

    let config_path = env::var("MXGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let admin_addr =
        env::var("MXGATE_ADMIN_ADDR").unwrap_or_else(|_| DEFAULT_ADMIN_ADDR.to_string());

    let config = match ConfigStore::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, path = %config_path, "config error");
            std::process::exit(1);
        }
    };

    let passwords = PasswordService::new();
    if config.snapshot().admin.password.is_empty() {
        let initialized = passwords
            .hash_password(DEFAULT_ADMIN_PASSWORD)
            .and_then(|hash| config.update(|c| c.admin.password = hash));
        if let Err(e) = initialized {
            error!(error = %e, "config error");
            std::process::exit(1);
        }
    }

    // RUST_LOG wins over the persisted level.
    if env::var("RUST_LOG").is_err() {
        let level = config.snapshot().server.log_level;
        let _ = reload_handle.reload(EnvFilter::new(level.directive()));
    }

    let mx_host = config.snapshot().mx.host.clone();
    info!(host = %mx_host, "connecting to pbx");
    let proxy = match Proxy::build(&config).await {
        Ok(proxy) => proxy,
        Err(e) => {
            error!(error = %e, "pbx bring-up failed");
            std::process::exit(2);
        }
    };

    let log_handle = reload_handle.clone();
    let state = web::Data::new(AdminState {
        config,
        passwords,
        proxy: tokio::sync::Mutex::new(Some(proxy)),
        log_reload: Box::new(move |level| {
            let _ = log_handle.reload(EnvFilter::new(level.directive()));
        }),
    });

    info!(addr = %admin_addr, "admin surface listening");
    let admin_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(admin_state.clone())
            .configure(mxgate_admin::configure)
    })
    .bind(&admin_addr)?
    .run()
    .await?;

    if let Some(proxy) = state.proxy.lock().await.take() {
        proxy.close().await;
    }
    info!("mxgate stopped");
    Ok(())
}
