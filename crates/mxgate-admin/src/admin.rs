//! Admin HTTP surface
//!
//! Basic-auth protected form over the persisted configuration document.
//! Saving PBX or bind settings rebuilds the whole data plane; the log
//! selector is applied live through a tracing reload handle.

use crate::manifest;
use crate::proxy::Proxy;
use actix_web::{web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use mxgate_auth::PasswordService;
use mxgate_core::{Config, ConfigStore, LogLevel, REALM};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Applies a new log level to the running tracing subscriber.
pub type LogLevelHandle = Box<dyn Fn(LogLevel) + Send + Sync>;

/// Shared state of the admin application.
pub struct AdminState {
    pub config: ConfigStore,
    pub passwords: PasswordService,
    pub proxy: tokio::sync::Mutex<Option<Proxy>>,
    pub log_reload: LogLevelHandle,
}

/// Register the admin routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(show_form))
        .route("/", web::post().to(apply_form))
        .route("/manifest.zip", web::get().to(manifest_zip));
}

fn basic_credentials(req: &HttpRequest) -> Option<(String, String)> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (login, password) = text.split_once(':')?;
    Some((login.to_string(), password.to_string()))
}

fn challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((
            "WWW-Authenticate",
            format!("Basic realm=\"{} Admin\"", REALM),
        ))
        .finish()
}

/// Check basic-auth credentials against the configured admin account.
fn authorize(state: &AdminState, req: &HttpRequest) -> Result<(), HttpResponse> {
    let Some((login, password)) = basic_credentials(req) else {
        warn!("unauthorized admin request");
        return Err(challenge());
    };
    let config = state.config.snapshot();
    if login != config.admin.login {
        warn!(login = %login, "bad admin login");
        return Err(challenge());
    }
    if !state
        .passwords
        .verify_password(&password, &config.admin.password)
        .unwrap_or(false)
    {
        warn!("bad admin password");
        return Err(challenge());
    }
    Ok(())
}

/// GET /: the configuration form.
async fn show_form(state: web::Data<AdminState>, req: HttpRequest) -> HttpResponse {
    if let Err(resp) = authorize(&state, &req) {
        return resp;
    }
    let config = state.config.snapshot();
    let error = state.config.last_error();
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_form(&config, error.as_deref()))
}

/// POST /: apply whitelisted fields, persist, rebuild when needed.
async fn apply_form(
    state: web::Data<AdminState>,
    req: HttpRequest,
    form: web::Form<HashMap<String, String>>,
) -> HttpResponse {
    if let Err(resp) = authorize(&state, &req) {
        return resp;
    }

    let mut updated = state.config.snapshot();
    let mut changed = false;
    let mut mx_changed = false;
    let mut server_changed = false;
    let mut new_level = None;

    for (name, value) in form.iter() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.as_str() {
            "admin.login" => {
                if value != updated.admin.login {
                    updated.admin.login = value.to_string();
                    changed = true;
                }
            }
            "admin.password" => {
                // Skip when the submitted password already matches.
                if state
                    .passwords
                    .verify_password(value, &updated.admin.password)
                    .unwrap_or(false)
                {
                    continue;
                }
                match state.passwords.hash_password(value) {
                    Ok(hash) => {
                        updated.admin.password = hash;
                        changed = true;
                    }
                    Err(e) => error!(error = %e, "admin password hash error"),
                }
            }
            "server.host" => {
                if value != updated.server.host {
                    updated.server.host = value.to_string();
                    server_changed = true;
                    changed = true;
                }
            }
            "server.log" => {
                if let Some(level) = LogLevel::from_form(value) {
                    if level != updated.server.log_level {
                        updated.server.log_level = level;
                        new_level = Some(level);
                        changed = true;
                    }
                }
            }
            "mx.host" => {
                if value != updated.mx.host {
                    updated.mx.host = value.to_string();
                    mx_changed = true;
                    changed = true;
                }
            }
            "mx.login" => {
                if value != updated.mx.login {
                    updated.mx.login = value.to_string();
                    mx_changed = true;
                    changed = true;
                }
            }
            "mx.password" => {
                if value != updated.mx.password {
                    updated.mx.password = value.to_string();
                    mx_changed = true;
                    changed = true;
                }
            }
            _ => {}
        }
    }

    if changed {
        if let Err(e) = state.config.update(|c| *c = updated.clone()) {
            error!(error = %e, "config save error");
            return HttpResponse::InternalServerError().body(e.to_string());
        }
        info!("config changed");
    }
    if let Some(level) = new_level {
        (state.log_reload)(level);
    }

    if server_changed || mx_changed {
        rebuild(&state).await;
    }

    // Redirect so a reload of the form does not repost.
    HttpResponse::Found()
        .insert_header(("Location", "/"))
        .finish()
}

/// Close the current data plane and build a fresh one; the outcome is
/// published for the form to display.
pub async fn rebuild(state: &AdminState) {
    let mut slot = state.proxy.lock().await;
    if let Some(old) = slot.take() {
        old.close().await;
    }
    match Proxy::build(&state.config).await {
        Ok(proxy) => {
            *slot = Some(proxy);
            state.config.set_last_error(None);
        }
        Err(e) => {
            error!(error = %e, "data plane rebuild failed");
            state.config.set_last_error(Some(e.to_string()));
        }
    }
}

/// GET /manifest.zip: the client bundle with the URL placeholder
/// rewritten to this gateway's base URL.
async fn manifest_zip(state: web::Data<AdminState>, req: HttpRequest) -> HttpResponse {
    if let Err(resp) = authorize(&state, &req) {
        return resp;
    }

    let bundle = match std::fs::read(manifest::MANIFEST_PATH) {
        Ok(bundle) => bundle,
        Err(e) => {
            error!(error = %e, "manifest read error");
            return HttpResponse::NotFound().body(e.to_string());
        }
    };
    match manifest::rewrite(&bundle, &state.config.snapshot().server_url()) {
        Ok(rewritten) => {
            info!("manifest generated");
            HttpResponse::Ok()
                .content_type("application/zip")
                .body(rewritten)
        }
        Err(e) => {
            error!(error = %e, "manifest rewrite error");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

fn selected(config: &Config, level: LogLevel) -> &'static str {
    if config.server.log_level == level {
        " selected"
    } else {
        ""
    }
}

fn render_form(config: &Config, error: Option<&str>) -> String {
    let error_block = error
        .map(|e| format!("<p class=\"error\">{}</p>", e))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html><head><title>mxgate {version}</title></head><body>\n\
         <h1>mxgate {version}</h1>\n{error_block}\n\
         <form method=\"post\" action=\"/\">\n\
         <fieldset><legend>Admin</legend>\n\
         <label>Login <input name=\"admin.login\" value=\"{admin_login}\"></label>\n\
         <label>Password <input name=\"admin.password\" type=\"password\"></label>\n\
         </fieldset>\n\
         <fieldset><legend>Server</legend>\n\
         <label>Host <input name=\"server.host\" value=\"{server_host}\"></label>\n\
         <label>Log <select name=\"server.log\">\n\
         <option{all}>ALL</option><option{info}>INFO</option><option{err}>ERROR</option>\n\
         </select></label>\n\
         </fieldset>\n\
         <fieldset><legend>PBX</legend>\n\
         <label>Host <input name=\"mx.host\" value=\"{mx_host}\"></label>\n\
         <label>Login <input name=\"mx.login\" value=\"{mx_login}\"></label>\n\
         <label>Password <input name=\"mx.password\" type=\"password\"></label>\n\
         </fieldset>\n\
         <button type=\"submit\">Save</button>\n\
         </form>\n\
         <p><a href=\"/manifest.zip\">manifest.zip</a></p>\n\
         </body></html>\n",
        version = env!("CARGO_PKG_VERSION"),
        error_block = error_block,
        admin_login = config.admin.login,
        server_host = config.server.host,
        all = selected(config, LogLevel::All),
        info = selected(config, LogLevel::Info),
        err = selected(config, LogLevel::Error),
        mx_host = config.mx.host,
        mx_login = config.mx.login,
    )
}
