//! Login and logout handlers

use crate::dto::{LoginForm, TokenResponse};
use crate::GatewayState;
use actix_web::{web, HttpResponse};
use mxgate_auth::{BearerUser, JwtService};
use mxgate_core::GatewayError;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Authenticate a PBX user, arm their call monitor and issue a token.
///
/// POST /api/login
#[instrument(skip(state, jwt, form), fields(login = %form.login))]
pub async fn login(
    state: web::Data<GatewayState>,
    jwt: web::Data<JwtService>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, GatewayError> {
    form.validate().map_err(|e| {
        warn!("login validation failed: {}", e);
        GatewayError::BadRequest(e.to_string())
    })?;

    let login = form.login.trim();
    let session = state.supervisor.current();

    let ext = match state.auth_cache.check(login, &form.password) {
        Some(ext) => ext,
        None => {
            let info = state.supervisor.verify_user(login, &form.password).await?;
            state.auth_cache.add(login, &form.password, &info.ext);
            info.ext
        }
    };

    session.monitor_start(&ext).await?;

    let token = jwt.issue(login, &ext, &session.info().sn)?;
    info!(ext = %ext, "user logged in");

    Ok(HttpResponse::Ok().json(TokenResponse::bearer(token, jwt.expiration_secs())))
}

/// Stop the user's call monitor; their SSE streams end.
///
/// GET /api/logout
#[instrument(skip(state, user), fields(ext = %user.ext))]
pub async fn logout(
    state: web::Data<GatewayState>,
    user: BearerUser,
) -> Result<HttpResponse, GatewayError> {
    state.supervisor.current().monitor_stop(&user.ext).await?;
    info!("user logged out");
    Ok(HttpResponse::Ok().finish())
}
