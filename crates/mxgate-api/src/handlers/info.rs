//! Monitoring info and client rules handlers

use crate::dto::{InfoResponse, RulesResponse};
use crate::GatewayState;
use actix_web::{web, HttpResponse};
use mxgate_auth::BearerUser;
use mxgate_core::GatewayError;
use tracing::instrument;

/// Subscriber counts per monitored extension.
///
/// GET /api/info
#[instrument(skip(state, _user))]
pub async fn connection_info(
    state: web::Data<GatewayState>,
    _user: BearerUser,
) -> Result<HttpResponse, GatewayError> {
    let monitoring = state.supervisor.current().connection_info();
    Ok(HttpResponse::Ok().json(InfoResponse { monitoring }))
}

/// Free-form client parameters from the configuration document.
///
/// GET /rules
#[instrument(skip(state))]
pub async fn rules(state: web::Data<GatewayState>) -> HttpResponse {
    HttpResponse::Ok().json(RulesResponse {
        params: state.params.clone(),
    })
}
