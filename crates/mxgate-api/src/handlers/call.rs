//! Call-control handlers

use crate::dto::{CallForm, CallResponse, HangupForm, TransferForm};
use crate::GatewayState;
use actix_web::{web, HttpResponse};
use mxgate_auth::BearerUser;
use mxgate_core::GatewayError;
use tracing::{debug, instrument, warn};
use validator::Validate;

fn validated<T: Validate>(form: &T) -> Result<(), GatewayError> {
    form.validate().map_err(|e| {
        warn!("call request validation failed: {}", e);
        GatewayError::BadRequest(e.to_string())
    })
}

/// Place a server-side call on behalf of the authenticated user.
///
/// POST /api/call
#[instrument(skip(state, user, form), fields(ext = %user.ext, to = %form.to))]
pub async fn make_call(
    state: web::Data<GatewayState>,
    user: BearerUser,
    form: web::Form<CallForm>,
) -> Result<HttpResponse, GatewayError> {
    validated(&*form)?;

    let from = if form.from.is_empty() {
        user.ext.as_str()
    } else {
        form.from.as_str()
    };

    let call = state.supervisor.current().make_call(from, &form.to).await?;
    debug!(call_id = call.call_id, "call placed");
    Ok(HttpResponse::Ok().json(CallResponse { call }))
}

/// Drop an active connection.
///
/// POST /api/call/hangup
#[instrument(skip(state, user, form), fields(ext = %user.ext, call_id = form.call_id))]
pub async fn hangup(
    state: web::Data<GatewayState>,
    user: BearerUser,
    form: web::Form<HangupForm>,
) -> Result<HttpResponse, GatewayError> {
    validated(&*form)?;

    state
        .supervisor
        .current()
        .hangup(form.call_id, &form.device_id)
        .await?;
    Ok(HttpResponse::Ok().finish())
}

/// Single-step transfer of an active call.
///
/// POST /api/call/transfer
#[instrument(skip(state, user, form), fields(ext = %user.ext, call_id = form.call_id))]
pub async fn transfer(
    state: web::Data<GatewayState>,
    user: BearerUser,
    form: web::Form<TransferForm>,
) -> Result<HttpResponse, GatewayError> {
    validated(&*form)?;

    state
        .supervisor
        .current()
        .transfer(form.call_id, &form.device_id, &form.destination)
        .await?;
    Ok(HttpResponse::Ok().finish())
}
