//! Address book handler

use crate::dto::ContactsResponse;
use crate::GatewayState;
use actix_web::{web, HttpResponse};
use mxgate_auth::BearerUser;
use mxgate_core::GatewayError;
use tracing::instrument;

/// Contacts from the server-side address book, sorted by extension.
///
/// GET /api/contacts
#[instrument(skip(state, _user))]
pub async fn contacts(
    state: web::Data<GatewayState>,
    _user: BearerUser,
) -> Result<HttpResponse, GatewayError> {
    let contacts = state.supervisor.current().contacts();
    Ok(HttpResponse::Ok().json(ContactsResponse { contacts }))
}
