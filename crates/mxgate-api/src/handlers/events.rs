//! SSE event stream handler

use crate::GatewayState;
use actix_web::{web, HttpRequest, HttpResponse};
use mxgate_auth::BearerUser;
use mxgate_core::GatewayError;
use tracing::{debug, instrument};

/// True when the request's Accept header asks for an event stream.
fn accepts_event_stream(req: &HttpRequest) -> bool {
    req.headers()
        .get("Accept")
        .and_then(|value| value.to_str().ok())
        .map(|accept| {
            accept.split(',').any(|item| {
                item.split(';').next().map(str::trim) == Some("text/event-stream")
            })
        })
        .unwrap_or(false)
}

/// Stream the user's call events as server-sent events.
///
/// GET /api/events
#[instrument(skip(state, user, req), fields(ext = %user.ext))]
pub async fn events(
    state: web::Data<GatewayState>,
    user: BearerUser,
    req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
    if !accepts_event_stream(&req) {
        return Err(GatewayError::NotAcceptable(
            "only text/event-stream is supported".to_string(),
        ));
    }

    let session = state.supervisor.current();
    let entry = session
        .registry()
        .by_extension(&user.ext)
        .ok_or(GatewayError::NotMonitored)?;

    debug!(subscribers = entry.broker.connected() + 1, "sse client connected");
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(entry.broker.sse_stream()))
}
