//! Actix-web request extractor for bearer-authenticated users
//!
//! Accepts the token either as `Authorization: Bearer …` or as an
//! `access_token` query parameter (the SSE endpoint is consumed by
//! `EventSource`, which cannot set headers).

use crate::claims::Claims;
use crate::jwt::JwtService;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use mxgate_core::GatewayError;
use std::collections::HashMap;
use tracing::debug;

/// Extract the bearer token from a request, query parameter first.
fn extract_token(req: &HttpRequest) -> Option<String> {
    if let Ok(query) =
        web::Query::<HashMap<String, String>>::from_query(req.query_string())
    {
        if let Some(token) = query.get("access_token") {
            if !token.is_empty() {
                return Some(token.clone());
            }
        }
    }

    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Authenticated PBX user extractor
///
/// Validates the bearer token and exposes the user's extension. A missing
/// token yields 401 with a `WWW-Authenticate` challenge; a token that
/// fails verification yields 403.
#[derive(Debug, Clone)]
pub struct BearerUser {
    /// The user's extension, read from the token
    pub ext: String,

    /// Full claims from the token
    pub claims: Claims,
}

impl FromRequest for BearerUser {
    type Error = GatewayError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let jwt = match req.app_data::<web::Data<JwtService>>() {
            Some(jwt) => jwt.get_ref(),
            None => {
                return ready(Err(GatewayError::Internal(
                    "token service not configured".to_string(),
                )))
            }
        };

        let token = match extract_token(req) {
            Some(token) => token,
            None => return ready(Err(GatewayError::Unauthorized)),
        };

        ready(jwt.verify(&token).map(|claims| {
            debug!(login = %claims.sub, ext = %claims.ext, "request authenticated");
            BearerUser {
                ext: claims.ext.clone(),
                claims,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    fn test_jwt() -> JwtService {
        JwtService::new(b"test-secret-key-12345", 3600)
    }

    async fn echo_ext(user: BearerUser) -> HttpResponse {
        HttpResponse::Ok().body(user.ext)
    }

    #[actix_web::test]
    async fn test_token_from_authorization_header() {
        let jwt = test_jwt();
        let token = jwt.issue("alice", "3052", "MX-1").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(jwt))
                .route("/test", web::get().to(echo_ext)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "3052");
    }

    #[actix_web::test]
    async fn test_token_from_query_parameter() {
        let jwt = test_jwt();
        let token = jwt.issue("alice", "3052", "MX-1").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(jwt))
                .route("/test", web::get().to(echo_ext)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/test?access_token={}", token))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "3052");
    }

    #[actix_web::test]
    async fn test_missing_token_is_401_with_challenge() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_jwt()))
                .route("/test", web::get().to(echo_ext)),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        assert!(resp.headers().contains_key("WWW-Authenticate"));
    }

    #[actix_web::test]
    async fn test_bad_signature_is_403() {
        let other = JwtService::new(b"other-secret", 3600);
        let token = other.issue("alice", "3052", "MX-1").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_jwt()))
                .route("/test", web::get().to(echo_ext)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
    }
}
