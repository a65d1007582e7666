//! Integration tests of the data-plane API against the simulated PBX.

use actix_web::{test, web, App};
use mxgate_api::GatewayState;
use mxgate_auth::JwtService;
use mxgate_pbx::simulator::{contact, PbxSimulator};
use mxgate_pbx::{AuthCache, Supervisor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

async fn setup() -> (PbxSimulator, Arc<Supervisor>, JwtService, web::Data<GatewayState>) {
    let sim = PbxSimulator::start().await.unwrap();
    sim.add_user("alice", "pw", "3052");
    sim.add_contact(contact("u-1", "Alice", "3052"));
    sim.add_contact(contact("u-2", "Bob", "3060"));

    let supervisor = Supervisor::start_with(
        &sim.addr(),
        "server",
        "srv-pw",
        Duration::from_millis(50),
        Duration::from_millis(500),
    )
    .await
    .expect("supervisor");

    let jwt = JwtService::with_random_key();
    let state = web::Data::new(GatewayState {
        supervisor: Arc::clone(&supervisor),
        auth_cache: AuthCache::new(),
        params: HashMap::from([("phoneCountry".to_string(), "EE".to_string())]),
    });

    (sim, supervisor, jwt, state)
}

macro_rules! app {
    ($state:expr, $jwt:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .app_data(web::Data::new($jwt.clone()))
                .configure(mxgate_api::configure),
        )
        .await
    };
}

macro_rules! login {
    ($app:expr, $login:expr, $password:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/login")
            .set_form([("login", $login), ("password", $password)])
            .to_request();
        test::call_service($app, req).await
    }};
}

fn established_event(monitor_id: i64, call_id: u64) -> String {
    format!(
        "<EstablishedEvent>\
         <monitorCrossRefID>{}</monitorCrossRefID>\
         <establishedConnection><callID>{}</callID><deviceID>d1</deviceID>\
         <globalCallID>gc-1</globalCallID></establishedConnection>\
         <answeringDevice><deviceIdentifier>3052</deviceIdentifier></answeringDevice>\
         <answeringDisplayName>Alice</answeringDisplayName>\
         <callingDevice><deviceIdentifier>3060</deviceIdentifier></callingDevice>\
         <calledDevice><deviceIdentifier>3052</deviceIdentifier></calledDevice>\
         <callingDisplayName>Bob</callingDisplayName>\
         <cause>normal</cause>\
         </EstablishedEvent>",
        monitor_id, call_id
    )
}

#[actix_web::test]
async fn test_login_issues_token_and_arms_monitor() {
    let (sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let resp = login!(&app, "alice", "pw");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert!(!body["access_token"].as_str().unwrap().is_empty());

    // The monitor is armed on the server session.
    assert!(sim.monitor_id_for("3052").is_some());
    assert!(supervisor
        .current()
        .connection_info()
        .contains_key("3052"));

    supervisor.close().await;
}

#[actix_web::test]
async fn test_login_requires_login_field() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let resp = login!(&app, "", "pw");
    assert_eq!(resp.status(), 400);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_login_with_bad_password_is_403() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let resp = login!(&app, "alice", "wrong");
    assert_eq!(resp.status(), 403);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_cached_credentials_skip_pbx_verification() {
    let (sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    assert_eq!(login!(&app, "alice", "pw").status(), 200);

    // With logins rejected upstream, only the cache can say yes.
    sim.reject_logins(true);
    assert_eq!(login!(&app, "alice", "pw").status(), 200);
    assert_eq!(login!(&app, "alice", "wrong").status(), 403);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_missing_bearer_is_401_with_challenge() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let req = test::TestRequest::get().uri("/api/contacts").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let challenge = resp
        .headers()
        .get("WWW-Authenticate")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(challenge.starts_with("Bearer realm="));

    supervisor.close().await;
}

#[actix_web::test]
async fn test_contacts_sorted_by_ext() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();
    let req = test::TestRequest::get()
        .uri("/api/contacts")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    let contacts = body["contacts"].as_array().unwrap();
    assert_eq!(contacts.len(), 2);
    assert_eq!(contacts[0]["ext"], "3052");
    assert_eq!(contacts[0]["firstName"], "Alice");
    assert_eq!(contacts[1]["ext"], "3060");

    supervisor.close().await;
}

#[actix_web::test]
async fn test_call_defaults_from_to_token_extension() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();
    let req = test::TestRequest::post()
        .uri("/api/call")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("to", "+15550100")])
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["call"]["callId"], 42);
    assert_eq!(body["call"]["deviceId"], "d1");
    assert_eq!(body["call"]["called"], "+15550100");

    supervisor.close().await;
}

#[actix_web::test]
async fn test_call_with_empty_to_is_400() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();
    let req = test::TestRequest::post()
        .uri("/api/call")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("to", "")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_hangup_requires_device_id() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();
    let req = test::TestRequest::post()
        .uri("/api/call/hangup")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("callId", "42"), ("deviceId", "")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/call/hangup")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("callId", "42"), ("deviceId", "d1")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_transfer_requires_destination() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();
    let req = test::TestRequest::post()
        .uri("/api/call/transfer")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("callId", "42"), ("deviceId", "d1"), ("destination", "")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_events_requires_sse_accept() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    assert_eq!(login!(&app, "alice", "pw").status(), 200);
    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();

    let req = test::TestRequest::get()
        .uri("/api/events")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Accept", "text/html"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 406);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_events_requires_monitored_extension() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    // Valid token, but nobody armed a monitor for this extension.
    let token = jwt.issue("carol", "3090", "SIM-1").unwrap();
    let req = test::TestRequest::get()
        .uri("/api/events")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Accept", "text/event-stream"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_event_stream_end_to_end() {
    let (sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    // Scenario: login, subscribe, receive an event, logout ends the stream.
    assert_eq!(login!(&app, "alice", "pw").status(), 200);
    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/events?access_token={}", token))
        .insert_header(("Accept", "text/event-stream"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        supervisor.current().connection_info().get("3052"),
        Some(&1)
    );

    let monitor_id = sim.monitor_id_for("3052").unwrap();
    sim.push_event(&established_event(monitor_id, 42)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Logout closes the broker, ending the stream cleanly.
    let req = test::TestRequest::get()
        .uri("/api/logout")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("event: EstablishedEvent\ndata: "));
    assert!(text.contains("\"callId\":42"));

    assert_eq!(
        supervisor
            .current()
            .connection_info()
            .get("3052")
            .copied()
            .unwrap_or(0),
        0
    );

    supervisor.close().await;
}

#[actix_web::test]
async fn test_info_reports_monitoring() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let token = jwt.issue("alice", "3052", "SIM-1").unwrap();

    let req = test::TestRequest::get()
        .uri("/api/info")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["monitoring"], serde_json::json!({}));

    assert_eq!(login!(&app, "alice", "pw").status(), 200);
    let req = test::TestRequest::get()
        .uri("/api/info")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["monitoring"]["3052"], 0);

    supervisor.close().await;
}

#[actix_web::test]
async fn test_rules_is_public() {
    let (_sim, supervisor, jwt, state) = setup().await;
    let app = app!(state, jwt);

    let req = test::TestRequest::get().uri("/rules").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["params"]["phoneCountry"], "EE");

    supervisor.close().await;
}
