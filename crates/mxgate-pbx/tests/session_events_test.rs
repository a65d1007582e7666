//! End-to-end tests of the session event flow against the simulated PBX:
//! monitor lifecycle, event fan-out, address-book replication and
//! credential verification.

use futures::StreamExt;
use mxgate_pbx::simulator::{contact, PbxSimulator};
use mxgate_pbx::PbxSession;
use std::time::Duration;

const FAST: Duration = Duration::from_millis(200);

async fn install(sim: &PbxSimulator) -> std::sync::Arc<PbxSession> {
    PbxSession::install_with(&sim.addr(), "server", "srv-pw", FAST)
        .await
        .expect("session install")
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

#[tokio::test]
async fn test_monitor_start_is_idempotent() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    let first = session.monitor_start("3052").await.unwrap();
    let second = session.monitor_start("3052").await.unwrap();
    assert_eq!(first, second);

    // Only one MonitorStart reached the PBX.
    let starts = sim
        .commands()
        .iter()
        .filter(|c| c.as_str() == "MonitorStart")
        .count();
    assert_eq!(starts, 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_monitor_stop_is_idempotent() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    session.monitor_start("3052").await.unwrap();
    session.monitor_stop("3052").await.unwrap();
    session.monitor_stop("3052").await.unwrap();

    let stops = sim
        .commands()
        .iter()
        .filter(|c| c.as_str() == "MonitorStop")
        .count();
    assert_eq!(stops, 1);
    assert!(session.connection_info().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn test_subscriber_receives_monitored_event() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    let monitor_id = session.monitor_start("3052").await.unwrap();
    let entry = session.registry().by_extension("3052").unwrap();
    let mut stream = entry.broker.sse_stream();
    assert_eq!(session.connection_info().get("3052"), Some(&1));

    sim.push_event(&established_event(monitor_id, 42)).await;

    let chunk = stream.next().await.expect("event frame").unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.starts_with("event: EstablishedEvent\ndata: "));
    assert!(text.contains("\"callId\":42"));
    assert!(text.contains("\"answeringDevice\":\"3052\""));

    session.shutdown().await;
}

#[tokio::test]
async fn test_unknown_monitor_id_publishes_nothing() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    let monitor_id = session.monitor_start("3052").await.unwrap();
    let entry = session.registry().by_extension("3052").unwrap();
    let mut stream = entry.broker.sse_stream();

    // An event for a never-registered id is dropped...
    sim.push_event(&established_event(monitor_id + 1000, 7)).await;
    // ...while the next event for the live monitor still arrives in order.
    sim.push_event(&established_event(monitor_id, 8)).await;

    let chunk = stream.next().await.unwrap().unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains("\"callId\":8"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_no_events_after_stop() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    let monitor_id = session.monitor_start("3052").await.unwrap();
    let entry = session.registry().by_extension("3052").unwrap();
    let mut stream = entry.broker.sse_stream();

    session.monitor_stop("3052").await.unwrap();

    // The broker was closed before the stop returned: the stream ends and
    // later events for the old id go nowhere.
    assert!(stream.next().await.is_none());
    drop(stream);
    sim.push_event(&established_event(monitor_id, 9)).await;
    assert_eq!(entry.broker.connected(), 0);
    assert!(session.registry().lookup(monitor_id).is_none());

    session.shutdown().await;
}

#[tokio::test]
async fn test_malformed_event_does_not_kill_the_stream() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    let monitor_id = session.monitor_start("3052").await.unwrap();
    let entry = session.registry().by_extension("3052").unwrap();
    let mut stream = entry.broker.sse_stream();

    sim.push_event(&format!(
        "<EstablishedEvent><monitorCrossRefID>{}</monitorCrossRefID>\
         <establishedConnection><callID>not-a-number</callID>\
         </establishedConnection></EstablishedEvent>",
        monitor_id
    ))
    .await;
    sim.push_event(&established_event(monitor_id, 10)).await;

    let chunk = stream.next().await.unwrap().unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains("\"callId\":10"));
    assert!(!session.is_terminated());

    session.shutdown().await;
}

#[tokio::test]
async fn test_addressbook_follows_events() {
    let sim = PbxSimulator::start().await.unwrap();
    sim.add_contact(contact("u-1", "Alice", "3052"));
    let session = install(&sim).await;
    assert_eq!(session.contacts().len(), 1);

    sim.push_event(
        "<AbAddUserEvent><abentry><jid>u-2</jid><firstName>Bob</firstName>\
         <lastName></lastName><ext>3060</ext><cellPhone></cellPhone>\
         <email></email></abentry></AbAddUserEvent>",
    )
    .await;
    sim.push_event(
        "<AbUpdateUserEvent><abentry><jid>u-1</jid><firstName>Alicia</firstName>\
         <lastName></lastName><ext>3052</ext><cellPhone></cellPhone>\
         <email></email></abentry></AbUpdateUserEvent>",
    )
    .await;
    sim.push_event("<AbDeleteUserEvent><userId>u-2</userId></AbDeleteUserEvent>")
        .await;

    // Events are applied in arrival order; poll until the fold settles.
    let mut contacts = session.contacts();
    for _ in 0..50 {
        if contacts.len() == 1 && contacts[0].first_name == "Alicia" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        contacts = session.contacts();
    }
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].jid, "u-1");
    assert_eq!(contacts[0].first_name, "Alicia");

    session.shutdown().await;
}

#[tokio::test]
async fn test_make_call_decodes_reply() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    let call = session.make_call("3052", "+15550100").await.unwrap();
    assert_eq!(call.call_id, 42);
    assert_eq!(call.device_id, "d1");
    assert_eq!(call.called, "+15550100");

    session.shutdown().await;
}

#[tokio::test]
async fn test_fire_and_forget_call_control() {
    let sim = PbxSimulator::start().await.unwrap();
    let session = install(&sim).await;

    session.hangup(42, "d1").await.unwrap();
    session.transfer(42, "d1", "3060").await.unwrap();

    let mut commands = sim.commands();
    for _ in 0..50 {
        if commands.iter().any(|c| c == "SingleStepTransferCall") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        commands = sim.commands();
    }
    assert!(commands.iter().any(|c| c == "ClearConnection"));
    assert!(commands.iter().any(|c| c == "SingleStepTransferCall"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_verify_user_round_trip() {
    let sim = PbxSimulator::start().await.unwrap();
    sim.add_user("alice", "pw", "3052");
    let session = install(&sim).await;

    let info = PbxSession::verify_user(&sim.addr(), "alice", "pw")
        .await
        .unwrap();
    assert_eq!(info.ext, "3052");
    assert_eq!(info.jid, "jid-alice");
    assert_eq!(info.sn, "SIM-1");

    // Bad credentials are a typed rejection, not a transport error.
    let err = PbxSession::verify_user(&sim.addr(), "alice", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, mxgate_core::GatewayError::LoginRejected(_)));

    // The server session was never disturbed.
    assert!(!session.is_terminated());
    session.shutdown().await;
}
