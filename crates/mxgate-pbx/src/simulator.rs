//! Scripted in-process PBX
//!
//! A small TCP peer speaking the framed CSTA dialogue, used by the
//! integration tests instead of a real PBX: it authenticates configured
//! users, serves an address book, acknowledges monitor commands and lets
//! the test push arbitrary events down the wire.

use crate::addressbook::Contact;
use crate::transport::encode_frame;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

const EVENT_ID: u16 = 9999;

#[derive(Clone)]
struct SimUser {
    password: String,
    ext: String,
    jid: String,
}

#[derive(Default)]
struct SimState {
    users: Mutex<HashMap<String, SimUser>>,
    contacts: Mutex<Vec<Contact>>,
    monitors: Mutex<HashMap<String, i64>>,
    commands: Mutex<Vec<String>>,
    connections: Mutex<Vec<Arc<tokio::sync::Mutex<OwnedWriteHalf>>>>,
    reject_logins: AtomicBool,
}

/// Handle to a running simulated PBX.
pub struct PbxSimulator {
    addr: std::net::SocketAddr,
    state: Arc<SimState>,
}

impl PbxSimulator {
    /// Bind to an ephemeral port and start accepting connections.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(SimState::default());

        let accept_state = Arc::clone(&state);
        let next_monitor_id = Arc::new(AtomicI64::new(100));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&accept_state);
                let ids = Arc::clone(&next_monitor_id);
                tokio::spawn(serve_connection(stream, state, ids));
            }
        });

        Ok(Self { addr, state })
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub fn add_user(&self, login: &str, password: &str, ext: &str) {
        self.state.users.lock().unwrap().insert(
            login.to_string(),
            SimUser {
                password: password.to_string(),
                ext: ext.to_string(),
                jid: format!("jid-{}", login),
            },
        );
    }

    pub fn add_contact(&self, contact: Contact) {
        self.state.contacts.lock().unwrap().push(contact);
    }

    /// When set, every subsequent login attempt is answered with
    /// `loginFailed`.
    pub fn reject_logins(&self, reject: bool) {
        self.state.reject_logins.store(reject, Ordering::SeqCst);
    }

    /// Monitor id the simulator allocated for an extension.
    pub fn monitor_id_for(&self, ext: &str) -> Option<i64> {
        self.state.monitors.lock().unwrap().get(ext).copied()
    }

    /// Every command root element received, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Push an unsolicited event to every live connection.
    pub async fn push_event(&self, xml: &str) {
        let frame = encode_frame(EVENT_ID, xml).expect("event frame");
        let connections = self.state.connections.lock().unwrap().clone();
        for connection in connections {
            let mut writer = connection.lock().await;
            let _ = writer.write_all(&frame).await;
        }
    }

    /// Hard-close every live connection, as a dying PBX would.
    pub async fn drop_connections(&self) {
        let connections: Vec<_> =
            self.state.connections.lock().unwrap().drain(..).collect();
        for connection in connections {
            let mut writer = connection.lock().await;
            let _ = writer.shutdown().await;
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: Arc<SimState>,
    ids: Arc<AtomicI64>,
) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(writer));
    state
        .connections
        .lock()
        .unwrap()
        .push(Arc::clone(&writer));

    loop {
        let mut header = [0u8; 8];
        if reader.read_exact(&mut header).await.is_err() {
            return;
        }
        let total = u16::from_be_bytes([header[2], header[3]]) as usize;
        let id: u16 = match std::str::from_utf8(&header[4..8])
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(id) => id,
            None => return,
        };
        let mut payload = vec![0u8; total.saturating_sub(8)];
        if reader.read_exact(&mut payload).await.is_err() {
            return;
        }
        let xml = String::from_utf8_lossy(&payload).to_string();

        let root = crate::transport::root_name(&xml).unwrap_or_default();
        state.commands.lock().unwrap().push(root.clone());

        let reply = match root.as_str() {
            "loginRequest" => Some(login_reply(&state, &xml)),
            "AddressbookList" => Some(ab_list_reply(&state)),
            "MonitorStartAb" => Some("<abMonitorStarted/>".to_string()),
            "MonitorStart" => {
                let ext = text_between(&xml, "deviceObject").unwrap_or_default();
                let monitor_id = ids.fetch_add(1, Ordering::SeqCst);
                state
                    .monitors
                    .lock()
                    .unwrap()
                    .insert(ext, monitor_id);
                Some(format!(
                    "<monitorStarted><monitorCrossRefID>{}</monitorCrossRefID></monitorStarted>",
                    monitor_id
                ))
            }
            "MonitorStop" => Some("<monitorStopped/>".to_string()),
            "MakeCall" => {
                let to = text_between(&xml, "calledDirectoryNumber").unwrap_or_default();
                Some(format!(
                    "<MakeCallResponse><callingDevice><callID>42</callID>\
                     <deviceID>d1</deviceID></callingDevice>\
                     <calledDevice>{}</calledDevice></MakeCallResponse>",
                    to
                ))
            }
            // Fire-and-forget commands get no reply.
            _ => None,
        };

        if let Some(reply) = reply {
            let frame = encode_frame(id, &reply).expect("reply frame");
            let mut writer = writer.lock().await;
            if writer.write_all(&frame).await.is_err() {
                return;
            }
        }
    }
}

fn login_reply(state: &SimState, xml: &str) -> String {
    if state.reject_logins.load(Ordering::SeqCst) {
        return "<loginFailed>login disabled</loginFailed>".to_string();
    }

    let login = text_between(xml, "userName").unwrap_or_default();
    let password = text_between(xml, "pwd").unwrap_or_default();
    let is_server = xml.contains("type=\"Server\"");

    if is_server {
        return "<loginResponce sn=\"SIM-1\" ext=\"\" userId=\"\"/>".to_string();
    }

    match state.users.lock().unwrap().get(&login) {
        Some(user) if user.password == password => format!(
            "<loginResponce sn=\"SIM-1\" ext=\"{}\" userId=\"{}\"/>",
            user.ext, user.jid
        ),
        _ => "<loginFailed>invalid login or password</loginFailed>".to_string(),
    }
}

fn ab_list_reply(state: &SimState) -> String {
    let contacts = state.contacts.lock().unwrap();
    let mut body = format!("<abList total=\"{}\">", contacts.len());
    for contact in contacts.iter() {
        body.push_str(&format!(
            "<abentry><jid>{}</jid><firstName>{}</firstName>\
             <lastName>{}</lastName><ext>{}</ext>\
             <cellPhone>{}</cellPhone><email>{}</email></abentry>",
            contact.jid,
            contact.first_name,
            contact.last_name,
            contact.ext,
            contact.cell_phone,
            contact.email
        ));
    }
    body.push_str("</abList>");
    body
}

fn text_between(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}

/// A contact with only the fields the tests care about.
pub fn contact(jid: &str, first_name: &str, ext: &str) -> Contact {
    Contact {
        jid: jid.to_string(),
        first_name: first_name.to_string(),
        last_name: String::new(),
        ext: ext.to_string(),
        cell_phone: String::new(),
        email: String::new(),
    }
}
