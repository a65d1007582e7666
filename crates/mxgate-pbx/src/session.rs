//! The authenticated PBX session
//!
//! One `PbxSession` owns the server-role connection plus everything that
//! only makes sense while it is alive: the monitor registry and the
//! address-book replica. User credential checks never touch the server
//! connection; they run over a second, short-lived bind.

use crate::addressbook::{AddressBook, Contact};
use crate::commands::{
    self, AddressbookList, ClearConnection, LoginRequest, LoginType, Logout, MakeCall,
    MonitorStartAb, SingleStepTransferCall,
};
use crate::events;
use crate::registry::MonitorRegistry;
use crate::transport::{self, Transport};
use mxgate_core::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Identity returned by a successful PBX login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginInfo {
    /// The user's JID (empty for server-role logins)
    pub jid: String,
    /// The user's extension (empty for server-role logins)
    pub ext: String,
    /// Serial of the answering PBX
    pub sn: String,
}

/// Result of a server-side `MakeCall`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallInfo {
    pub call_id: u64,
    pub device_id: String,
    pub called: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireLoginResponse {
    #[serde(rename = "@sn", default)]
    sn: String,
    #[serde(rename = "@ext", default)]
    ext: String,
    #[serde(rename = "@userId", default)]
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireLoginFailed {
    #[serde(rename = "$text", default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct WireMakeCallReply {
    #[serde(rename = "callingDevice", default)]
    calling_device: WireCallReplyDevice,
    #[serde(rename = "calledDevice", default)]
    called_device: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireCallReplyDevice {
    #[serde(rename = "callID", default)]
    call_id: u64,
    #[serde(rename = "deviceID", default)]
    device_id: String,
}

/// One installed server session and its subordinate state.
pub struct PbxSession {
    transport: Transport,
    registry: MonitorRegistry,
    addressbook: AddressBook,
    info: LoginInfo,
}

impl PbxSession {
    /// Open the transport, log in as role `Server`, seed the address book,
    /// subscribe to change events and install the event dispatcher.
    pub async fn install(host: &str, login: &str, password: &str) -> GatewayResult<Arc<Self>> {
        Self::install_with(host, login, password, transport::READ_TIMEOUT).await
    }

    /// As [`install`](Self::install) with an explicit reply timeout.
    pub async fn install_with(
        host: &str,
        login: &str,
        password: &str,
        read_timeout: Duration,
    ) -> GatewayResult<Arc<Self>> {
        info!(host = %host, login = %login, "connecting to pbx");
        let transport = Transport::connect_with(host, read_timeout).await?;

        let info = match Self::login(&transport, LoginType::Server, login, password).await {
            Ok(info) => info,
            Err(e) => {
                transport.close().await;
                return Err(e);
            }
        };

        let session = Arc::new(Self {
            transport,
            registry: MonitorRegistry::new(),
            addressbook: AddressBook::new(),
            info,
        });

        if let Err(e) = session.bootstrap().await {
            session.shutdown().await;
            return Err(e);
        }

        let weak = Arc::downgrade(&session);
        session
            .transport
            .handle(&events::all_event_names(), move |name, xml| {
                if let Some(session) = weak.upgrade() {
                    session.dispatch(name, xml);
                }
                Ok(())
            });

        info!(
            host = %host,
            sn = %session.info.sn,
            contacts = session.addressbook.len(),
            "pbx session installed"
        );
        Ok(session)
    }

    /// Verify end-user credentials over an ephemeral user-role bind.
    ///
    /// The connection is logged out and closed before this returns; it is
    /// never shared with the server session.
    pub async fn verify_user(
        host: &str,
        login: &str,
        password: &str,
    ) -> GatewayResult<LoginInfo> {
        info!(login = %login, "checking pbx user credentials");
        let transport = Transport::connect(host).await?;
        let result = Self::login(&transport, LoginType::User, login, password).await;
        if let Ok(xml) = commands::to_xml(&Logout) {
            let _ = transport.send(&xml).await;
        }
        transport.close().await;
        result
    }

    async fn login(
        transport: &Transport,
        login_type: LoginType,
        login: &str,
        password: &str,
    ) -> GatewayResult<LoginInfo> {
        let request = commands::to_xml(&LoginRequest::new(login_type, login, password))?;
        let reply = transport.send_await(&request).await?;

        match transport::root_name(&reply).as_deref() {
            Some("loginResponce") => {
                let parsed: WireLoginResponse = quick_xml::de::from_str(&reply)?;
                Ok(LoginInfo {
                    jid: parsed.user_id,
                    ext: parsed.ext,
                    sn: parsed.sn,
                })
            }
            Some("loginFailed") => {
                let parsed: WireLoginFailed =
                    quick_xml::de::from_str(&reply).unwrap_or_default();
                let reason = if parsed.reason.is_empty() {
                    "login failed".to_string()
                } else {
                    parsed.reason
                };
                Err(GatewayError::LoginRejected(reason))
            }
            other => Err(GatewayError::PbxUnavailable(format!(
                "unexpected login reply: {}",
                other.unwrap_or("<empty>")
            ))),
        }
    }

    /// Seed the address book and subscribe to its change events.
    async fn bootstrap(&self) -> GatewayResult<()> {
        let mut index = 0;
        loop {
            let request = commands::to_xml(&AddressbookList { index })?;
            let reply = self.transport.send_await(&request).await?;
            let page = events::decode_ab_page(&reply)?;
            let fetched = page.contacts.len();
            for contact in page.contacts {
                self.addressbook.upsert(contact);
            }
            index += fetched;
            if fetched == 0 || index >= page.total {
                break;
            }
        }

        self.transport
            .send_await(&commands::to_xml(&MonitorStartAb)?)
            .await?;
        Ok(())
    }

    /// Route one inbound event. Runs on the transport reader task;
    /// per-event failures are logged and skipped, never fatal.
    fn dispatch(&self, name: &str, xml: &str) {
        match name {
            "AbAddUserEvent" | "AbUpdateUserEvent" => match events::decode_ab_entry(xml) {
                Ok(contact) => {
                    debug!(jid = %contact.jid, "contact updated");
                    self.addressbook.upsert(contact);
                }
                Err(e) => warn!(event = %name, error = %e, "address book event parse error"),
            },
            "AbDeleteUserEvent" => match events::decode_ab_delete(xml) {
                Ok(jid) => {
                    debug!(jid = %jid, "contact deleted");
                    self.addressbook.remove(&jid);
                }
                Err(e) => warn!(event = %name, error = %e, "address book event parse error"),
            },
            _ => self.dispatch_call_event(name, xml),
        }
    }

    fn dispatch_call_event(&self, name: &str, xml: &str) {
        let monitor_id = match events::monitor_cross_ref(xml) {
            Ok(id) => id,
            Err(e) => {
                warn!(event = %name, error = %e, "bad monitored event format");
                return;
            }
        };
        let Some(entry) = self.registry.lookup(monitor_id) else {
            warn!(event = %name, monitor_id, "event for unmonitored id dropped");
            return;
        };

        let event = match events::CallEvent::decode(name, xml) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event = %name, "unrecognized event name ignored");
                return;
            }
            Err(e) => {
                warn!(event = %name, error = %e, "event decode error");
                return;
            }
        };
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event = %name, error = %e, "event encode error");
                return;
            }
        };

        entry.broker.publish(name, payload);
        info!(
            event = %name,
            ext = %entry.extension,
            subscribers = entry.broker.connected(),
            "monitoring event"
        );
    }

    /// Start a call monitor for `ext`; idempotent.
    pub async fn monitor_start(&self, ext: &str) -> GatewayResult<i64> {
        self.registry.start(&self.transport, ext).await
    }

    /// Stop the call monitor for `ext`; idempotent.
    pub async fn monitor_stop(&self, ext: &str) -> GatewayResult<()> {
        self.registry.stop(&self.transport, ext).await
    }

    /// Place a server-side call from `from` to `to`.
    pub async fn make_call(&self, from: &str, to: &str) -> GatewayResult<CallInfo> {
        let request = commands::to_xml(&MakeCall::new(from, to))?;
        let reply = self.transport.send_await(&request).await?;
        let parsed: WireMakeCallReply = quick_xml::de::from_str(&reply)?;

        debug!(ext = %from, to = %to, call_id = parsed.calling_device.call_id, "make call");
        Ok(CallInfo {
            call_id: parsed.calling_device.call_id,
            device_id: parsed.calling_device.device_id,
            called: parsed.called_device,
        })
    }

    /// Drop a connection; fire-and-forget.
    pub async fn hangup(&self, call_id: u64, device_id: &str) -> GatewayResult<()> {
        self.transport
            .send(&commands::to_xml(&ClearConnection::new(call_id, device_id))?)
            .await
    }

    /// Single-step transfer of an active call; fire-and-forget.
    pub async fn transfer(
        &self,
        call_id: u64,
        device_id: &str,
        destination: &str,
    ) -> GatewayResult<()> {
        self.transport
            .send(&commands::to_xml(&SingleStepTransferCall::new(
                call_id,
                device_id,
                destination,
            ))?)
            .await
    }

    /// Contacts snapshot sorted by extension.
    pub fn contacts(&self) -> Vec<Contact> {
        self.addressbook.snapshot()
    }

    /// Subscriber counts per monitored extension.
    pub fn connection_info(&self) -> HashMap<String, usize> {
        self.registry.connection_info()
    }

    /// Identity of the server login.
    pub fn info(&self) -> &LoginInfo {
        &self.info
    }

    /// The session's monitor registry.
    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    /// Termination signal of the underlying transport.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.transport.done()
    }

    /// True once the underlying transport has terminated.
    pub fn is_terminated(&self) -> bool {
        self.transport.is_terminated()
    }

    /// Close every broker, drop all monitors and terminate the transport.
    pub async fn shutdown(&self) {
        self.registry.close_all();
        self.transport.close().await;
    }
}
