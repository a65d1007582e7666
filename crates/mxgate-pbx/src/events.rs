//! Inbound CSTA event shapes
//!
//! Call events arrive as XML keyed by `monitorCrossRefID` and are
//! re-serialized as JSON for SSE subscribers; the JSON field names are part
//! of the client contract and must stay stable. Address-book events keep
//! the server-side contact replica current.

use crate::addressbook::Contact;
use mxgate_core::GatewayResult;
use serde::{Deserialize, Serialize};

/// Call event names recognized by the dispatcher.
pub const CALL_EVENT_NAMES: [&str; 5] = [
    "OriginatedEvent",
    "DivertedEvent",
    "DeliveredEvent",
    "EstablishedEvent",
    "ConnectionClearedEvent",
];

/// Address-book event names recognized by the dispatcher.
pub const AB_EVENT_NAMES: [&str; 3] = [
    "AbAddUserEvent",
    "AbUpdateUserEvent",
    "AbDeleteUserEvent",
];

/// Every event name the session subscribes to.
pub fn all_event_names() -> Vec<&'static str> {
    let mut names = AB_EVENT_NAMES.to_vec();
    names.extend(CALL_EVENT_NAMES);
    names
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Custom attached data item carried by some call events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cad {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OriginatedEvent {
    pub call_id: i64,
    pub device_id: String,
    pub calling_device: String,
    pub called_device: String,
    pub cause: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub call_type_flags: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cmds_allowed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DivertedEvent {
    pub call_id: i64,
    pub device_id: String,
    pub diverting_device: String,
    pub new_destination: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_redirection_device: String,
    pub cause: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub call_type_flags: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cmds_allowed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredEvent {
    pub call_id: i64,
    pub device_id: String,
    pub global_call_id: String,
    pub alerting_device: String,
    pub calling_device: String,
    pub called_device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_redirection_device: String,
    pub local_connection_info: String,
    pub cause: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub call_type_flags: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cmds_allowed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cads: Vec<Cad>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstablishedEvent {
    pub call_id: i64,
    pub device_id: String,
    pub global_call_id: String,
    pub answering_device: String,
    pub answering_display_name: String,
    pub calling_device: String,
    pub called_device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_redirection_device: String,
    pub calling_display_name: String,
    pub cause: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub call_type_flags: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cmds_allowed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cads: Vec<Cad>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionClearedEvent {
    pub call_id: i64,
    pub device_id: String,
    pub releasing_device: String,
    pub cause: String,
}

/// Tagged variant over the recognized call event names.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Originated(OriginatedEvent),
    Diverted(DivertedEvent),
    Delivered(DeliveredEvent),
    Established(EstablishedEvent),
    ConnectionCleared(ConnectionClearedEvent),
}

impl CallEvent {
    /// Decode an event by its root element name. Unknown names yield
    /// `None`; malformed payloads for known names are an error.
    pub fn decode(name: &str, xml: &str) -> GatewayResult<Option<Self>> {
        let event = match name {
            "OriginatedEvent" => {
                Self::Originated(quick_xml::de::from_str::<wire::Originated>(xml)?.into())
            }
            "DivertedEvent" => {
                Self::Diverted(quick_xml::de::from_str::<wire::Diverted>(xml)?.into())
            }
            "DeliveredEvent" => {
                Self::Delivered(quick_xml::de::from_str::<wire::Delivered>(xml)?.into())
            }
            "EstablishedEvent" => {
                Self::Established(quick_xml::de::from_str::<wire::Established>(xml)?.into())
            }
            "ConnectionClearedEvent" => Self::ConnectionCleared(
                quick_xml::de::from_str::<wire::ConnectionCleared>(xml)?.into(),
            ),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// The wire element name, used as the SSE event type.
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Originated(_) => "OriginatedEvent",
            CallEvent::Diverted(_) => "DivertedEvent",
            CallEvent::Delivered(_) => "DeliveredEvent",
            CallEvent::Established(_) => "EstablishedEvent",
            CallEvent::ConnectionCleared(_) => "ConnectionClearedEvent",
        }
    }

    /// JSON payload published to subscribers.
    pub fn to_json(&self) -> GatewayResult<String> {
        let json = match self {
            CallEvent::Originated(e) => serde_json::to_string(e)?,
            CallEvent::Diverted(e) => serde_json::to_string(e)?,
            CallEvent::Delivered(e) => serde_json::to_string(e)?,
            CallEvent::Established(e) => serde_json::to_string(e)?,
            CallEvent::ConnectionCleared(e) => serde_json::to_string(e)?,
        };
        Ok(json)
    }
}

/// Extract the monitor cross-reference id any call event carries.
pub fn monitor_cross_ref(xml: &str) -> GatewayResult<i64> {
    #[derive(Deserialize)]
    struct Monitored {
        #[serde(rename = "monitorCrossRefID")]
        id: i64,
    }
    Ok(quick_xml::de::from_str::<Monitored>(xml)?.id)
}

/// Payload of `AbAddUserEvent` / `AbUpdateUserEvent`.
pub fn decode_ab_entry(xml: &str) -> GatewayResult<Contact> {
    #[derive(Deserialize)]
    struct AbEntryEvent {
        abentry: wire::AbEntry,
    }
    Ok(quick_xml::de::from_str::<AbEntryEvent>(xml)?.abentry.into())
}

/// Payload of `AbDeleteUserEvent`.
pub fn decode_ab_delete(xml: &str) -> GatewayResult<String> {
    #[derive(Deserialize)]
    struct AbDeleteEvent {
        #[serde(rename = "userId")]
        user_id: String,
    }
    Ok(quick_xml::de::from_str::<AbDeleteEvent>(xml)?.user_id)
}

/// One page of the bulk address-book fetch.
#[derive(Debug)]
pub struct AbPage {
    pub total: usize,
    pub contacts: Vec<Contact>,
}

/// Decode an `abList` reply page.
pub fn decode_ab_page(xml: &str) -> GatewayResult<AbPage> {
    let page = quick_xml::de::from_str::<wire::AbList>(xml)?;
    Ok(AbPage {
        total: page.total,
        contacts: page.abentry.into_iter().map(Contact::from).collect(),
    })
}

/// The XML tree shapes as the PBX sends them.
mod wire {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    pub struct Connection {
        #[serde(rename = "callID", default)]
        pub call_id: i64,
        #[serde(rename = "deviceID", default)]
        pub device_id: String,
        #[serde(rename = "globalCallID", default)]
        pub global_call_id: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Device {
        #[serde(rename = "deviceIdentifier", default)]
        pub device_identifier: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct WireCad {
        #[serde(rename = "@name", default)]
        pub name: String,
        #[serde(rename = "@type", default)]
        pub kind: String,
        #[serde(rename = "$text", default)]
        pub value: String,
    }

    impl From<WireCad> for Cad {
        fn from(cad: WireCad) -> Self {
            Cad {
                name: cad.name,
                kind: cad.kind,
                value: cad.value,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct Originated {
        #[serde(rename = "originatedConnection", default)]
        pub connection: Connection,
        #[serde(rename = "callingDevice", default)]
        pub calling_device: Device,
        #[serde(rename = "calledDevice", default)]
        pub called_device: Device,
        #[serde(default)]
        pub cause: String,
        #[serde(rename = "callTypeFlags", default)]
        pub call_type_flags: u32,
        #[serde(rename = "cmdsAllowed", default)]
        pub cmds_allowed: u32,
    }

    impl From<Originated> for OriginatedEvent {
        fn from(e: Originated) -> Self {
            OriginatedEvent {
                call_id: e.connection.call_id,
                device_id: e.connection.device_id,
                calling_device: e.calling_device.device_identifier,
                called_device: e.called_device.device_identifier,
                cause: e.cause,
                call_type_flags: e.call_type_flags,
                cmds_allowed: e.cmds_allowed,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct Diverted {
        #[serde(default)]
        pub connection: Connection,
        #[serde(rename = "divertingDevice", default)]
        pub diverting_device: Device,
        #[serde(rename = "newDestination", default)]
        pub new_destination: Device,
        #[serde(rename = "lastRedirectionDevice", default)]
        pub last_redirection_device: Device,
        #[serde(default)]
        pub cause: String,
        #[serde(rename = "callTypeFlags", default)]
        pub call_type_flags: u32,
        #[serde(rename = "cmdsAllowed", default)]
        pub cmds_allowed: u32,
    }

    impl From<Diverted> for DivertedEvent {
        fn from(e: Diverted) -> Self {
            DivertedEvent {
                call_id: e.connection.call_id,
                device_id: e.connection.device_id,
                diverting_device: e.diverting_device.device_identifier,
                new_destination: e.new_destination.device_identifier,
                last_redirection_device: e.last_redirection_device.device_identifier,
                cause: e.cause,
                call_type_flags: e.call_type_flags,
                cmds_allowed: e.cmds_allowed,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct Delivered {
        #[serde(default)]
        pub connection: Connection,
        #[serde(rename = "alertingDevice", default)]
        pub alerting_device: Device,
        #[serde(rename = "callingDevice", default)]
        pub calling_device: Device,
        #[serde(rename = "calledDevice", default)]
        pub called_device: Device,
        #[serde(rename = "lastRedirectionDevice", default)]
        pub last_redirection_device: Device,
        #[serde(rename = "localConnectionInfo", default)]
        pub local_connection_info: String,
        #[serde(default)]
        pub cause: String,
        #[serde(rename = "callTypeFlags", default)]
        pub call_type_flags: u32,
        #[serde(rename = "cmdsAllowed", default)]
        pub cmds_allowed: u32,
        #[serde(rename = "cad", default)]
        pub cads: Vec<WireCad>,
    }

    impl From<Delivered> for DeliveredEvent {
        fn from(e: Delivered) -> Self {
            DeliveredEvent {
                call_id: e.connection.call_id,
                device_id: e.connection.device_id,
                global_call_id: e.connection.global_call_id,
                alerting_device: e.alerting_device.device_identifier,
                calling_device: e.calling_device.device_identifier,
                called_device: e.called_device.device_identifier,
                last_redirection_device: e.last_redirection_device.device_identifier,
                local_connection_info: e.local_connection_info,
                cause: e.cause,
                call_type_flags: e.call_type_flags,
                cmds_allowed: e.cmds_allowed,
                cads: e.cads.into_iter().map(Cad::from).collect(),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct Established {
        #[serde(rename = "establishedConnection", default)]
        pub connection: Connection,
        #[serde(rename = "answeringDevice", default)]
        pub answering_device: Device,
        #[serde(rename = "answeringDisplayName", default)]
        pub answering_display_name: String,
        #[serde(rename = "callingDevice", default)]
        pub calling_device: Device,
        #[serde(rename = "calledDevice", default)]
        pub called_device: Device,
        #[serde(rename = "lastRedirectionDevice", default)]
        pub last_redirection_device: Device,
        #[serde(rename = "callingDisplayName", default)]
        pub calling_display_name: String,
        #[serde(default)]
        pub cause: String,
        #[serde(rename = "callTypeFlags", default)]
        pub call_type_flags: u32,
        #[serde(rename = "cmdsAllowed", default)]
        pub cmds_allowed: u32,
        #[serde(rename = "cad", default)]
        pub cads: Vec<WireCad>,
    }

    impl From<Established> for EstablishedEvent {
        fn from(e: Established) -> Self {
            EstablishedEvent {
                call_id: e.connection.call_id,
                device_id: e.connection.device_id,
                global_call_id: e.connection.global_call_id,
                answering_device: e.answering_device.device_identifier,
                answering_display_name: e.answering_display_name,
                calling_device: e.calling_device.device_identifier,
                called_device: e.called_device.device_identifier,
                last_redirection_device: e.last_redirection_device.device_identifier,
                calling_display_name: e.calling_display_name,
                cause: e.cause,
                call_type_flags: e.call_type_flags,
                cmds_allowed: e.cmds_allowed,
                cads: e.cads.into_iter().map(Cad::from).collect(),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct ConnectionCleared {
        #[serde(rename = "droppedConnection", default)]
        pub connection: Connection,
        #[serde(rename = "releasingDevice", default)]
        pub releasing_device: Device,
        #[serde(default)]
        pub cause: String,
    }

    impl From<ConnectionCleared> for ConnectionClearedEvent {
        fn from(e: ConnectionCleared) -> Self {
            ConnectionClearedEvent {
                call_id: e.connection.call_id,
                device_id: e.connection.device_id,
                releasing_device: e.releasing_device.device_identifier,
                cause: e.cause,
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct AbEntry {
        #[serde(default)]
        pub jid: String,
        #[serde(rename = "firstName", default)]
        pub first_name: String,
        #[serde(rename = "lastName", default)]
        pub last_name: String,
        #[serde(default)]
        pub ext: String,
        #[serde(rename = "cellPhone", default)]
        pub cell_phone: String,
        #[serde(default)]
        pub email: String,
    }

    impl From<AbEntry> for Contact {
        fn from(e: AbEntry) -> Self {
            Contact {
                jid: e.jid,
                first_name: e.first_name,
                last_name: e.last_name,
                ext: e.ext,
                cell_phone: e.cell_phone,
                email: e.email,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct AbList {
        #[serde(rename = "@total", default)]
        pub total: usize,
        #[serde(default)]
        pub abentry: Vec<AbEntry>,
    }
}
