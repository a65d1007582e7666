//! Outbound CSTA command shapes
//!
//! Element names are wire-visible; the structs serialize to exactly the
//! XML the PBX expects.

use mxgate_core::GatewayResult;
use serde::Serialize;

/// Serialize a command to its XML wire form.
pub fn to_xml<T: Serialize>(cmd: &T) -> GatewayResult<String> {
    Ok(quick_xml::se::to_string(cmd)?)
}

/// Role of a PBX bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginType {
    /// The long-lived monitoring session.
    Server,
    /// An ephemeral credential-verification bind.
    User,
}

impl LoginType {
    fn as_str(self) -> &'static str {
        match self {
            LoginType::Server => "Server",
            LoginType::User => "User",
        }
    }

    fn platform(self) -> &'static str {
        match self {
            LoginType::Server => "iPhone",
            LoginType::User => "CRM",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "loginRequest")]
pub struct LoginRequest {
    #[serde(rename = "@type")]
    pub login_type: String,
    #[serde(rename = "@platform")]
    pub platform: String,
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub pwd: String,
}

impl LoginRequest {
    pub fn new(login_type: LoginType, user_name: &str, password: &str) -> Self {
        Self {
            login_type: login_type.as_str().to_string(),
            platform: login_type.platform().to_string(),
            version: "1.0".to_string(),
            user_name: user_name.to_string(),
            pwd: password.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "logout")]
pub struct Logout;

#[derive(Debug, Serialize)]
#[serde(rename = "MonitorStart")]
pub struct MonitorStart {
    #[serde(rename = "monitorObject")]
    pub monitor_object: MonitorObject,
}

#[derive(Debug, Serialize)]
pub struct MonitorObject {
    #[serde(rename = "deviceObject")]
    pub device_object: String,
}

impl MonitorStart {
    pub fn device(ext: &str) -> Self {
        Self {
            monitor_object: MonitorObject {
                device_object: ext.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "MonitorStop")]
pub struct MonitorStop {
    #[serde(rename = "monitorCrossRefID")]
    pub monitor_cross_ref_id: i64,
}

/// Subscribes the session to address-book change events.
#[derive(Debug, Serialize)]
#[serde(rename = "MonitorStartAb")]
pub struct MonitorStartAb;

/// Bulk address-book page request, `index` is the first entry wanted.
#[derive(Debug, Serialize)]
#[serde(rename = "AddressbookList")]
pub struct AddressbookList {
    #[serde(rename = "@index")]
    pub index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename = "MakeCall")]
pub struct MakeCall {
    #[serde(rename = "callingDevice")]
    pub calling_device: CallingDevice,
    #[serde(rename = "calledDirectoryNumber")]
    pub called_directory_number: String,
}

#[derive(Debug, Serialize)]
pub struct CallingDevice {
    #[serde(rename = "@typeOfNumber")]
    pub type_of_number: String,
    #[serde(rename = "$text")]
    pub ext: String,
}

impl MakeCall {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            calling_device: CallingDevice {
                type_of_number: "deviceID".to_string(),
                ext: from.to_string(),
            },
            called_directory_number: to.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectionRef {
    #[serde(rename = "callID")]
    pub call_id: u64,
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "ClearConnection")]
pub struct ClearConnection {
    #[serde(rename = "connectionToBeCleared")]
    pub connection_to_be_cleared: ConnectionRef,
}

impl ClearConnection {
    pub fn new(call_id: u64, device_id: &str) -> Self {
        Self {
            connection_to_be_cleared: ConnectionRef {
                call_id,
                device_id: device_id.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "SingleStepTransferCall")]
pub struct SingleStepTransferCall {
    #[serde(rename = "activeCall")]
    pub active_call: ConnectionRef,
    #[serde(rename = "transferredTo")]
    pub transferred_to: String,
}

impl SingleStepTransferCall {
    pub fn new(call_id: u64, device_id: &str, destination: &str) -> Self {
        Self {
            active_call: ConnectionRef {
                call_id,
                device_id: device_id.to_string(),
            },
            transferred_to: destination.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_xml() {
        let xml = to_xml(&LoginRequest::new(LoginType::Server, "srv", "pw")).unwrap();
        assert_eq!(
            xml,
            "<loginRequest type=\"Server\" platform=\"iPhone\" version=\"1.0\">\
             <userName>srv</userName><pwd>pw</pwd></loginRequest>"
        );

        let xml = to_xml(&LoginRequest::new(LoginType::User, "alice", "pw")).unwrap();
        assert!(xml.contains("type=\"User\""));
        assert!(xml.contains("platform=\"CRM\""));
    }

    #[test]
    fn test_monitor_start_xml() {
        let xml = to_xml(&MonitorStart::device("3052")).unwrap();
        assert_eq!(
            xml,
            "<MonitorStart><monitorObject><deviceObject>3052</deviceObject>\
             </monitorObject></MonitorStart>"
        );
    }

    #[test]
    fn test_monitor_stop_xml() {
        let xml = to_xml(&MonitorStop {
            monitor_cross_ref_id: 99,
        })
        .unwrap();
        assert_eq!(
            xml,
            "<MonitorStop><monitorCrossRefID>99</monitorCrossRefID></MonitorStop>"
        );
    }

    #[test]
    fn test_unit_commands_xml() {
        assert_eq!(to_xml(&MonitorStartAb).unwrap(), "<MonitorStartAb/>");
        assert_eq!(to_xml(&Logout).unwrap(), "<logout/>");
    }

    #[test]
    fn test_make_call_xml() {
        let xml = to_xml(&MakeCall::new("3052", "+15550100")).unwrap();
        assert_eq!(
            xml,
            "<MakeCall><callingDevice typeOfNumber=\"deviceID\">3052</callingDevice>\
             <calledDirectoryNumber>+15550100</calledDirectoryNumber></MakeCall>"
        );
    }

    #[test]
    fn test_clear_connection_xml() {
        let xml = to_xml(&ClearConnection::new(42, "d1")).unwrap();
        assert_eq!(
            xml,
            "<ClearConnection><connectionToBeCleared><callID>42</callID>\
             <deviceID>d1</deviceID></connectionToBeCleared></ClearConnection>"
        );
    }

    #[test]
    fn test_transfer_xml() {
        let xml = to_xml(&SingleStepTransferCall::new(42, "d1", "3060")).unwrap();
        assert_eq!(
            xml,
            "<SingleStepTransferCall><activeCall><callID>42</callID>\
             <deviceID>d1</deviceID></activeCall>\
             <transferredTo>3060</transferredTo></SingleStepTransferCall>"
        );
    }

    #[test]
    fn test_addressbook_list_xml() {
        let xml = to_xml(&AddressbookList { index: 0 }).unwrap();
        assert_eq!(xml, "<AddressbookList index=\"0\"/>");
    }
}
