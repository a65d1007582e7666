//! Request and response bodies of the data-plane API

use mxgate_pbx::{CallInfo, Contact};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// `POST /api/login` form.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "login required"))]
    pub login: String,

    #[serde(default)]
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn bearer(access_token: String, expires_in: i64) -> Self {
        Self {
            token_type: "Bearer".to_string(),
            access_token,
            expires_in,
        }
    }
}

/// `POST /api/call` form.
#[derive(Debug, Deserialize, Validate)]
pub struct CallForm {
    #[validate(length(min = 1, message = "to field is empty"))]
    pub to: String,

    /// Calling extension; defaults to the authenticated user's.
    #[serde(default)]
    pub from: String,
}

/// `POST /api/call/hangup` form.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HangupForm {
    pub call_id: u64,

    #[validate(length(min = 1, message = "device id required"))]
    pub device_id: String,
}

/// `POST /api/call/transfer` form.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransferForm {
    pub call_id: u64,

    #[validate(length(min = 1, message = "device id required"))]
    pub device_id: String,

    #[validate(length(min = 1, message = "destination phone required"))]
    pub destination: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallResponse {
    pub call: CallInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactsResponse {
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub monitoring: HashMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RulesResponse {
    pub params: HashMap<String, String>,
}
