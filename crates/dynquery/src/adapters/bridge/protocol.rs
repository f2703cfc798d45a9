use serde::{Deserialize, Serialize};

use crate::core::context::SessionId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BridgeRequest {
    pub v: u32,
    pub id: String,
    /// Calling scope; requests without one share the "default" session.
    #[serde(default)]
    pub session: Option<String>,
    pub cmd: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl BridgeRequest {
    pub fn session_id(&self) -> SessionId {
        self.session.clone().map(SessionId::new).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct BridgeResponse<T> {
    pub v: u32,
    pub id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> BridgeResponse<T> {
    pub fn ok(v: u32, id: String, data: T) -> Self {
        Self {
            v,
            id,
            status: "ok",
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn err(v: u32, id: String, code: &'static str, error: String) -> Self {
        Self {
            v,
            id,
            status: "error",
            data: None,
            error: Some(error),
            code: Some(code),
        }
    }
}

// Payloads. `connect` takes `Credentials` and `page` takes `PageRequest` directly.

#[derive(Debug, Deserialize)]
pub struct ColumnsPayload {
    pub table: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    pub sql: String,
}
