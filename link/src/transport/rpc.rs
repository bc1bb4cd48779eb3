//! JSON-RPC frame models spoken over the WebSocket transport.
//!
//! Requests carry a client-generated `id` that the server echoes back in the
//! matching response. Live notifications arrive without an `id`; their
//! `result` holds the subscription id, the action and the changed record.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::{LiveAction, LiveNotification, RawStatementResult};

/// Client → server request frame.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    pub params: Vec<JsonValue>,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<JsonValue>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Error object of a failed RPC call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Server → client frame, either a response or a live notification.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// Payload of a live notification frame.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcNotification {
    pub id: String,
    pub action: LiveAction,
    #[serde(default)]
    pub result: JsonValue,
}

impl RpcNotification {
    pub fn into_parts(self) -> (String, LiveNotification) {
        (self.id, LiveNotification::new(self.action, self.result))
    }
}

/// A decoded inbound frame.
#[derive(Debug)]
pub enum Inbound {
    Response {
        id: String,
        outcome: std::result::Result<JsonValue, RpcError>,
    },
    Notification(RpcNotification),
}

/// Decode one text frame. Frames that are neither a response nor a
/// notification yield `Ok(None)`.
pub fn decode_frame(text: &str) -> serde_json::Result<Option<Inbound>> {
    let frame: RpcResponse = serde_json::from_str(text)?;

    match frame.id {
        Some(id) if !id.is_null() => {
            let id = match id {
                JsonValue::String(s) => s,
                other => other.to_string(),
            };
            let outcome = match frame.error {
                Some(error) => Err(error),
                None => Ok(frame.result.unwrap_or(JsonValue::Null)),
            };
            Ok(Some(Inbound::Response { id, outcome }))
        },
        _ => match frame.result {
            Some(result) => match serde_json::from_value::<RpcNotification>(result) {
                Ok(notification) => Ok(Some(Inbound::Notification(notification))),
                Err(_) => Ok(None),
            },
            None => Ok(None),
        },
    }
}

/// Decode the `result` of a `query` call into per-statement results.
pub fn decode_statement_results(result: JsonValue) -> serde_json::Result<Vec<RawStatementResult>> {
    serde_json::from_value(result)
}
