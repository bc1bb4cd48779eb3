use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Status string the engine reports for a successful statement.
pub const STATUS_OK: &str = "OK";

/// One statement result exactly as the transport reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatementResult {
    /// `"OK"` on success, anything else on failure
    pub status: String,

    /// Server-side execution time (e.g. `"1.2ms"`)
    #[serde(default)]
    pub time: String,

    /// Statement value on success, error description on failure
    #[serde(default)]
    pub result: JsonValue,

    /// Optional extra error detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RawStatementResult {
    pub fn ok(result: JsonValue, time: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            time: time.into(),
            result,
            detail: None,
        }
    }

    pub fn err(message: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            status: "ERR".to_string(),
            time: time.into(),
            result: JsonValue::String(message.into()),
            detail: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}
