use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Normalized result of one statement in a submitted batch.
///
/// Query failures are data: inspect `success` instead of relying on errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,

    /// Statement value on success, error message (string) on failure
    pub result: JsonValue,

    /// Execution time reported by the engine, empty when unknown
    pub execution_time: String,
}

impl QueryResponse {
    pub fn ok(result: JsonValue, execution_time: impl Into<String>) -> Self {
        Self {
            success: true,
            result,
            execution_time: execution_time.into(),
        }
    }

    pub fn failure(message: impl Into<String>, execution_time: impl Into<String>) -> Self {
        Self {
            success: false,
            result: JsonValue::String(message.into()),
            execution_time: execution_time.into(),
        }
    }

    /// Error message of a failed statement.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            self.result.as_str()
        }
    }

    /// Live subscription id returned by a successful LIVE statement.
    ///
    /// Only a UUID result counts; any other value yields `None`.
    pub fn live_query_id(&self) -> Option<Uuid> {
        if !self.success {
            return None;
        }
        self.result.as_str().and_then(|s| Uuid::parse_str(s).ok())
    }
}
