use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Server messages meaning the engine cannot serve GraphQL at all.
pub const GRAPHQL_UNSUPPORTED_MESSAGES: [&str; 2] = [
    "Method not found",
    "A GraphQL request was made, but GraphQL is not supported by the context",
];

/// GraphQL request sent over the active session.
///
/// An empty request serializes as `{}`, which is what a support check sends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, JsonValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphqlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Option<Map<String, JsonValue>>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, operation_name: Option<String>) -> Self {
        self.operation_name = operation_name.filter(|name| !name.is_empty());
        self
    }
}

/// Outcome of a GraphQL request.
///
/// Like [`QueryResponse`](super::QueryResponse), failures are data: `result`
/// holds the response document on success and the error message otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    pub success: bool,
    pub result: JsonValue,
}

impl GraphqlResponse {
    pub fn ok(result: JsonValue) -> Self {
        Self {
            success: true,
            result,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: JsonValue::String(message.into()),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            self.result.as_str()
        }
    }
}

/// Whether `message` says GraphQL is unavailable on the engine.
pub fn is_graphql_unsupported(message: &str) -> bool {
    GRAPHQL_UNSUPPORTED_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}
