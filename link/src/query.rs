//! Query batch execution against the active session.

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::connection::ConnectionSlot;
use crate::error::{Result, StudioLinkError};
use crate::models::{
    is_graphql_unsupported, GraphqlRequest, GraphqlResponse, QueryResponse, RawStatementResult,
};
use crate::timeouts::StudioLinkTimeouts;

/// Runs query batches with a bounded wait.
///
/// Query-level failures (a statement error, a timeout, a transport error
/// while submitting) come back as failed [`QueryResponse`]s. Only a missing
/// session or malformed variables fail the call itself.
#[derive(Clone)]
pub struct QueryExecutor {
    slot: Arc<ConnectionSlot>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(slot: Arc<ConnectionSlot>, timeout: Duration) -> Self {
        Self { slot, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a batch, returning one response per statement.
    ///
    /// `variables` is JSON object text; `None` or blank text means no
    /// variables. When the timeout fires first the result is a single failed
    /// response whose message contains "timed out"; the pending request is
    /// released and a late answer is discarded.
    pub async fn execute(&self, text: &str, variables: Option<&str>) -> Result<Vec<QueryResponse>> {
        let transport = self.slot.active_transport()?;
        let variables = parse_variables(variables)?;

        let preview: String = text.chars().take(80).collect();
        debug!(
            "[LINK_QUERY] Starting query: \"{}\" (len={})",
            preview.replace('\n', " "),
            text.len()
        );

        let start = Instant::now();
        let submission = transport.query(text, variables);
        let outcome = if StudioLinkTimeouts::is_no_timeout(self.timeout) {
            Ok(submission.await)
        } else {
            tokio::time::timeout(self.timeout, submission).await
        };

        match outcome {
            Err(_) => {
                warn!("[LINK_QUERY] Timed out after {:?}", self.timeout);
                Ok(vec![QueryResponse::failure(
                    format!("Request timed out after {:?}", self.timeout),
                    "",
                )])
            },
            Ok(Err(e)) => {
                warn!("[LINK_QUERY] Submission failed: {}", e);
                Ok(vec![QueryResponse::failure(e.to_string(), "")])
            },
            Ok(Ok(results)) => {
                debug!(
                    "[LINK_QUERY] Success: statements={} total_ms={}",
                    results.len(),
                    start.elapsed().as_millis()
                );
                Ok(results.into_iter().map(normalize_statement).collect())
            },
        }
    }

    /// Execute a batch and return its first response.
    pub async fn execute_first(&self, text: &str, variables: Option<&str>) -> Result<QueryResponse> {
        self.execute(text, variables)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudioLinkError::ServerError("Query returned no results".to_string()))
    }

    /// Execute a batch and return the first record of its first response.
    ///
    /// A failed first statement becomes [`StudioLinkError::ServerError`].
    pub async fn execute_single(&self, text: &str, variables: Option<&str>) -> Result<JsonValue> {
        let response = self.execute_first(text, variables).await?;
        if !response.success {
            let message = response.error_message().unwrap_or("Query failed").to_string();
            return Err(StudioLinkError::ServerError(message));
        }

        Ok(match response.result {
            JsonValue::Array(mut rows) => {
                if rows.is_empty() {
                    JsonValue::Null
                } else {
                    rows.swap_remove(0)
                }
            },
            other => other,
        })
    }

    /// Send a GraphQL request over the active session.
    ///
    /// Like [`execute`](Self::execute), a rejected request or a timeout comes
    /// back as a failed [`GraphqlResponse`] carrying the message.
    pub async fn execute_graphql(
        &self,
        query: &str,
        variables: Option<&str>,
        operation_name: Option<&str>,
    ) -> Result<GraphqlResponse> {
        let transport = self.slot.active_transport()?;
        let request = GraphqlRequest::new(query)
            .with_variables(parse_variables(variables)?)
            .with_operation_name(operation_name.map(str::to_string));

        debug!(
            "[LINK_QUERY] Sending GraphQL request (operation={:?}, len={})",
            request.operation_name,
            query.len()
        );

        let submission = transport.graphql(&request);
        let outcome = if StudioLinkTimeouts::is_no_timeout(self.timeout) {
            Ok(submission.await)
        } else {
            tokio::time::timeout(self.timeout, submission).await
        };

        Ok(match outcome {
            Err(_) => {
                warn!("[LINK_QUERY] GraphQL request timed out after {:?}", self.timeout);
                GraphqlResponse::failure(format!("Request timed out after {:?}", self.timeout))
            },
            Ok(Err(e)) => {
                warn!("[LINK_QUERY] GraphQL request failed: {}", e);
                GraphqlResponse::failure(server_message(e))
            },
            Ok(Ok(JsonValue::Null)) => GraphqlResponse::failure("GraphQL request returned no result"),
            Ok(Ok(document)) => GraphqlResponse::ok(document),
        })
    }

    /// Whether the engine behind the active session serves GraphQL.
    ///
    /// Sends an empty request: an engine with GraphQL enabled rejects it as
    /// malformed, one without answers with a known "not supported" message.
    pub async fn check_graphql_support(&self) -> Result<bool> {
        let transport = self.slot.active_transport()?;
        let request = GraphqlRequest::default();
        let submission = transport.graphql(&request);
        let outcome = if StudioLinkTimeouts::is_no_timeout(self.timeout) {
            Ok(submission.await)
        } else {
            tokio::time::timeout(self.timeout, submission).await
        };

        let supported = match outcome {
            Err(_) => {
                warn!("[LINK_QUERY] GraphQL support check timed out");
                false
            },
            Ok(Ok(_)) => false,
            Ok(Err(e)) => !is_graphql_unsupported(&e.to_string()),
        };
        debug!("[LINK_QUERY] GraphQL supported: {}", supported);
        Ok(supported)
    }
}

/// Message of a server rejection without the error-kind prefix.
fn server_message(error: StudioLinkError) -> String {
    match error {
        StudioLinkError::ServerError(message) => message,
        other => other.to_string(),
    }
}

/// Parse variables text into a JSON object.
pub fn parse_variables(text: Option<&str>) -> Result<Option<Map<String, JsonValue>>> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    match serde_json::from_str::<JsonValue>(text) {
        Ok(JsonValue::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(StudioLinkError::InvalidVariables(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(StudioLinkError::InvalidVariables(e.to_string())),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Map a raw statement result onto the uniform response shape.
pub fn normalize_statement(raw: RawStatementResult) -> QueryResponse {
    if raw.is_ok() {
        return QueryResponse::ok(raw.result, raw.time);
    }

    let message = match raw.detail {
        Some(detail) => detail,
        None => match raw.result {
            JsonValue::String(message) => message,
            JsonValue::Null => format!("Statement failed with status {}", raw.status),
            other => other.to_string(),
        },
    };
    QueryResponse::failure(message, raw.time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_variables() {
        assert!(parse_variables(None).unwrap().is_none());
        assert!(parse_variables(Some("   ")).unwrap().is_none());

        let map = parse_variables(Some(r#"{"name": "tobie"}"#)).unwrap().unwrap();
        assert_eq!(map["name"], "tobie");
    }

    #[test]
    fn test_parse_variables_rejects_non_objects() {
        assert!(matches!(
            parse_variables(Some("[1, 2]")),
            Err(StudioLinkError::InvalidVariables(_))
        ));
        assert!(matches!(
            parse_variables(Some("{name: ")),
            Err(StudioLinkError::InvalidVariables(_))
        ));
    }

    #[test]
    fn test_normalize_ok() {
        let response = normalize_statement(RawStatementResult::ok(json!([{"id": 1}]), "1.2ms"));
        assert!(response.success);
        assert_eq!(response.execution_time, "1.2ms");
        assert_eq!(response.result, json!([{"id": 1}]));
    }

    #[test]
    fn test_normalize_error_variants() {
        let response = normalize_statement(RawStatementResult::err("Parse error", "0.1ms"));
        assert!(!response.success);
        assert_eq!(response.error_message(), Some("Parse error"));

        let mut raw = RawStatementResult::err("ignored", "");
        raw.detail = Some("Detailed failure".into());
        assert_eq!(normalize_statement(raw).error_message(), Some("Detailed failure"));

        let raw = RawStatementResult {
            status: "ERR".into(),
            time: String::new(),
            result: json!({"code": 7}),
            detail: None,
        };
        assert_eq!(normalize_statement(raw).error_message(), Some(r#"{"code":7}"#));
    }
}
