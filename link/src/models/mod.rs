//! Data models for the studio-link session core.
//!
//! Connection configuration, lifecycle state, normalized query responses
//! live query messages and GraphQL requests.

pub mod auth_mode;
pub mod connection_config;
pub mod connection_state;
pub mod graphql;
pub mod live_action;
pub mod live_message;
pub mod protocol;
pub mod query_response;
pub mod statement_result;


pub use auth_mode::AuthMode;
pub use connection_config::{ConnectionConfig, RecordField};
pub use connection_state::ConnectionState;
pub use graphql::{is_graphql_unsupported, GraphqlRequest, GraphqlResponse};
pub use live_action::LiveAction;
pub use live_message::{LiveMessage, LiveNotification};
pub use protocol::Protocol;
pub use query_response::QueryResponse;
pub use statement_result::{RawStatementResult, STATUS_OK};
