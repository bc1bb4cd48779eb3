//! # studio-link
//!
//! Connection and live-query session core for a database studio client.
//!
//! The crate owns one authenticated session to a database engine:
//!
//! - **Connect** with version negotiation and mode-specific authentication
//! - **Query** batches with a bounded wait and uniform per-statement responses
//! - **Live queries** detected in ordinary batches, tracked per tab, with
//!   pushed notifications buffered per tab
//! - **GraphQL** requests over the same session, with a support check
//! - **Recover** from disconnects: state, version and live bookkeeping reset
//!
//! ## Example
//!
//! ```rust,no_run
//! use studio_link::{ConnectionConfig, EventHandlers, Protocol, StudioLinkClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = StudioLinkClient::builder()
//!     .event_handlers(
//!         EventHandlers::new().on_disconnect(|reason| eprintln!("Disconnected: {}", reason)),
//!     )
//!     .build()?;
//!
//! let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000")
//!     .with_namespace("test")
//!     .with_database("test")
//!     .with_root_auth("root", "root");
//! client.connect(&config).await?;
//!
//! client
//!     .execute_user_query("tab-1", "LIVE SELECT * FROM person; SELECT * FROM person;", None)
//!     .await?;
//! for message in client.live_messages("tab-1") {
//!     println!("{} {}", message.action, message.data);
//! }
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod event_handlers;
pub mod live;
pub mod models;
pub mod query;
pub mod timeouts;
pub mod transport;
pub mod version;

pub use auth::Credentials;
pub use client::{StudioLinkClient, StudioLinkClientBuilder};
pub use config::{LinkConfig, LiveConfig};
pub use connection::{ConnectionManager, ConnectionSlot};
pub use error::{Result, StudioLinkError};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use live::{live_statement_indices, LiveQueryRegistry};
pub use models::{
    AuthMode, ConnectionConfig, ConnectionState, GraphqlRequest, GraphqlResponse, LiveAction,
    LiveMessage, LiveNotification, Protocol, QueryResponse, RawStatementResult, RecordField,
};
pub use query::QueryExecutor;
pub use timeouts::{StudioLinkTimeouts, StudioLinkTimeoutsBuilder};
pub use transport::{
    HttpTransport, NetworkConnector, OpenOptions, Transport, TransportConnector, TransportEvent,
    TransportEvents, WsTransport,
};
pub use version::{
    HttpVersionSource, VersionCheck, VersionNegotiator, VersionSource, MINIMUM_VERSION,
};
