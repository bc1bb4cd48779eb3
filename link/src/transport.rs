//! Transport contract between the session core and a database engine.
//!
//! A [`Transport`] is a duplex channel that can authenticate, run query
//! batches and deliver live notifications. The session core never talks to
//! the network directly; it goes through this trait, which keeps the
//! connection manager testable with an in-memory transport.
//!
//! Transports are created per connect attempt by a [`TransportConnector`].

pub mod http;
pub mod rpc;
pub mod ws;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::Credentials;
use crate::error::{Result, StudioLinkError};
use crate::event_handlers::{ConnectionError, DisconnectReason};
use crate::models::{GraphqlRequest, LiveNotification, Protocol, RawStatementResult};
use crate::timeouts::StudioLinkTimeouts;

pub use http::HttpTransport;
pub use ws::WsTransport;

/// Capacity of each per-subscription notification channel.
pub const LIVE_CHANNEL_CAPACITY: usize = 256;

/// Namespace and database selected once the transport is authenticated.
///
/// Empty strings mean "leave unselected".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub namespace: String,
    pub database: String,
}

impl OpenOptions {
    pub fn new(namespace: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            database: database.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.database.is_empty()
    }
}

/// Events a transport emits on its own initiative.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The channel closed without the session core asking for it.
    Disconnected(DisconnectReason),
    /// A non-fatal transport error.
    Error(ConnectionError),
}

/// Sender half handed to [`Transport::connect`].
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Duplex channel to a database engine.
///
/// The connection manager drives a transport through this sequence:
/// `connect` → one of `signin`/`signup`/`authenticate`/`invalidate` (the
/// prepare step) →
/// `use_scope` → queries and live subscriptions → `close`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the channel. Unsolicited disconnects are reported on `events`.
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<()>;

    /// Sign in with system-user or record credentials. Returns the issued
    /// access token, if any.
    async fn signin(&self, credentials: &Credentials) -> Result<Option<String>>;

    /// Sign up through a record access method. Returns the issued access
    /// token, if any.
    async fn signup(&self, credentials: &Credentials) -> Result<Option<String>>;

    /// Re-authenticate with a pre-issued token.
    async fn authenticate(&self, token: &str) -> Result<()>;

    /// Drop the authentication of the current session.
    async fn invalidate(&self) -> Result<()>;

    /// Select namespace and database for subsequent queries.
    async fn use_scope(&self, options: &OpenOptions) -> Result<()>;

    /// Run a query batch, returning one raw result per statement.
    async fn query(
        &self,
        text: &str,
        variables: Option<Map<String, JsonValue>>,
    ) -> Result<Vec<RawStatementResult>>;

    /// Send a GraphQL request, returning the response document. An engine
    /// without GraphQL support answers with an error.
    async fn graphql(&self, request: &GraphqlRequest) -> Result<JsonValue>;

    /// Start receiving notifications for a live subscription id.
    async fn subscribe_live(&self, id: &str) -> Result<mpsc::Receiver<LiveNotification>>;

    /// Kill a live subscription.
    async fn kill(&self, id: &str) -> Result<()>;

    /// Close the channel. Does not emit [`TransportEvent::Disconnected`].
    async fn close(&self) -> Result<()>;
}

/// Creates a fresh transport for each connect attempt.
pub trait TransportConnector: Send + Sync {
    fn create(
        &self,
        protocol: Protocol,
        timeouts: &StudioLinkTimeouts,
    ) -> Result<Arc<dyn Transport>>;
}

/// Default connector for network protocols.
///
/// `ws`/`wss` get a [`WsTransport`], `http`/`https` an [`HttpTransport`].
/// Embedded engines (`mem`, `indxdb`) need a custom connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkConnector;

impl TransportConnector for NetworkConnector {
    fn create(
        &self,
        protocol: Protocol,
        timeouts: &StudioLinkTimeouts,
    ) -> Result<Arc<dyn Transport>> {
        match protocol {
            Protocol::Ws | Protocol::Wss => Ok(Arc::new(WsTransport::new(timeouts.clone()))),
            Protocol::Http | Protocol::Https => Ok(Arc::new(HttpTransport::new(timeouts)?)),
            Protocol::Mem | Protocol::Indxdb => Err(StudioLinkError::UnsupportedProtocol(format!(
                "{} requires an embedded engine connector",
                protocol
            ))),
        }
    }
}
