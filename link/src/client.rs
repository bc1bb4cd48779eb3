//! Session client with builder pattern.
//!
//! [`StudioLinkClient`] is the handle UI code holds: it owns one session,
//! runs queries against it and keeps per-tab query responses, live
//! messages and the last GraphQL response. Clones share the same session.

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::LinkConfig;
use crate::connection::{ConnectionManager, ConnectionSlot};
use crate::error::{Result, StudioLinkError};
use crate::event_handlers::EventHandlers;
use crate::live::{LiveQueryRegistry, DEFAULT_MESSAGE_CAPACITY};
use crate::models::{
    ConnectionConfig, ConnectionState, GraphqlResponse, LiveMessage, Protocol, QueryResponse,
};
use crate::query::QueryExecutor;
use crate::timeouts::StudioLinkTimeouts;
use crate::transport::{NetworkConnector, TransportConnector};
use crate::version::{HttpVersionSource, VersionNegotiator, VersionSource, MINIMUM_VERSION};

/// Handle to a database session.
///
/// Use [`StudioLinkClientBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use studio_link::{ConnectionConfig, Protocol, StudioLinkClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = StudioLinkClient::builder()
///     .query_timeout(std::time::Duration::from_secs(10))
///     .build()?;
///
/// let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000")
///     .with_namespace("test")
///     .with_database("test")
///     .with_root_auth("root", "root");
/// client.connect(&config).await?;
///
/// let responses = client.execute_user_query("tab-1", "LIVE SELECT * FROM person", None).await?;
/// println!("{:?}", responses);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StudioLinkClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    slot: Arc<ConnectionSlot>,
    manager: ConnectionManager,
    executor: QueryExecutor,
    live: Arc<LiveQueryRegistry>,
    timeouts: StudioLinkTimeouts,
    default_connection: Option<ConnectionConfig>,
    responses: Mutex<HashMap<String, Vec<QueryResponse>>>,
    active_queries: AtomicUsize,
    graphql_response: Mutex<Option<GraphqlResponse>>,
    active_graphql: AtomicUsize,
}

struct ActiveQuery<'a>(&'a AtomicUsize);

impl<'a> ActiveQuery<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveQuery<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StudioLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> StudioLinkClientBuilder {
        StudioLinkClientBuilder::new()
    }

    /// Connect to `config`, replacing any existing session.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        self.inner.manager.connect(Some(config)).await
    }

    /// Connect to the connection given at build time (or in the config file).
    ///
    /// Fails with [`StudioLinkError::NoConnection`] when none was given.
    pub async fn connect_configured(&self) -> Result<()> {
        self.inner
            .manager
            .connect(self.inner.default_connection.as_ref())
            .await
    }

    /// Close the session. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.inner.manager.disconnect().await;
    }

    /// Execute a query batch, one response per statement.
    ///
    /// # Example
    /// ```rust,no_run
    /// # async fn example(client: studio_link::StudioLinkClient) -> studio_link::Result<()> {
    /// let responses = client
    ///     .execute_query("SELECT * FROM person WHERE age > $age", Some(r#"{"age": 18}"#))
    ///     .await?;
    /// for response in responses {
    ///     if !response.success {
    ///         eprintln!("failed: {:?}", response.error_message());
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_query(&self, text: &str, variables: Option<&str>) -> Result<Vec<QueryResponse>> {
        self.inner.executor.execute(text, variables).await
    }

    /// First response of a batch.
    pub async fn execute_first(&self, text: &str, variables: Option<&str>) -> Result<QueryResponse> {
        self.inner.executor.execute_first(text, variables).await
    }

    /// First record of the first response of a batch.
    pub async fn execute_single(&self, text: &str, variables: Option<&str>) -> Result<JsonValue> {
        self.inner.executor.execute_single(text, variables).await
    }

    /// Run a tab's batch: executes it, replaces the tab's live queries and
    /// stores the responses for the tab.
    pub async fn execute_user_query(
        &self,
        tab: &str,
        text: &str,
        variables: Option<&str>,
    ) -> Result<Vec<QueryResponse>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let _active = ActiveQuery::enter(&self.inner.active_queries);
        let responses = self.inner.live.run_user_query(tab, text, variables).await?;
        self.inner
            .responses
            .lock()
            .insert(tab.to_string(), responses.clone());
        Ok(responses)
    }

    /// Kill the live queries of a tab.
    pub async fn cancel_live_queries(&self, tab: &str) {
        self.inner.live.cancel(tab).await;
    }

    /// Forget a tab: kills its live queries, drops its messages and
    /// responses.
    pub async fn close_tab(&self, tab: &str) {
        self.inner.live.remove_tab(tab).await;
        self.inner.responses.lock().remove(tab);
    }

    /// Send a GraphQL request and keep its response as the client's last
    /// GraphQL response.
    ///
    /// `variables` is JSON object text, like for [`execute_query`](Self::execute_query).
    pub async fn execute_graphql(
        &self,
        query: &str,
        variables: Option<&str>,
        operation_name: Option<&str>,
    ) -> Result<GraphqlResponse> {
        let _active = ActiveQuery::enter(&self.inner.active_graphql);
        let response = self
            .inner
            .executor
            .execute_graphql(query, variables, operation_name)
            .await?;
        *self.inner.graphql_response.lock() = Some(response.clone());
        Ok(response)
    }

    /// Whether the connected engine serves GraphQL.
    pub async fn check_graphql_support(&self) -> Result<bool> {
        self.inner.executor.check_graphql_support().await
    }

    /// Response of the last GraphQL request.
    pub fn graphql_response(&self) -> Option<GraphqlResponse> {
        self.inner.graphql_response.lock().clone()
    }

    /// Returns `true` while a GraphQL request is running.
    pub fn is_graphql_active(&self) -> bool {
        self.inner.active_graphql.load(Ordering::SeqCst) > 0
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.slot.state()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.slot.subscribe_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Engine version of the current session, if known.
    pub fn version(&self) -> Option<String> {
        self.inner.slot.version()
    }

    /// Access token issued while connecting, if any.
    pub fn access_token(&self) -> Option<String> {
        self.inner.slot.access_token()
    }

    /// Protocol of the current session.
    pub fn protocol(&self) -> Option<Protocol> {
        self.inner.slot.protocol()
    }

    /// Returns `true` while a tab query is running.
    pub fn is_query_active(&self) -> bool {
        self.inner.active_queries.load(Ordering::SeqCst) > 0
    }

    /// Last responses stored for a tab.
    pub fn responses(&self, tab: &str) -> Vec<QueryResponse> {
        self.inner
            .responses
            .lock()
            .get(tab)
            .cloned()
            .unwrap_or_default()
    }

    /// Live messages of a tab, newest first.
    pub fn live_messages(&self, tab: &str) -> Vec<LiveMessage> {
        self.inner.live.messages(tab)
    }

    pub fn is_live(&self, tab: &str) -> bool {
        self.inner.live.is_live(tab)
    }

    /// Live subscription ids registered for a tab.
    pub fn live_subscriptions(&self, tab: &str) -> Vec<String> {
        self.inner.live.subscriptions(tab)
    }

    pub fn timeouts(&self) -> &StudioLinkTimeouts {
        &self.inner.timeouts
    }
}

/// Builder for configuring [`StudioLinkClient`] instances.
pub struct StudioLinkClientBuilder {
    timeouts: StudioLinkTimeouts,
    event_handlers: EventHandlers,
    connector: Option<Arc<dyn TransportConnector>>,
    version_source: Option<Arc<dyn VersionSource>>,
    minimum_version: String,
    live_buffer_capacity: usize,
    default_connection: Option<ConnectionConfig>,
}

impl StudioLinkClientBuilder {
    fn new() -> Self {
        Self {
            timeouts: StudioLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
            connector: None,
            version_source: None,
            minimum_version: MINIMUM_VERSION.to_string(),
            live_buffer_capacity: DEFAULT_MESSAGE_CAPACITY,
            default_connection: None,
        }
    }

    /// Apply a loaded configuration file.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.timeouts = config.timeouts;
        self.live_buffer_capacity = config.live.buffer_capacity;
        if let Some(minimum) = config.minimum_version {
            self.minimum_version = minimum;
        }
        if config.connection.is_some() {
            self.default_connection = config.connection;
        }
        self
    }

    /// Set comprehensive timeout configuration
    pub fn timeouts(mut self, timeouts: StudioLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the query batch timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.query_timeout = timeout;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Use a custom transport connector (e.g. for embedded engines).
    pub fn connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom source for the remote engine version.
    pub fn version_source(mut self, source: Arc<dyn VersionSource>) -> Self {
        self.version_source = Some(source);
        self
    }

    /// Override the minimum supported engine version.
    pub fn minimum_version(mut self, version: impl Into<String>) -> Self {
        self.minimum_version = version.into();
        self
    }

    /// Number of live messages kept per tab.
    pub fn live_buffer_capacity(mut self, capacity: usize) -> Self {
        self.live_buffer_capacity = capacity;
        self
    }

    /// Connection used by [`StudioLinkClient::connect_configured`].
    pub fn connection(mut self, config: ConnectionConfig) -> Self {
        self.default_connection = Some(config);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<StudioLinkClient> {
        if self.live_buffer_capacity == 0 {
            return Err(StudioLinkError::ConfigurationError(
                "live buffer capacity must be at least 1".into(),
            ));
        }

        let version_source: Arc<dyn VersionSource> = match self.version_source {
            Some(source) => source,
            None => Arc::new(HttpVersionSource::new(self.timeouts.version_check_timeout)?),
        };
        let negotiator = VersionNegotiator::new(version_source, &self.minimum_version)?;
        let connector: Arc<dyn TransportConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(NetworkConnector),
        };

        let slot = Arc::new(ConnectionSlot::new(self.event_handlers));
        let executor = QueryExecutor::new(slot.clone(), self.timeouts.query_timeout);
        let live = Arc::new(LiveQueryRegistry::new(
            slot.clone(),
            executor.clone(),
            self.live_buffer_capacity,
        ));
        let manager = ConnectionManager::new(
            slot.clone(),
            connector,
            negotiator,
            live.clone(),
            self.timeouts.clone(),
        );

        log::debug!(
            "[CLIENT] Built client (minimum_version={}, query_timeout={:?})",
            self.minimum_version,
            self.timeouts.query_timeout
        );

        Ok(StudioLinkClient {
            inner: Arc::new(ClientInner {
                slot,
                manager,
                executor,
                live,
                timeouts: self.timeouts,
                default_connection: self.default_connection,
                responses: Mutex::new(HashMap::new()),
                active_queries: AtomicUsize::new(0),
                graphql_response: Mutex::new(None),
                active_graphql: AtomicUsize::new(0),
            }),
        })
    }
}
