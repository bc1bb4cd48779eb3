#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use studio_link::live::split_statements;
use studio_link::{
    ConnectionConfig, Credentials, DisconnectReason, EventHandlers, GraphqlRequest,
    LiveNotification, OpenOptions, Protocol, RawStatementResult, Result, StudioLinkClient,
    StudioLinkError, StudioLinkTimeouts, Transport, TransportConnector, TransportEvent,
    TransportEvents, VersionSource,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(String),
    Signin(Credentials),
    Signup(Credentials),
    Authenticate(String),
    Invalidate,
    UseScope(OpenOptions),
    Query(String),
    Graphql(GraphqlRequest),
    SubscribeLive(String),
    Kill(String),
    Close,
}

/// How a mock transport answers.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub connect_error: Option<String>,
    pub signin_error: Option<String>,
    pub signup_error: Option<String>,
    pub authenticate_error: Option<String>,
    pub signin_token: Option<String>,
    /// Queries never answer
    pub hang_queries: bool,
    /// The connection drops while `use` is in flight
    pub drop_during_use: bool,
    /// The connection drops while a query is in flight; the query still answers
    pub drop_during_query: bool,
    pub graphql_error: Option<String>,
}

/// In-memory transport recording every call.
///
/// Queries without a queued answer get one `OK` result per statement; LIVE
/// statements answer with a fresh subscription id.
pub struct MockTransport {
    behaviour: Behaviour,
    calls: Mutex<Vec<Call>>,
    queued: Mutex<VecDeque<Vec<RawStatementResult>>>,
    issued: Mutex<Vec<String>>,
    events: Mutex<Option<TransportEvents>>,
    live: Mutex<HashMap<String, mpsc::Sender<LiveNotification>>>,
}

impl MockTransport {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            issued: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn kills_of(&self, id: &str) -> usize {
        self.count(|c| matches!(c, Call::Kill(k) if k == id))
    }

    /// Subscription ids handed out by LIVE statements, in order.
    pub fn issued_live_ids(&self) -> Vec<String> {
        self.issued.lock().clone()
    }

    pub fn queue_results(&self, results: Vec<RawStatementResult>) {
        self.queued.lock().push_back(results);
    }

    /// Simulate the network dropping.
    pub fn drop_connection(&self, reason: DisconnectReason) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(TransportEvent::Disconnected(reason));
        }
    }

    /// Push a notification for a live subscription.
    pub async fn push(&self, id: &str, notification: LiveNotification) -> bool {
        let sender = self.live.lock().get(id).cloned();
        match sender {
            Some(sender) => sender.send(notification).await.is_ok(),
            None => false,
        }
    }

    /// Drop the connection and let the session watcher observe it before
    /// the current call returns.
    async fn drop_mid_call(&self) {
        self.drop_connection(DisconnectReason::new("Connection reset"));
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn answer(&self, text: &str) -> Vec<RawStatementResult> {
        if let Some(results) = self.queued.lock().pop_front() {
            return results;
        }

        split_statements(text)
            .iter()
            .map(|statement| {
                if statement.to_ascii_uppercase().starts_with("LIVE") {
                    let id = Uuid::new_v4().to_string();
                    self.issued.lock().push(id.clone());
                    RawStatementResult::ok(json!(id), "0.1ms")
                } else {
                    RawStatementResult::ok(json!([{ "value": 1 }]), "0.1ms")
                }
            })
            .collect()
    }
}

fn failure(message: &Option<String>) -> Result<()> {
    match message {
        Some(message) => Err(StudioLinkError::ServerError(message.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<()> {
        self.record(Call::Connect(endpoint.to_string()));
        if let Some(message) = &self.behaviour.connect_error {
            return Err(StudioLinkError::WebSocketError(message.clone()));
        }
        *self.events.lock() = Some(events);
        Ok(())
    }

    async fn signin(&self, credentials: &Credentials) -> Result<Option<String>> {
        self.record(Call::Signin(credentials.clone()));
        failure(&self.behaviour.signin_error)?;
        Ok(self.behaviour.signin_token.clone())
    }

    async fn signup(&self, credentials: &Credentials) -> Result<Option<String>> {
        self.record(Call::Signup(credentials.clone()));
        failure(&self.behaviour.signup_error)?;
        Ok(Some("signup-token".to_string()))
    }

    async fn authenticate(&self, token: &str) -> Result<()> {
        self.record(Call::Authenticate(token.to_string()));
        failure(&self.behaviour.authenticate_error)
    }

    async fn invalidate(&self) -> Result<()> {
        self.record(Call::Invalidate);
        Ok(())
    }

    async fn use_scope(&self, options: &OpenOptions) -> Result<()> {
        self.record(Call::UseScope(options.clone()));
        if self.behaviour.drop_during_use {
            self.drop_mid_call().await;
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        _variables: Option<Map<String, JsonValue>>,
    ) -> Result<Vec<RawStatementResult>> {
        self.record(Call::Query(text.to_string()));
        if self.behaviour.hang_queries {
            std::future::pending::<()>().await;
        }
        if self.behaviour.drop_during_query {
            self.drop_mid_call().await;
        }
        Ok(self.answer(text))
    }

    async fn graphql(&self, request: &GraphqlRequest) -> Result<JsonValue> {
        self.record(Call::Graphql(request.clone()));
        if let Some(message) = &self.behaviour.graphql_error {
            return Err(StudioLinkError::ServerError(message.clone()));
        }
        if request.query.is_empty() {
            return Err(StudioLinkError::ServerError("Missing GraphQL query".to_string()));
        }
        Ok(json!({ "data": { "person": [{ "name": "tobie" }] } }))
    }

    async fn subscribe_live(&self, id: &str) -> Result<mpsc::Receiver<LiveNotification>> {
        self.record(Call::SubscribeLive(id.to_string()));
        let (sender, receiver) = mpsc::channel(16);
        self.live.lock().insert(id.to_string(), sender);
        Ok(receiver)
    }

    async fn kill(&self, id: &str) -> Result<()> {
        self.record(Call::Kill(id.to_string()));
        self.live.lock().remove(id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        self.live.lock().clear();
        Ok(())
    }
}

/// Connector handing out recording mock transports.
#[derive(Default)]
pub struct MockConnector {
    behaviour: Behaviour,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockConnector {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.created.lock()[index].clone()
    }

    pub fn last(&self) -> Arc<MockTransport> {
        self.created
            .lock()
            .last()
            .cloned()
            .expect("no transport was created")
    }
}

impl TransportConnector for MockConnector {
    fn create(
        &self,
        _protocol: Protocol,
        _timeouts: &StudioLinkTimeouts,
    ) -> Result<Arc<dyn Transport>> {
        let transport = Arc::new(MockTransport::new(self.behaviour.clone()));
        self.created.lock().push(transport.clone());
        Ok(transport)
    }
}

/// Version source answering with a fixed raw version.
pub struct StaticVersionSource {
    version: Option<String>,
    fail: bool,
    fetches: AtomicUsize,
}

impl StaticVersionSource {
    pub fn new(version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            fail: false,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            version: None,
            fail: true,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionSource for StaticVersionSource {
    async fn fetch_version(&self, _config: &ConnectionConfig) -> Result<Option<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StudioLinkError::NetworkError("connection refused".to_string()));
        }
        Ok(self.version.clone())
    }
}

pub fn test_timeouts() -> StudioLinkTimeouts {
    StudioLinkTimeouts::builder()
        .query_timeout(Duration::from_secs(1))
        .teardown_grace(Duration::from_millis(10))
        .build()
}

pub fn root_config() -> ConnectionConfig {
    ConnectionConfig::new(Protocol::Ws, "localhost:8000")
        .with_namespace("test")
        .with_database("test")
        .with_root_auth("root", "root")
}

/// Client wired to a mock connector and a fixed remote version, with a
/// minimum version of 1.3.0.
pub fn mock_client(
    version: &str,
    behaviour: Behaviour,
    handlers: EventHandlers,
) -> (StudioLinkClient, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::new(behaviour));
    let client = StudioLinkClient::builder()
        .timeouts(test_timeouts())
        .event_handlers(handlers)
        .connector(connector.clone())
        .version_source(Arc::new(StaticVersionSource::new(version)))
        .minimum_version("1.3.0")
        .build()
        .expect("client should build");
    (client, connector)
}

/// Poll until `condition` holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
