//! WebSocket JSON-RPC transport.
//!
//! One background task owns the socket. Public calls send commands to it
//! over a channel:
//!
//! - requests are tagged with an incrementing id and answered through a
//!   oneshot once the matching response frame arrives
//! - live notifications are routed by subscription id to per-subscription
//!   channels; notifications that beat their subscriber are held back briefly
//! - keepalive pings run on the configured interval
//! - a close frame, stream error or end of stream is reported as
//!   [`TransportEvent::Disconnected`]; a close requested through
//!   [`Transport::close`] is not

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

use super::rpc::{decode_frame, decode_statement_results, Inbound, RpcRequest};
use super::{OpenOptions, Transport, TransportEvent, TransportEvents, LIVE_CHANNEL_CAPACITY};
use crate::auth::Credentials;
use crate::error::{Result, StudioLinkError};
use crate::event_handlers::{ConnectionError, DisconnectReason};
use crate::models::{GraphqlRequest, LiveNotification, RawStatementResult};
use crate::timeouts::StudioLinkTimeouts;

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Notifications held per unknown subscription id.
const MAX_BACKLOG_PER_ID: usize = 50;

/// Unknown subscription ids tracked at once.
const MAX_BACKLOG_IDS: usize = 64;

const COMMAND_CHANNEL_CAPACITY: usize = 256;

// ── Commands ────────────────────────────────────────────────────────────────

enum WsCmd {
    Request {
        method: &'static str,
        params: Vec<JsonValue>,
        reply: oneshot::Sender<Result<JsonValue>>,
    },
    Subscribe {
        id: String,
        sender: mpsc::Sender<LiveNotification>,
    },
    Unsubscribe {
        id: String,
    },
    Shutdown,
}

struct WsHandle {
    cmd_tx: mpsc::Sender<WsCmd>,
    task: JoinHandle<()>,
}

// ── WsTransport (public handle) ─────────────────────────────────────────────

/// JSON-RPC over WebSocket.
pub struct WsTransport {
    timeouts: StudioLinkTimeouts,
    handle: Mutex<Option<WsHandle>>,
}

impl WsTransport {
    pub fn new(timeouts: StudioLinkTimeouts) -> Self {
        Self {
            timeouts,
            handle: Mutex::new(None),
        }
    }

    fn command_sender(&self) -> Result<mpsc::Sender<WsCmd>> {
        self.handle
            .lock()
            .as_ref()
            .map(|h| h.cmd_tx.clone())
            .ok_or_else(|| StudioLinkError::WebSocketError("Transport is not open".to_string()))
    }

    async fn request(&self, method: &'static str, params: Vec<JsonValue>) -> Result<JsonValue> {
        let cmd_tx = self.command_sender()?;
        let (reply, reply_rx) = oneshot::channel();

        cmd_tx
            .send(WsCmd::Request {
                method,
                params,
                reply,
            })
            .await
            .map_err(|_| {
                StudioLinkError::WebSocketError("Connection task is not running".to_string())
            })?;

        reply_rx.await.map_err(|_| {
            StudioLinkError::WebSocketError(format!(
                "Connection closed before '{}' was answered",
                method
            ))
        })?
    }

    async fn request_token(&self, method: &'static str, credentials: &Credentials) -> Result<Option<String>> {
        let params = credentials.to_signin_params().ok_or_else(|| {
            StudioLinkError::InternalError(format!("{:?} cannot be used for {}", credentials, method))
        })?;
        let result = self.request(method, vec![params]).await?;
        Ok(result.as_str().map(str::to_string))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<()> {
        log::debug!("[WS] Opening connection to {}", endpoint);

        let connect_result = if !StudioLinkTimeouts::is_no_timeout(self.timeouts.connection_timeout)
        {
            tokio::time::timeout(
                self.timeouts.connection_timeout,
                tokio_tungstenite::connect_async(endpoint),
            )
            .await
        } else {
            Ok(tokio_tungstenite::connect_async(endpoint).await)
        };

        let ws_stream = match connect_result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(tokio_tungstenite::tungstenite::Error::Http(response))) => {
                let status = response.status();
                return Err(StudioLinkError::WebSocketError(match status.as_u16() {
                    401 => "Unauthorized: WebSocket requires valid credentials".to_string(),
                    403 => "Forbidden: Access to WebSocket denied".to_string(),
                    code => format!("WebSocket HTTP error: {}", code),
                }));
            },
            Ok(Err(e)) => {
                return Err(StudioLinkError::WebSocketError(format!("Connection failed: {}", e)));
            },
            Err(_) => {
                return Err(StudioLinkError::TimeoutError(format!(
                    "Connection timeout ({:?})",
                    self.timeouts.connection_timeout
                )));
            },
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let keepalive = self.timeouts.keepalive_interval;
        let task = tokio::spawn(connection_task(ws_stream, cmd_rx, events, keepalive));

        let previous = self.handle.lock().replace(WsHandle { cmd_tx, task });
        if let Some(previous) = previous {
            previous.task.abort();
        }

        log::info!("[WS] Connected to {}", endpoint);
        Ok(())
    }

    async fn signin(&self, credentials: &Credentials) -> Result<Option<String>> {
        self.request_token("signin", credentials).await
    }

    async fn signup(&self, credentials: &Credentials) -> Result<Option<String>> {
        self.request_token("signup", credentials).await
    }

    async fn authenticate(&self, token: &str) -> Result<()> {
        self.request("authenticate", vec![json!(token)]).await?;
        Ok(())
    }

    async fn invalidate(&self) -> Result<()> {
        self.request("invalidate", Vec::new()).await?;
        Ok(())
    }

    async fn use_scope(&self, options: &OpenOptions) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }
        let scope = |value: &str| {
            if value.is_empty() {
                JsonValue::Null
            } else {
                json!(value)
            }
        };
        self.request("use", vec![scope(&options.namespace), scope(&options.database)])
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        variables: Option<Map<String, JsonValue>>,
    ) -> Result<Vec<RawStatementResult>> {
        let variables = JsonValue::Object(variables.unwrap_or_default());
        let result = self.request("query", vec![json!(text), variables]).await?;
        Ok(decode_statement_results(result)?)
    }

    async fn graphql(&self, request: &GraphqlRequest) -> Result<JsonValue> {
        self.request("graphql", vec![serde_json::to_value(request)?]).await
    }

    async fn subscribe_live(&self, id: &str) -> Result<mpsc::Receiver<LiveNotification>> {
        let cmd_tx = self.command_sender()?;
        let (sender, receiver) = mpsc::channel(LIVE_CHANNEL_CAPACITY);
        cmd_tx
            .send(WsCmd::Subscribe {
                id: id.to_string(),
                sender,
            })
            .await
            .map_err(|_| {
                StudioLinkError::WebSocketError("Connection task is not running".to_string())
            })?;
        Ok(receiver)
    }

    async fn kill(&self, id: &str) -> Result<()> {
        let cmd_tx = self.command_sender()?;
        let _ = cmd_tx
            .send(WsCmd::Unsubscribe { id: id.to_string() })
            .await;
        self.request("kill", vec![json!(id)]).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.cmd_tx.send(WsCmd::Shutdown).await;
            if let Err(e) = handle.task.await {
                log::debug!("[WS] Connection task ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.cmd_tx.try_send(WsCmd::Shutdown);
        }
    }
}

// ── Background connection task ──────────────────────────────────────────────

#[derive(Default)]
struct Routing {
    pending: HashMap<String, oneshot::Sender<Result<JsonValue>>>,
    live: HashMap<String, mpsc::Sender<LiveNotification>>,
    backlog: HashMap<String, Vec<LiveNotification>>,
    next_id: u64,
}

impl Routing {
    fn next_request_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    /// Drop requests whose caller stopped waiting (e.g. a timed-out query).
    fn prune_abandoned(&mut self) {
        self.pending.retain(|_, reply| !reply.is_closed());
    }

    fn fail_pending(&mut self, message: &str) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(StudioLinkError::WebSocketError(message.to_string())));
        }
    }

    async fn subscribe(&mut self, id: String, sender: mpsc::Sender<LiveNotification>) {
        if let Some(held) = self.backlog.remove(&id) {
            for notification in held {
                if sender.send(notification).await.is_err() {
                    return;
                }
            }
        }
        self.live.insert(id, sender);
    }

    async fn route_notification(&mut self, id: String, notification: LiveNotification) {
        if let Some(sender) = self.live.get(&id) {
            if sender.send(notification).await.is_err() {
                log::debug!("[WS] Live receiver for {} dropped", id);
                self.live.remove(&id);
            }
            return;
        }

        if !self.backlog.contains_key(&id) && self.backlog.len() >= MAX_BACKLOG_IDS {
            log::debug!("[WS] Dropping notification for unknown live query {}", id);
            return;
        }
        let held = self.backlog.entry(id).or_default();
        if held.len() < MAX_BACKLOG_PER_ID {
            held.push(notification);
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match decode_frame(text) {
            Ok(Some(Inbound::Response { id, outcome })) => match self.pending.remove(&id) {
                Some(reply) => {
                    let result = outcome.map_err(|e| StudioLinkError::ServerError(e.message));
                    let _ = reply.send(result);
                },
                None => log::debug!("[WS] No pending request for response id={}", id),
            },
            Ok(Some(Inbound::Notification(notification))) => {
                let (id, notification) = notification.into_parts();
                self.route_notification(id, notification).await;
            },
            Ok(None) => {},
            Err(e) => log::warn!("[WS] Failed to parse message: {}", e),
        }
    }
}

async fn connection_task(
    mut ws: WebSocketStream,
    mut cmd_rx: mpsc::Receiver<WsCmd>,
    events: TransportEvents,
    keepalive_interval: Duration,
) {
    let mut routing = Routing::default();

    let has_keepalive = !keepalive_interval.is_zero();
    let keepalive_dur = if has_keepalive {
        keepalive_interval
    } else {
        FAR_FUTURE
    };
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;

    let disconnect = loop {
        let idle_sleep = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle_sleep);

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(WsCmd::Request { method, params, reply }) => {
                        routing.prune_abandoned();
                        let id = routing.next_request_id();
                        let frame = RpcRequest::new(id.clone(), method, params);
                        let payload = match serde_json::to_string(&frame) {
                            Ok(payload) => payload,
                            Err(e) => {
                                let _ = reply.send(Err(e.into()));
                                continue;
                            },
                        };
                        log::debug!("[WS] -> {} id={}", method, id);
                        match ws.send(Message::Text(payload.into())).await {
                            Ok(()) => {
                                routing.pending.insert(id, reply);
                            },
                            Err(e) => {
                                let _ = reply.send(Err(StudioLinkError::WebSocketError(format!(
                                    "Failed to send {}: {}",
                                    method, e
                                ))));
                            },
                        }
                    },
                    Some(WsCmd::Subscribe { id, sender }) => {
                        routing.subscribe(id, sender).await;
                    },
                    Some(WsCmd::Unsubscribe { id }) => {
                        routing.live.remove(&id);
                        routing.backlog.remove(&id);
                    },
                    Some(WsCmd::Shutdown) | None => {
                        let _ = ws.close(None).await;
                        routing.fail_pending("Connection closed");
                        log::debug!("[WS] Connection task shut down");
                        return;
                    },
                }
            }

            _ = &mut idle_sleep, if has_keepalive => {
                if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                    log::warn!("[WS] Keepalive ping failed: {}", e);
                    break DisconnectReason::new(format!("Keepalive ping failed: {}", e));
                }
                idle_deadline = TokioInstant::now() + keepalive_dur;
            }

            frame = ws.next() => {
                idle_deadline = TokioInstant::now() + keepalive_dur;

                match frame {
                    Some(Ok(Message::Text(text))) => {
                        routing.handle_text(&text).await;
                    },
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => routing.handle_text(text).await,
                        Err(e) => log::warn!("[WS] Dropping non-UTF-8 binary frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                            None => DisconnectReason::new("Server closed connection"),
                        };
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    },
                    Some(Ok(Message::Pong(_))) => {
                        log::debug!("[WS] Keepalive: received Pong");
                    },
                    Some(Ok(Message::Frame(_))) => {},
                    Some(Err(e)) => {
                        let msg = e.to_string();
                        let _ = events.send(TransportEvent::Error(ConnectionError::new(&msg, true)));
                        break DisconnectReason::new(format!("WebSocket error: {}", msg));
                    },
                    None => {
                        break DisconnectReason::new("WebSocket stream ended");
                    },
                }
            }
        }
    };

    log::info!("[WS] Connection lost: {}", disconnect);
    routing.fail_pending("Connection lost");
    let _ = events.send(TransportEvent::Disconnected(disconnect));
}
