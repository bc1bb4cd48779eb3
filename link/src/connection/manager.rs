//! Connect/disconnect state machine.
//!
//! ```text
//! disconnected --connect()--> connecting --ready--> connected
//! connecting | connected --disconnect() or transport loss--> disconnected
//! ```
//!
//! A connect first tears down any previous session, so at most one
//! transport is open at a time. Connect attempts are serialized.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ConnectionSlot;
use crate::auth::Credentials;
use crate::endpoint::rpc_endpoint;
use crate::error::{Result, StudioLinkError};
use crate::event_handlers::DisconnectReason;
use crate::live::LiveQueryRegistry;
use crate::models::{AuthMode, ConnectionConfig, ConnectionState};
use crate::timeouts::StudioLinkTimeouts;
use crate::transport::{OpenOptions, Transport, TransportConnector, TransportEvent};
use crate::version::VersionNegotiator;

/// Sign-in failure text meaning the record access method found no record.
pub const NO_RECORD_RETURNED: &str = "No record was returned";

/// Owns the lifecycle of the single session in a [`ConnectionSlot`].
pub struct ConnectionManager {
    slot: Arc<ConnectionSlot>,
    connector: Arc<dyn TransportConnector>,
    negotiator: VersionNegotiator,
    live: Arc<LiveQueryRegistry>,
    timeouts: StudioLinkTimeouts,
    connect_lock: tokio::sync::Mutex<()>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        slot: Arc<ConnectionSlot>,
        connector: Arc<dyn TransportConnector>,
        negotiator: VersionNegotiator,
        live: Arc<LiveQueryRegistry>,
        timeouts: StudioLinkTimeouts,
    ) -> Self {
        Self {
            slot,
            connector,
            negotiator,
            live,
            timeouts,
            connect_lock: tokio::sync::Mutex::new(()),
            watcher: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> &Arc<ConnectionSlot> {
        &self.slot
    }

    /// Open a new session for `config`, replacing any existing one.
    ///
    /// On failure the transport is closed, the state is `Disconnected` and
    /// the error names the step that failed.
    pub async fn connect(&self, config: Option<&ConnectionConfig>) -> Result<()> {
        let config = config.ok_or(StudioLinkError::NoConnection)?;
        let _guard = self.connect_lock.lock().await;

        self.teardown(DisconnectReason::new("Replaced by a new connection"))
            .await;

        let epoch = self.slot.advance_epoch();
        self.slot.set_state(ConnectionState::Connecting);
        log::info!(
            "[CONNECT] Connecting to {}://{} (auth={})",
            config.protocol,
            config.hostname,
            config.auth_mode
        );

        let committed = self.establish(config, epoch).await.and_then(|(version, token)| {
            if self.slot.commit_connected(epoch, version, token) {
                Ok(())
            } else {
                Err(StudioLinkError::ConnectionFailed(
                    "Connection closed during setup".to_string(),
                ))
            }
        });

        match committed {
            Ok(()) => {
                log::info!("[CONNECT] Connected (version={:?})", self.slot.version());
                let handlers = self.slot.handlers();
                handlers.emit_schema_sync();
                handlers.emit_connect();
                Ok(())
            },
            Err(e) => {
                log::warn!("[CONNECT] Connect failed: {}", e);
                if self.slot.retire_epoch(epoch) {
                    self.stop_watcher();
                    if let Some(transport) = self.slot.clear() {
                        if let Err(close_err) = transport.close().await {
                            log::debug!("[CONNECT] Close after failed connect: {}", close_err);
                        }
                    }
                    self.slot.set_state(ConnectionState::Disconnected);
                }
                Err(e)
            },
        }
    }

    /// Open and authenticate a transport for `epoch`. Returns the server
    /// version and access token to publish once the session is committed.
    async fn establish(
        &self,
        config: &ConnectionConfig,
        epoch: u64,
    ) -> Result<(Option<String>, Option<String>)> {
        let endpoint = rpc_endpoint(config)?;

        let check = self.negotiator.check(config).await;
        let version = check.into_result()?;

        let credentials = Credentials::compose(config);
        let transport = self.connector.create(config.protocol, &self.timeouts)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        transport
            .connect(&endpoint, events_tx)
            .await
            .map_err(|e| StudioLinkError::ConnectionFailed(e.to_string()))?;

        if self.slot.epoch() != epoch {
            let _ = transport.close().await;
            return Err(StudioLinkError::ConnectionFailed(
                "Connection attempt was cancelled".to_string(),
            ));
        }
        self.slot.install_transport(transport.clone(), config.protocol);
        self.spawn_watcher(events_rx, epoch);

        let token = self.prepare(transport.as_ref(), config, &credentials).await?;

        transport
            .use_scope(&OpenOptions::new(&config.namespace, &config.database))
            .await
            .map_err(|e| StudioLinkError::ConnectionFailed(e.to_string()))?;

        Ok((version, token))
    }

    /// Authenticate the freshly opened transport.
    async fn prepare(
        &self,
        transport: &dyn Transport,
        config: &ConnectionConfig,
        credentials: &Credentials,
    ) -> Result<Option<String>> {
        if config.auth_mode == AuthMode::RecordSignup {
            return transport.signup(credentials).await.map_err(|e| {
                log::warn!("[CONNECT] Sign-up rejected: {}", e);
                StudioLinkError::SignupFailed
            });
        }

        match credentials {
            Credentials::None => match transport.invalidate().await {
                Ok(()) => Ok(None),
                Err(e) => Err(StudioLinkError::ConnectionFailed(e.to_string())),
            },
            Credentials::Token(token) => match transport.authenticate(token).await {
                Ok(()) => Ok(Some(token.clone())),
                Err(e) => {
                    log::warn!("[CONNECT] Token rejected: {}", e);
                    Err(StudioLinkError::TokenInvalid)
                },
            },
            _ => match transport.signin(credentials).await {
                Ok(token) => Ok(token),
                Err(e) if e.to_string().contains(NO_RECORD_RETURNED) => {
                    log::info!("[CONNECT] No record found, prompting for sign-up");
                    self.slot.handlers().emit_signup_required();
                    Ok(None)
                },
                Err(e) => Err(StudioLinkError::ConnectionFailed(e.to_string())),
            },
        }
    }

    /// Close the session. No-op when already disconnected.
    pub async fn disconnect(&self) {
        self.teardown(DisconnectReason::with_code("Client disconnected", 1000))
            .await;
    }

    /// Close whatever session exists and wait for the teardown grace period.
    /// Returns `false` when there was nothing to close.
    async fn teardown(&self, reason: DisconnectReason) -> bool {
        let previous = self.slot.state();
        if previous == ConnectionState::Disconnected && self.slot.transport().is_none() {
            return false;
        }

        self.slot.advance_epoch();
        self.stop_watcher();
        let transport = self.slot.clear();
        self.live.clear_all();
        self.slot.set_state(ConnectionState::Disconnected);

        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                log::warn!("[CONNECT] Transport close failed: {}", e);
            }
        }
        if previous.is_connected() {
            self.slot.handlers().emit_disconnect(reason);
        }

        log::debug!("[CONNECT] Closed, waiting {:?}", self.timeouts.teardown_grace);
        if !self.timeouts.teardown_grace.is_zero() {
            tokio::time::sleep(self.timeouts.teardown_grace).await;
        }
        true
    }

    fn stop_watcher(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }

    fn spawn_watcher(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>, epoch: u64) {
        let slot = self.slot.clone();
        let live = self.live.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Error(error) => {
                        if slot.epoch() == epoch {
                            slot.handlers().emit_error(error);
                        }
                    },
                    TransportEvent::Disconnected(reason) => {
                        if !slot.retire_epoch(epoch) {
                            log::debug!("[CONNECT] Ignoring disconnect from a previous session");
                            return;
                        }
                        log::warn!("[CONNECT] Connection lost: {}", reason);
                        slot.clear();
                        live.clear_all();
                        slot.set_state(ConnectionState::Disconnected);
                        slot.handlers().emit_disconnect(reason);
                        return;
                    },
                }
            }
        });

        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }
    }
}
