//! Session state shared by the connection manager, query executor and live
//! query registry.
//!
//! - [`ConnectionSlot`]: the single active session (state, transport,
//!   version, access token) guarded by short, non-awaiting locks
//! - [`manager`]: the connect/disconnect state machine

pub mod manager;

pub use manager::ConnectionManager;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{Result, StudioLinkError};
use crate::event_handlers::EventHandlers;
use crate::models::{ConnectionState, Protocol};
use crate::transport::Transport;

#[derive(Default)]
struct Session {
    transport: Option<Arc<dyn Transport>>,
    protocol: Option<Protocol>,
    version: Option<String>,
    access_token: Option<String>,
}

/// The single active session of a client.
///
/// Every connect attempt starts a new epoch. Work tied to an older epoch
/// (transport events, a connect that was superseded) must not touch the
/// slot.
pub struct ConnectionSlot {
    state_tx: watch::Sender<ConnectionState>,
    handlers: EventHandlers,
    session: RwLock<Session>,
    epoch: AtomicU64,
}

impl ConnectionSlot {
    pub fn new(handlers: EventHandlers) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state_tx,
            handlers,
            session: RwLock::new(Session::default()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        if self.publish_state(state) {
            self.announce_state(state);
        }
    }

    fn publish_state(&self, state: ConnectionState) -> bool {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    fn announce_state(&self, state: ConnectionState) {
        log::debug!("[CONNECT] State -> {}", state);
        self.handlers.emit_state_change(state);
    }

    /// Mark the session of `epoch` connected, storing what the connect
    /// learned about it.
    ///
    /// The epoch check, the session writes and the state change happen under
    /// the session write lock, which every teardown takes to clear the
    /// session. Returns `false` without touching anything when the session
    /// was replaced or lost in the meantime.
    pub(crate) fn commit_connected(
        &self,
        epoch: u64,
        version: Option<String>,
        access_token: Option<String>,
    ) -> bool {
        let changed = {
            let mut session = self.session.write();
            if self.epoch() != epoch || session.transport.is_none() {
                return false;
            }
            session.version = version;
            session.access_token = access_token;
            self.publish_state(ConnectionState::Connected)
        };
        if changed {
            self.announce_state(ConnectionState::Connected);
        }
        true
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Start a new epoch, invalidating everything tied to the previous one.
    pub(crate) fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advance past `epoch` only if it is still current.
    pub(crate) fn retire_epoch(&self, epoch: u64) -> bool {
        self.epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Transport of the active session.
    ///
    /// Fails with [`StudioLinkError::NotConnected`] unless the session is
    /// fully connected.
    pub fn active_transport(&self) -> Result<Arc<dyn Transport>> {
        if !self.state().is_connected() {
            return Err(StudioLinkError::NotConnected);
        }
        self.session
            .read()
            .transport
            .clone()
            .ok_or(StudioLinkError::NotConnected)
    }

    /// Transport regardless of state; used while connecting.
    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.session.read().transport.clone()
    }

    pub(crate) fn install_transport(&self, transport: Arc<dyn Transport>, protocol: Protocol) {
        let mut session = self.session.write();
        session.transport = Some(transport);
        session.protocol = Some(protocol);
    }

    /// Remove the transport and forget everything about the session.
    pub(crate) fn clear(&self) -> Option<Arc<dyn Transport>> {
        std::mem::take(&mut *self.session.write()).transport
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.session.read().protocol
    }

    pub fn version(&self) -> Option<String> {
        self.session.read().version.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.read().access_token.clone()
    }
}

impl std::fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session.read();
        f.debug_struct("ConnectionSlot")
            .field("state", &self.state())
            .field("epoch", &self.epoch())
            .field("protocol", &session.protocol)
            .field("version", &session.version)
            .field("has_transport", &session.transport.is_some())
            .finish()
    }
}
