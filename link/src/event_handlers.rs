//! Session lifecycle event handlers.
//!
//! Callback hooks through which the UI layer observes the session core:
//!
//! - [`on_connect`](EventHandlers::on_connect): the session became ready
//! - [`on_disconnect`](EventHandlers::on_disconnect): the session closed
//! - [`on_error`](EventHandlers::on_error): transport or protocol error
//! - [`on_state_change`](EventHandlers::on_state_change): every state transition
//! - [`on_signup_required`](EventHandlers::on_signup_required): record sign-in
//!   found no record, the user should be offered sign-up
//! - [`on_schema_sync`](EventHandlers::on_schema_sync): the schema should be
//!   refreshed for the new session
//! - [`on_warning`](EventHandlers::on_warning): non-fatal problems such as live
//!   queries on a protocol that cannot deliver them
//!
//! # Example
//!
//! ```rust
//! use studio_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("Connected"))
//!     .on_disconnect(|reason| println!("Disconnected: {}", reason))
//!     .on_warning(|message| eprintln!("Warning: {}", message));
//!
//! assert!(handlers.has_any());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::models::ConnectionState;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    /// Returns `true` for a normal closure (no code or code 1000).
    pub fn is_normal(&self) -> bool {
        matches!(self.code, None | Some(1000))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub message: String,
    /// Whether a new connect attempt may succeed.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
pub type OnStateChangeCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;
pub type OnSignupRequiredCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnSchemaSyncCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnWarningCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Session lifecycle event handlers.
///
/// All handlers are optional. Handlers run on the task that triggered the
/// event and must not block.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_state_change: Option<OnStateChangeCallback>,
    pub(crate) on_signup_required: Option<OnSignupRequiredCallback>,
    pub(crate) on_schema_sync: Option<OnSchemaSyncCallback>,
    pub(crate) on_warning: Option<OnWarningCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_signup_required", &self.on_signup_required.is_some())
            .field("on_schema_sync", &self.on_schema_sync.is_some())
            .field("on_warning", &self.on_warning.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked once a session is authenticated and ready.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the session closes, whether the
    /// caller asked for it or the transport dropped.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked on transport or protocol errors.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked on every [`ConnectionState`] transition.
    pub fn on_state_change(mut self, f: impl Fn(ConnectionState) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when record sign-in finds no matching
    /// record. The UI typically offers a sign-up form.
    pub fn on_signup_required(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_signup_required = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked after connecting, when the schema of the
    /// selected database should be (re)loaded.
    pub fn on_schema_sync(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_schema_sync = Some(Arc::new(f));
        self
    }

    /// Register a callback for non-fatal warnings.
    pub fn on_warning(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_warning = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_state_change.is_some()
            || self.on_signup_required.is_some()
            || self.on_schema_sync.is_some()
            || self.on_warning.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_state_change(&self, state: ConnectionState) {
        if let Some(cb) = &self.on_state_change {
            cb(state);
        }
    }

    pub(crate) fn emit_signup_required(&self) {
        if let Some(cb) = &self.on_signup_required {
            cb();
        }
    }

    pub(crate) fn emit_schema_sync(&self) {
        if let Some(cb) = &self.on_schema_sync {
            cb();
        }
    }

    pub(crate) fn emit_warning(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[EVENTS] {}", message);
        if let Some(cb) = &self.on_warning {
            cb(message);
        }
    }
}
