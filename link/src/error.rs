//! Error types for studio-link.
//!
//! Connection-level failures are returned as [`StudioLinkError`]. Query-level
//! failures never use this type: they are reported per statement inside
//! [`QueryResponse`](crate::models::QueryResponse).

use thiserror::Error;

/// Result type for studio-link operations.
pub type Result<T> = std::result::Result<T, StudioLinkError>;

/// Errors that can occur while managing a database session.
#[derive(Debug, Error)]
pub enum StudioLinkError {
    /// `connect` was called without a connection configuration.
    #[error("No connection available")]
    NoConnection,

    /// An operation required an active session.
    #[error("You must be connected to the database")]
    NotConnected,

    /// The remote engine is older than the minimum supported version.
    #[error(
        "The server is running an unsupported version ({version}). Please upgrade to at least {minimum}"
    )]
    UnsupportedVersion { version: String, minimum: String },

    /// Record sign-up was rejected during connect.
    #[error("Could not sign up")]
    SignupFailed,

    /// Token re-authentication was rejected during connect.
    #[error("Authentication token invalid")]
    TokenInvalid,

    /// Sign-in was rejected or the transport could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query variables did not parse as a JSON object.
    #[error("Invalid query variables: {0}")]
    InvalidVariables(String),

    /// The connection protocol cannot be served by the configured connector.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Invalid configuration (builder, TOML file, endpoint).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// HTTP-level failure (version probe, HTTP transport).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// WebSocket-level failure.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The remote engine answered a request with an error.
    #[error("Server error: {0}")]
    ServerError(String),

    /// An operation exceeded its deadline.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl StudioLinkError {
    /// Returns `true` for errors where a fresh attempt may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::TimeoutError(_) | Self::WebSocketError(_))
    }

    /// Returns `true` for errors raised by the authentication step of connect.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::SignupFailed | Self::TokenInvalid | Self::ConnectionFailed(_))
    }
}

impl From<reqwest::Error> for StudioLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StudioLinkError::TimeoutError(err.to_string())
        } else {
            StudioLinkError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StudioLinkError {
    fn from(err: serde_json::Error) -> Self {
        StudioLinkError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StudioLinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StudioLinkError::WebSocketError(err.to_string())
    }
}

impl From<toml::de::Error> for StudioLinkError {
    fn from(err: toml::de::Error) -> Self {
        StudioLinkError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}

impl From<std::io::Error> for StudioLinkError {
    fn from(err: std::io::Error) -> Self {
        StudioLinkError::ConfigurationError(err.to_string())
    }
}
