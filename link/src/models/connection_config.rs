use serde::{Deserialize, Serialize};

use super::auth_mode::AuthMode;
use super::protocol::Protocol;

/// A single user-supplied field for record authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: String,
}

impl RecordField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Connection details handed to `connect`.
///
/// The session core only reads this value. Fields that do not apply to the
/// selected [`AuthMode`] are ignored.
///
/// # Example
///
/// ```rust
/// use studio_link::{AuthMode, ConnectionConfig, Protocol};
///
/// let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000")
///     .with_namespace("test")
///     .with_database("test")
///     .with_root_auth("root", "root");
///
/// assert_eq!(config.auth_mode, AuthMode::Root);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Transport protocol
    #[serde(default)]
    pub protocol: Protocol,

    /// Host, optionally with port and path (e.g. `localhost:8000`)
    #[serde(default)]
    pub hostname: String,

    /// Namespace selected after connecting
    #[serde(default)]
    pub namespace: String,

    /// Database selected after connecting
    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub auth_mode: AuthMode,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Record access method name (record sign-in / sign-up)
    #[serde(default, alias = "scope")]
    pub access: String,

    /// Custom record fields, applied in order
    #[serde(default)]
    pub record_fields: Vec<RecordField>,

    /// Pre-issued token (token mode)
    #[serde(default)]
    pub token: String,
}

impl ConnectionConfig {
    pub fn new(protocol: Protocol, hostname: impl Into<String>) -> Self {
        Self {
            protocol,
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Authenticate as the root system user.
    pub fn with_root_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::Root;
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Authenticate as a namespace-scoped system user.
    pub fn with_namespace_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth_mode = AuthMode::Namespace;
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Authenticate as a database-scoped system user.
    pub fn with_database_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth_mode = AuthMode::Database;
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Authenticate with a pre-issued token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::Token;
        self.token = token.into();
        self
    }

    /// Sign in (or, with `signup = true`, sign up) through a record access method.
    pub fn with_record_auth(
        mut self,
        access: impl Into<String>,
        fields: Vec<RecordField>,
        signup: bool,
    ) -> Self {
        self.auth_mode = if signup {
            AuthMode::RecordSignup
        } else {
            AuthMode::Record
        };
        self.access = access.into();
        self.record_fields = fields;
        self
    }
}
