//! Credential composition for session authentication.
//!
//! Turns a [`ConnectionConfig`] into a [`Credentials`] value carrying only the
//! fields relevant to its authentication mode. The transport decides how to
//! put them on the wire.

use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{AuthMode, ConnectionConfig};

/// Authentication payload for one connect attempt.
///
/// # Examples
///
/// ```rust
/// use studio_link::{ConnectionConfig, Credentials, Protocol};
///
/// let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000")
///     .with_namespace("app")
///     .with_root_auth("root", "secret");
///
/// match Credentials::compose(&config) {
///     Credentials::Root { username, .. } => assert_eq!(username, "root"),
///     other => panic!("unexpected credentials: {:?}", other),
/// }
/// ```
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Anonymous access
    None,

    Root {
        username: String,
        password: String,
    },

    Namespace {
        namespace: String,
        username: String,
        password: String,
    },

    Database {
        namespace: String,
        database: String,
        username: String,
        password: String,
    },

    /// Record access (sign-in or sign-up) with flattened custom fields
    Record {
        namespace: String,
        database: String,
        access: String,
        fields: BTreeMap<String, String>,
    },

    /// Pre-issued token, used for re-authentication
    Token(String),
}

impl Credentials {
    /// Compose credentials for the mode configured on `config`.
    ///
    /// Record sign-in and sign-up share the same payload; the connection
    /// manager chooses between `signin` and `signup` from the mode.
    pub fn compose(config: &ConnectionConfig) -> Self {
        match config.auth_mode {
            AuthMode::None => Self::None,
            AuthMode::Root => Self::Root {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            AuthMode::Namespace => Self::Namespace {
                namespace: config.namespace.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
            AuthMode::Database => Self::Database {
                namespace: config.namespace.clone(),
                database: config.database.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
            AuthMode::Token => Self::Token(config.token.clone()),
            AuthMode::Record | AuthMode::RecordSignup => Self::record(config),
        }
    }

    /// Compose record credentials regardless of the configured mode.
    ///
    /// Later fields with a duplicate name overwrite earlier ones.
    pub fn record(config: &ConnectionConfig) -> Self {
        let mut fields = BTreeMap::new();
        for field in &config.record_fields {
            fields.insert(field.name.clone(), field.value.clone());
        }

        Self::Record {
            namespace: config.namespace.clone(),
            database: config.database.clone(),
            access: config.access.clone(),
            fields,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Self::Token(_))
    }

    /// Object payload for the `signin`/`signup` RPC methods.
    ///
    /// Returns `None` for anonymous and token credentials, which do not
    /// sign in.
    pub fn to_signin_params(&self) -> Option<JsonValue> {
        match self {
            Self::None | Self::Token(_) => None,
            Self::Root { username, password } => Some(json!({
                "user": username,
                "pass": password,
            })),
            Self::Namespace {
                namespace,
                username,
                password,
            } => Some(json!({
                "NS": namespace,
                "user": username,
                "pass": password,
            })),
            Self::Database {
                namespace,
                database,
                username,
                password,
            } => Some(json!({
                "NS": namespace,
                "DB": database,
                "user": username,
                "pass": password,
            })),
            Self::Record {
                namespace,
                database,
                access,
                fields,
            } => {
                let mut params = Map::new();
                params.insert("NS".into(), JsonValue::String(namespace.clone()));
                params.insert("DB".into(), JsonValue::String(database.clone()));
                params.insert("AC".into(), JsonValue::String(access.clone()));
                for (name, value) in fields {
                    params.insert(name.clone(), JsonValue::String(value.clone()));
                }
                Some(JsonValue::Object(params))
            },
        }
    }

    /// Attach an `Authorization` header to an HTTP request.
    ///
    /// - system users: `Authorization: Basic <base64(username:password)>`
    /// - token: `Authorization: Bearer <token>`
    /// - anonymous and record credentials: no header (record access
    ///   obtains a token through `/signin` first)
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Root { username, password }
            | Self::Namespace {
                username, password, ..
            }
            | Self::Database {
                username, password, ..
            } => {
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                request.header("Authorization", format!("Basic {}", encoded))
            },
            Self::Token(token) => request.bearer_auth(token),
            Self::None | Self::Record { .. } => request,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Root { username, .. } => f
                .debug_struct("Root")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Namespace {
                namespace,
                username,
                ..
            } => f
                .debug_struct("Namespace")
                .field("namespace", namespace)
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Database {
                namespace,
                database,
                username,
                ..
            } => f
                .debug_struct("Database")
                .field("namespace", namespace)
                .field("database", database)
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Record {
                namespace,
                database,
                access,
                fields,
            } => f
                .debug_struct("Record")
                .field("namespace", namespace)
                .field("database", database)
                .field("access", access)
                .field("fields", &fields.keys().collect::<Vec<_>>())
                .finish(),
            Self::Token(_) => write!(f, "Token(***)"),
        }
    }
}
