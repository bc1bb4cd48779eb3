use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication mode configured on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Anonymous access
    #[default]
    None,
    /// System root user
    Root,
    /// Namespace-scoped system user
    Namespace,
    /// Database-scoped system user
    Database,
    /// Pre-issued access token
    Token,
    /// Sign in against application-defined records
    #[serde(alias = "scope")]
    Record,
    /// Sign up a new application-defined record
    #[serde(alias = "scope-signup")]
    RecordSignup,
}

impl AuthMode {
    /// Returns `true` for both record sign-in and record sign-up.
    pub fn is_record(&self) -> bool {
        matches!(self, AuthMode::Record | AuthMode::RecordSignup)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthMode::None => "none",
            AuthMode::Root => "root",
            AuthMode::Namespace => "namespace",
            AuthMode::Database => "database",
            AuthMode::Token => "token",
            AuthMode::Record => "record",
            AuthMode::RecordSignup => "record-signup",
        };
        f.write_str(name)
    }
}
