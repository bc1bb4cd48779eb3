use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change pushed for a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiveAction {
    #[serde(alias = "create")]
    Create,
    #[serde(alias = "update")]
    Update,
    #[serde(alias = "delete")]
    Delete,
    /// The server ended the subscription
    #[serde(alias = "close", alias = "KILLED", alias = "killed")]
    Close,
}

impl fmt::Display for LiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveAction::Create => write!(f, "CREATE"),
            LiveAction::Update => write!(f, "UPDATE"),
            LiveAction::Delete => write!(f, "DELETE"),
            LiveAction::Close => write!(f, "CLOSE"),
        }
    }
}
