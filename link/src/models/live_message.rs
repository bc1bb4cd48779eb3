use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::live_action::LiveAction;

/// A notification as pushed by the transport for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveNotification {
    pub action: LiveAction,
    #[serde(default)]
    pub data: JsonValue,
}

impl LiveNotification {
    pub fn new(action: LiveAction, data: JsonValue) -> Self {
        Self { action, data }
    }
}

/// A live notification recorded in a tab's message buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    /// Unique message id
    pub id: String,

    /// Subscription that produced the message
    pub subscription_id: String,

    pub action: LiveAction,

    pub data: JsonValue,

    /// Milliseconds since the Unix epoch, shared by every message of the
    /// batch that registered the subscription
    pub timestamp: i64,
}
