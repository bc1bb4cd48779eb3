use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StudioLinkError;

/// Transport protocol of a connection.
///
/// `Mem` and `Indxdb` address an embedded engine; the rest are network
/// protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    #[default]
    Ws,
    Wss,
    Mem,
    Indxdb,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
            Protocol::Mem => "mem",
            Protocol::Indxdb => "indxdb",
        }
    }

    /// Returns `true` for in-process engines that have no network endpoint.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Protocol::Mem | Protocol::Indxdb)
    }

    /// Returns `true` if the protocol can deliver live query notifications.
    pub fn supports_live_queries(&self) -> bool {
        matches!(self, Protocol::Ws | Protocol::Wss | Protocol::Mem | Protocol::Indxdb)
    }

    /// Returns `true` for TLS-secured network protocols.
    pub fn is_secure(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::Wss)
    }

    /// The HTTP scheme used to reach side endpoints (version, sql, signin).
    pub fn http_scheme(&self) -> &'static str {
        if self.is_secure() {
            "https"
        } else {
            "http"
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = StudioLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "ws" => Ok(Protocol::Ws),
            "wss" => Ok(Protocol::Wss),
            "mem" => Ok(Protocol::Mem),
            "indxdb" => Ok(Protocol::Indxdb),
            other => Err(StudioLinkError::UnsupportedProtocol(other.to_string())),
        }
    }
}
