//! Timeout configuration for studio-link operations.
//!
//! Centralizes every deadline the session core applies: query batches, the
//! version probe, transport open, teardown grace and keepalive.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout configuration for session operations.
///
/// # Examples
///
/// ```rust
/// use studio_link::StudioLinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults (recommended)
/// let timeouts = StudioLinkTimeouts::default();
///
/// // Custom query timeout
/// let timeouts = StudioLinkTimeouts::builder()
///     .query_timeout_secs(120)
///     .build();
/// assert_eq!(timeouts.query_timeout, Duration::from_secs(120));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioLinkTimeouts {
    /// Maximum time to wait for a query batch before answering with a
    /// synthetic "timed out" response.
    /// Default: 5 seconds
    #[serde(with = "duration_secs")]
    pub query_timeout: Duration,

    /// Maximum time to wait for the remote version endpoint.
    /// Default: 5 seconds
    #[serde(with = "duration_secs")]
    pub version_check_timeout: Duration,

    /// Timeout for opening the transport (TCP + TLS + WebSocket handshake).
    /// Zero disables the deadline.
    /// Default: 0 (disabled)
    #[serde(with = "duration_secs")]
    pub connection_timeout: Duration,

    /// Grace period after closing a transport, absorbing late teardown
    /// notifications before the next connect proceeds.
    /// Default: 100 milliseconds
    #[serde(with = "duration_millis")]
    pub teardown_grace: Duration,

    /// Keep-alive ping interval for WebSocket transports. Zero disables pings.
    /// Default: 30 seconds
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,
}

impl Default for StudioLinkTimeouts {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            version_check_timeout: Duration::from_secs(5),
            connection_timeout: Duration::ZERO,
            teardown_grace: Duration::from_millis(100),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl StudioLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> StudioLinkTimeoutsBuilder {
        StudioLinkTimeoutsBuilder::new()
    }

    /// Timeouts suited to a database on localhost.
    pub fn fast() -> Self {
        Self {
            query_timeout: Duration::from_secs(2),
            version_check_timeout: Duration::from_secs(1),
            connection_timeout: Duration::from_secs(2),
            teardown_grace: Duration::from_millis(50),
            keepalive_interval: Duration::from_secs(15),
        }
    }

    /// Timeouts suited to high-latency or long-running workloads.
    pub fn relaxed() -> Self {
        Self {
            query_timeout: Duration::from_secs(120),
            version_check_timeout: Duration::from_secs(15),
            connection_timeout: Duration::from_secs(30),
            teardown_grace: Duration::from_millis(250),
            keepalive_interval: Duration::from_secs(30),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`StudioLinkTimeouts`].
#[derive(Debug, Clone)]
pub struct StudioLinkTimeoutsBuilder {
    timeouts: StudioLinkTimeouts,
}

impl StudioLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: StudioLinkTimeouts::default(),
        }
    }

    /// Set the query batch timeout.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.query_timeout = timeout;
        self
    }

    /// Set the query batch timeout in seconds.
    pub fn query_timeout_secs(self, secs: u64) -> Self {
        self.query_timeout(Duration::from_secs(secs))
    }

    /// Set the version probe timeout.
    pub fn version_check_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.version_check_timeout = timeout;
        self
    }

    /// Set the version probe timeout in seconds.
    pub fn version_check_timeout_secs(self, secs: u64) -> Self {
        self.version_check_timeout(Duration::from_secs(secs))
    }

    /// Set the transport open timeout. Zero disables it.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the teardown grace period.
    pub fn teardown_grace(mut self, grace: Duration) -> Self {
        self.timeouts.teardown_grace = grace;
        self
    }

    /// Set the keepalive interval. Zero disables pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> StudioLinkTimeouts {
        self.timeouts
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = StudioLinkTimeouts::default();
        assert_eq!(timeouts.query_timeout, Duration::from_secs(5));
        assert_eq!(timeouts.teardown_grace, Duration::from_millis(100));
        assert!(timeouts.connection_timeout.is_zero());
    }

    #[test]
    fn test_builder() {
        let timeouts = StudioLinkTimeouts::builder()
            .query_timeout_secs(60)
            .version_check_timeout_secs(2)
            .teardown_grace(Duration::ZERO)
            .build();

        assert_eq!(timeouts.query_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.version_check_timeout, Duration::from_secs(2));
        assert!(timeouts.teardown_grace.is_zero());
    }

    #[test]
    fn test_presets() {
        assert!(StudioLinkTimeouts::fast().query_timeout <= Duration::from_secs(5));
        assert!(StudioLinkTimeouts::relaxed().query_timeout >= Duration::from_secs(60));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(StudioLinkTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!StudioLinkTimeouts::is_no_timeout(Duration::from_secs(1)));
    }
}
