//! Remote engine version negotiation.
//!
//! The remote version is advisory with one hard block: a confirmed version
//! older than [`MINIMUM_VERSION`] aborts the connect attempt. When the
//! version cannot be determined the connect proceeds.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::version_endpoint;
use crate::error::{Result, StudioLinkError};
use crate::models::ConnectionConfig;

/// Product tag the engine prefixes its version string with.
pub const VERSION_PREFIX: &str = "surrealdb-";

/// Minimum supported engine version, pinned at build time through the
/// `STUDIO_MIN_DB_VERSION` environment variable.
pub const MINIMUM_VERSION: &str = match option_env!("STUDIO_MIN_DB_VERSION") {
    Some(v) => v,
    None => "1.0.0",
};

/// Outcome of a version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Remote version is at least the minimum.
    Supported(String),
    /// Remote version is older than the minimum.
    Blocked { version: String, minimum: String },
    /// Version could not be determined; the connect proceeds.
    Unknown,
}

impl VersionCheck {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// Known remote version, if any.
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Supported(v) | Self::Blocked { version: v, .. } => Some(v),
            Self::Unknown => None,
        }
    }

    /// Convert a blocked outcome into the user-facing error.
    pub fn into_result(self) -> Result<Option<String>> {
        match self {
            Self::Supported(v) => Ok(Some(v)),
            Self::Unknown => Ok(None),
            Self::Blocked { version, minimum } => {
                Err(StudioLinkError::UnsupportedVersion { version, minimum })
            },
        }
    }
}

/// Strip the product prefix and any `+build` metadata from a version string.
pub fn normalize_version(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed.strip_prefix(VERSION_PREFIX).unwrap_or(trimmed);
    let bare = match without_prefix.split_once('+') {
        Some((version, _build)) => version,
        None => without_prefix,
    };
    bare.trim().to_string()
}

/// Compare a raw remote version against `minimum`.
pub fn evaluate(raw: &str, minimum: &semver::Version) -> Result<VersionCheck> {
    let bare = normalize_version(raw);
    let version = semver::Version::parse(&bare).map_err(|e| {
        StudioLinkError::SerializationError(format!("Malformed version '{}': {}", bare, e))
    })?;

    if version < *minimum {
        Ok(VersionCheck::Blocked {
            version: bare,
            minimum: minimum.to_string(),
        })
    } else {
        Ok(VersionCheck::Supported(bare))
    }
}

/// Source of the remote engine's raw version string.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Fetch the raw version text. `Ok(None)` means the connection has no
    /// version endpoint (embedded engines).
    async fn fetch_version(&self, config: &ConnectionConfig) -> Result<Option<String>>;
}

/// Fetches the version over HTTP from `<base>/version`.
#[derive(Clone)]
pub struct HttpVersionSource {
    http_client: reqwest::Client,
}

impl HttpVersionSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StudioLinkError::ConfigurationError(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn fetch_version(&self, config: &ConnectionConfig) -> Result<Option<String>> {
        let Some(url) = version_endpoint(config)? else {
            return Ok(None);
        };

        debug!("[VERSION] Fetching from url={}", url);
        let start = std::time::Instant::now();
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        debug!(
            "[VERSION] HTTP response received in {:?}, status={}",
            start.elapsed(),
            status
        );

        if !status.is_success() {
            return Err(StudioLinkError::NetworkError(format!(
                "Version endpoint returned {}",
                status
            )));
        }

        Ok(Some(response.text().await?))
    }
}

/// Checks a connection's remote version against the minimum.
#[derive(Clone)]
pub struct VersionNegotiator {
    source: Arc<dyn VersionSource>,
    minimum: semver::Version,
}

impl VersionNegotiator {
    pub fn new(source: Arc<dyn VersionSource>, minimum: &str) -> Result<Self> {
        let minimum = semver::Version::parse(&normalize_version(minimum)).map_err(|e| {
            StudioLinkError::ConfigurationError(format!(
                "Invalid minimum version '{}': {}",
                minimum, e
            ))
        })?;
        Ok(Self { source, minimum })
    }

    pub fn minimum(&self) -> &semver::Version {
        &self.minimum
    }

    /// Run the check. Fetch and parse failures are logged and reported as
    /// [`VersionCheck::Unknown`].
    pub async fn check(&self, config: &ConnectionConfig) -> VersionCheck {
        let raw = match self.source.fetch_version(config).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("[VERSION] No version endpoint for protocol {}", config.protocol);
                return VersionCheck::Unknown;
            },
            Err(e) => {
                warn!("[VERSION] Failed to retrieve database version: {}", e);
                return VersionCheck::Unknown;
            },
        };

        match evaluate(&raw, &self.minimum) {
            Ok(check) => {
                debug!("[VERSION] Database version {:?}", check.version());
                check
            },
            Err(e) => {
                warn!("[VERSION] Failed to parse database version: {}", e);
                VersionCheck::Unknown
            },
        }
    }
}
