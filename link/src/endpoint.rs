//! Endpoint resolution for connections.
//!
//! A configured hostname may carry a port, a base path and even a trailing
//! `rpc` segment; every derived endpoint trims that segment and appends its
//! own path. The HTTP transport derives its request URLs from the RPC
//! endpoint it is opened with.

use crate::error::{Result, StudioLinkError};
use crate::models::{ConnectionConfig, Protocol};

/// RPC endpoint used to open the transport.
///
/// - `mem` → `mem://`
/// - `indxdb` → `indxdb://<hostname>`
/// - otherwise `<protocol>://<host>/<base>/rpc`
pub fn rpc_endpoint(config: &ConnectionConfig) -> Result<String> {
    match config.protocol {
        Protocol::Mem => Ok("mem://".to_string()),
        Protocol::Indxdb => Ok(format!("indxdb://{}", config.hostname.trim())),
        protocol => endpoint_with_path(protocol.as_str(), &config.hostname, "rpc"),
    }
}

/// HTTP endpoint serving the engine version, `None` for embedded engines.
pub fn version_endpoint(config: &ConnectionConfig) -> Result<Option<String>> {
    if config.protocol.is_embedded() {
        return Ok(None);
    }
    endpoint_with_path(config.protocol.http_scheme(), &config.hostname, "version").map(Some)
}

fn endpoint_with_path(scheme: &str, hostname: &str, path: &str) -> Result<String> {
    let hostname = hostname.trim();
    let hostname = hostname
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(hostname);

    if hostname.is_empty() {
        return Err(StudioLinkError::ConfigurationError(
            "hostname is required".into(),
        ));
    }

    let (authority, base_path) = match hostname.find('/') {
        Some(idx) => (&hostname[..idx], &hostname[idx..]),
        None => (hostname, "/"),
    };

    if authority.is_empty() {
        return Err(StudioLinkError::ConfigurationError(format!(
            "invalid hostname '{}'",
            hostname
        )));
    }

    let mut base_path = base_path.to_string();
    if let Some(stripped) = base_path.strip_suffix("rpc") {
        base_path = stripped.to_string();
    }
    if !base_path.ends_with('/') {
        base_path.push('/');
    }

    Ok(format!("{}://{}{}{}", scheme, authority, base_path, path))
}
