//! Per-homeserver proxy sections and their resolution.
//!
//! Each `[servers.<name>]` table describes one proxied homeserver. Fields left
//! out inherit from `[defaults]`; resolution turns the raw strings into typed
//! addresses and URIs so that bad values fail at start-up.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use hyper::Uri;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogLevel};

/// Values inherited by every server section that does not set them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDefaults {
    /// Local address the proxy listens on ("localhost" or an IP literal).
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Local port the proxy listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Whether TLS is used towards the homeserver.
    #[serde(default = "default_ssl")]
    pub ssl: bool,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            ssl: default_ssl(),
        }
    }
}

fn default_listen_address() -> String {
    "localhost".to_string()
}

fn default_listen_port() -> u16 {
    8009
}

fn default_ssl() -> bool {
    true
}

/// One proxied homeserver as written in TOML.
///
/// ## TOML Example
///
/// ```toml
/// [servers.clocktown]
/// homeserver = "https://example.org"
/// listen_address = "::1"
/// listen_port = 8010
/// proxy = "http://localhost:8080"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// URL of the homeserver requests are forwarded to.
    #[serde(default)]
    pub homeserver: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,

    /// Outbound HTTP proxy used when talking to the homeserver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,

    /// Per-server log level override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ServerConfig {
    /// Create a section for the given homeserver with every other field inherited.
    pub fn new(homeserver: impl Into<String>) -> Self {
        Self {
            homeserver: homeserver.into(),
            listen_address: None,
            listen_port: None,
            proxy: None,
            ssl: None,
            log_level: None,
        }
    }
}

/// A server section after defaults are applied and values parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedServer {
    pub name: String,
    pub homeserver: Uri,
    pub listen: SocketAddr,
    pub proxy: Option<Uri>,
    pub ssl: bool,
    pub log_level: Option<LogLevel>,
}

impl ResolvedServer {
    /// Apply `defaults` to `raw` and parse every field.
    pub fn resolve(
        name: &str,
        raw: &ServerConfig,
        defaults: &ServerDefaults,
    ) -> Result<Self, ConfigError> {
        if raw.homeserver.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "servers.{name}.homeserver is not set"
            )));
        }
        let homeserver = parse_http_url(&raw.homeserver)
            .map_err(|e| ConfigError::Validation(format!("servers.{name}.homeserver: {e}")))?;

        let proxy = raw
            .proxy
            .as_deref()
            .map(parse_http_url)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("servers.{name}.proxy: {e}")))?;

        let address_str = raw
            .listen_address
            .as_deref()
            .unwrap_or(&defaults.listen_address);
        let address = parse_address(address_str)
            .map_err(|e| ConfigError::Validation(format!("servers.{name}.listen_address: {e}")))?;

        let port = raw.listen_port.unwrap_or(defaults.listen_port);
        if port == 0 {
            return Err(ConfigError::Validation(format!(
                "servers.{name}.listen_port must be non-zero"
            )));
        }

        let log_level = raw
            .log_level
            .as_deref()
            .map(LogLevel::parse)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("servers.{name}.log_level: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            homeserver,
            listen: SocketAddr::new(address, port),
            proxy,
            ssl: raw.ssl.unwrap_or(defaults.ssl),
            log_level,
        })
    }
}

/// Parse a listen address; `localhost` maps to the IPv4 loopback.
pub fn parse_address(value: &str) -> Result<IpAddr, String> {
    if value == "localhost" {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    value
        .parse::<IpAddr>()
        .map_err(|_| format!("{value:?} is not an IP address"))
}

/// Parse a URL that must use the `http` or `https` scheme and name a host.
pub fn parse_http_url(value: &str) -> Result<Uri, String> {
    let uri: Uri = value
        .parse()
        .map_err(|e| format!("{value:?} is not a valid URL: {e}"))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => {
            return Err(format!(
                "invalid URL scheme {other:?}, only HTTP(s) URLs are allowed"
            ));
        }
        None => return Err(format!("{value:?} has no URL scheme")),
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err(format!("{value:?} has no host"));
    }

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_localhost_maps_to_loopback() {
        assert_eq!(
            parse_address("localhost").unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[test]
    fn test_ipv6_address() {
        assert!(parse_address("::1").unwrap().is_ipv6());
    }

    #[test]
    fn test_hostname_is_not_an_address() {
        assert!(parse_address("example.org").is_err());
    }

    #[test]
    fn test_url_schemes() {
        assert!(parse_http_url("https://example.org").is_ok());
        assert!(parse_http_url("http://localhost:8008").is_ok());
        assert!(parse_http_url("ftp://example.org").is_err());
        assert!(parse_http_url("example.org").is_err());
    }

    #[test]
    fn test_resolve_inherits_defaults() {
        let defaults = ServerDefaults {
            listen_address: "::1".to_string(),
            listen_port: 9000,
            ssl: false,
        };
        let raw = ServerConfig::new("https://example.org");
        let resolved = ResolvedServer::resolve("local", &raw, &defaults).unwrap();
        assert_eq!(resolved.listen, "[::1]:9000".parse::<SocketAddr>().unwrap());
        assert!(!resolved.ssl);
        assert_eq!(resolved.proxy, None);
    }

    #[test]
    fn test_resolve_section_overrides_defaults() {
        let mut raw = ServerConfig::new("https://example.org");
        raw.listen_port = Some(8100);
        raw.ssl = Some(false);
        let resolved = ResolvedServer::resolve("local", &raw, &ServerDefaults::default()).unwrap();
        assert_eq!(resolved.listen, "127.0.0.1:8100".parse::<SocketAddr>().unwrap());
        assert!(!resolved.ssl);
    }

    #[test]
    fn test_resolve_requires_homeserver() {
        let raw = ServerConfig::new("");
        let err = ResolvedServer::resolve("empty", &raw, &ServerDefaults::default()).unwrap_err();
        assert!(err.to_string().contains("servers.empty.homeserver"));
    }

    #[test]
    fn test_resolve_rejects_bad_proxy_scheme() {
        let mut raw = ServerConfig::new("https://example.org");
        raw.proxy = Some("socks5://localhost:1080".to_string());
        assert!(ResolvedServer::resolve("p", &raw, &ServerDefaults::default()).is_err());
    }
}
