//! Bridge configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (DCBRIDGE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use dcbridge_core::{OutboundRelay, RouterConfig};
use dcbridge_transport::ident::{DEFAULT_REALM, DEFAULT_USER};
use dcbridge_transport::{ConnectConfig, IdentError, Responder};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// IRC connection and channels.
    #[serde(default)]
    pub irc: IrcConfig,

    /// Outbound relay.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Hub side.
    #[serde(default)]
    pub hub: HubConfig,

    /// Ident responder.
    #[serde(default)]
    pub ident: IdentConfig,

    /// Health and status endpoints.
    #[serde(default)]
    pub http: HttpConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// IRC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Server host.
    #[serde(default = "default_irc_server")]
    pub server: String,

    /// Server port.
    #[serde(default = "default_irc_port")]
    pub port: u16,

    /// Nickname to register with.
    #[serde(default = "default_nickname")]
    pub nickname: String,

    /// Username sent in USER.
    #[serde(default = "default_username")]
    pub username: String,

    /// Real name sent in USER.
    #[serde(default = "default_realname")]
    pub realname: String,

    /// Channel mirrored into the hub.
    #[serde(default = "default_chat_channel")]
    pub chat_channel: String,

    /// Key for the chat channel.
    #[serde(default)]
    pub chat_key: Option<String>,

    /// Channel whose privileges make hub operators.
    #[serde(default)]
    pub management_channel: Option<String>,

    /// Key for the management channel.
    #[serde(default)]
    pub management_key: Option<String>,

    /// Stop renaming after this many nickname conflicts. Unlimited if unset.
    #[serde(default)]
    pub max_nick_retries: Option<u32>,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Delay before reconnecting in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay tick interval in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Characters per relayed message, at most 400.
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
}

/// Hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// The hub's own identity, used as sender for relayed actions.
    #[serde(default = "default_local_nick")]
    pub local_nick: String,

    /// Nicknames already taken by hub-native users.
    #[serde(default)]
    pub native_users: Vec<String>,
}

/// Ident responder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentConfig {
    /// Run the responder.
    #[serde(default)]
    pub enabled: bool,

    /// Host to bind to.
    #[serde(default = "default_ident_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_ident_port")]
    pub port: u16,

    /// Operating system realm in replies.
    #[serde(default = "default_realm")]
    pub realm: String,

    /// User ids to answer with. An empty list answers `NO-USER`.
    #[serde(default = "default_ident_users")]
    pub users: Vec<String>,

    /// Width of a random numeric suffix, 0 for none.
    #[serde(default)]
    pub suffix_digits: u32,

    /// Shuffle the letters of the user id.
    #[serde(default)]
    pub permute: bool,
}

/// HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Serve `/health` and `/status`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host to bind to.
    #[serde(default = "default_http_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_irc_server() -> String {
    std::env::var("DCBRIDGE_IRC_SERVER").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_irc_port() -> u16 {
    std::env::var("DCBRIDGE_IRC_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6667)
}

fn default_nickname() -> String {
    std::env::var("DCBRIDGE_NICK").unwrap_or_else(|_| "dcbridge".to_string())
}

fn default_username() -> String {
    "dcbridge".to_string()
}

fn default_realname() -> String {
    "DC hub bridge".to_string()
}

fn default_chat_channel() -> String {
    std::env::var("DCBRIDGE_CHANNEL").unwrap_or_else(|_| "#dcbridge".to_string())
}

fn default_connect_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_reconnect_delay() -> u64 {
    10_000 // 10 seconds
}

fn default_tick_ms() -> u64 {
    150
}

fn default_chunk_limit() -> usize {
    dcbridge_core::CHUNK_LIMIT
}

fn default_local_nick() -> String {
    std::env::var("DCBRIDGE_HUB_NICK").unwrap_or_else(|_| "Hub".to_string())
}

fn default_ident_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ident_port() -> u16 {
    dcbridge_transport::ident::DEFAULT_PORT
}

fn default_realm() -> String {
    DEFAULT_REALM.to_string()
}

fn default_ident_users() -> Vec<String> {
    vec![DEFAULT_USER.to_string()]
}

fn default_http_host() -> String {
    std::env::var("DCBRIDGE_HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_http_port() -> u16 {
    std::env::var("DCBRIDGE_HTTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: default_irc_server(),
            port: default_irc_port(),
            nickname: default_nickname(),
            username: default_username(),
            realname: default_realname(),
            chat_channel: default_chat_channel(),
            chat_key: None,
            management_channel: None,
            management_key: None,
            max_nick_retries: None,
            connect_timeout_ms: default_connect_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            chunk_limit: default_chunk_limit(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            local_nick: default_local_nick(),
            native_users: Vec::new(),
        }
    }
}

impl Default for IdentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_ident_host(),
            port: default_ident_port(),
            realm: default_realm(),
            users: default_ident_users(),
            suffix_digits: 0,
            permute: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// `DCBRIDGE_CONFIG` names a file explicitly; otherwise the usual
    /// locations are searched.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("DCBRIDGE_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let config_paths = [
            "dcbridge.toml",
            "/etc/dcbridge/dcbridge.toml",
            "~/.config/dcbridge/dcbridge.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Event router settings.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            nickname: self.irc.nickname.clone(),
            chat_channel: self.irc.chat_channel.clone(),
            chat_key: self.irc.chat_key.clone(),
            management_channel: self.irc.management_channel.clone(),
            management_key: self.irc.management_key.clone(),
            max_nick_retries: self.irc.max_nick_retries,
        }
    }

    /// Outbound relay.
    #[must_use]
    pub fn relay(&self) -> OutboundRelay {
        OutboundRelay::new(self.relay.chunk_limit)
    }

    /// Relay tick interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.relay.tick_ms.max(1))
    }

    /// IRC connection settings.
    #[must_use]
    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            host: self.irc.server.clone(),
            port: self.irc.port,
            connect_timeout: Duration::from_millis(self.irc.connect_timeout_ms),
            ..ConnectConfig::default()
        }
    }

    /// Ident responder built from the `ident` section.
    #[must_use]
    pub fn responder(&self) -> Responder {
        if self.ident.users.is_empty() {
            return Responder::Failure(IdentError::NoUser);
        }
        Responder::Success {
            realm: self.ident.realm.clone(),
            users: self.ident.users.clone(),
            suffix_digits: self.ident.suffix_digits,
            permute: self.ident.permute,
        }
    }

    /// Address for the HTTP endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn http_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.http.host, self.http.port)
    }

    /// Address for the ident responder.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn ident_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.ident.host, self.ident.port)
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid address: {host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay.tick_ms, 150);
        assert_eq!(config.relay.chunk_limit, 400);
        assert!(config.irc.management_channel.is_none());
        assert!(config.irc.max_nick_retries.is_none());
        assert!(!config.ident.enabled);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r##"
            [irc]
            server = "irc.example.net"
            nickname = "hubbridge"
            chat_channel = "#hub"
            management_channel = "#hub-ops"
            management_key = "s3cret"
            max_nick_retries = 5

            [relay]
            tick_ms = 250

            [hub]
            local_nick = "Security"
            native_users = ["alice"]

            [ident]
            enabled = true
            users = ["a", "b"]
            suffix_digits = 2
        "##;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.irc.server, "irc.example.net");
        assert_eq!(config.irc.username, "dcbridge");
        assert_eq!(config.relay.tick_ms, 250);
        assert_eq!(config.relay.chunk_limit, 400);
        assert_eq!(config.hub.native_users, vec!["alice"]);

        let router = config.router_config();
        assert_eq!(router.nickname, "hubbridge");
        assert_eq!(router.chat_channel, "#hub");
        assert_eq!(router.management_channel.as_deref(), Some("#hub-ops"));
        assert_eq!(router.management_key.as_deref(), Some("s3cret"));
        assert_eq!(router.max_nick_retries, Some(5));

        assert_eq!(
            config.responder(),
            Responder::Success {
                realm: "UNIX".into(),
                users: vec!["a".into(), "b".into()],
                suffix_digits: 2,
                permute: false,
            }
        );
    }

    #[test]
    fn test_empty_ident_users_answer_no_user() {
        let mut config = Config::default();
        config.ident.users.clear();
        assert_eq!(config.responder(), Responder::Failure(IdentError::NoUser));
    }

    #[test]
    fn test_addresses() {
        let mut config = Config::default();
        config.http.host = "0.0.0.0".into();
        config.http.port = 8081;
        assert_eq!(config.http_addr().unwrap().port(), 8081);

        config.ident.host = "not an address".into();
        assert!(config.ident_addr().is_err());
    }

    #[test]
    fn test_relay_chunk_limit_is_clamped() {
        let mut config = Config::default();
        config.relay.chunk_limit = 4000;
        assert_eq!(config.relay().chunk_limit(), 400);
    }
}
