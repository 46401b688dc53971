//! Configuration for boardsync, read from `boardsync.toml`.
//!
//! Layered configuration: file → environment → CLI flags. Environment
//! variables are read after `dotenvy` has loaded any `.env` file.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 4040
//! cors_permissive = false
//! room_capacity = 256
//!
//! [persistence]
//! url = "https://boards.example.com"
//! auth_token = "..."
//! timeout_secs = 10
//!
//! [channel]
//! relay_url = "ws://127.0.0.1:4040"
//! max_reconnect_attempts = 5
//! base_delay_ms = 250
//! max_delay_ms = 5000
//!
//! [presence]
//! editing_ttl_ms = 3000
//!
//! [activity]
//! capacity = 10
//! notification_limit = 5
//! notification_ttl_ms = 5000
//!
//! [invite]
//! origin = "https://boards.example.com"
//!
//! [storage]
//! dir = "/var/lib/boardsync"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::activity::{DEFAULT_ACTIVITY_CAPACITY, DEFAULT_NOTIFICATION_LIMIT, DEFAULT_NOTIFICATION_TTL_MS};
use crate::persistence::{BoardCache, GuestSessionStore};
use crate::presence::DEFAULT_EDITING_TTL_MS;
use crate::relay::ServerConfig;
use crate::replica::ReplicaOptions;
use crate::sync::ReconnectPolicy;

pub const CONFIG_FILE: &str = "boardsync.toml";
pub const ENV_PERSISTENCE_URL: &str = "BOARDSYNC_PERSISTENCE_URL";
pub const ENV_PORT: &str = "BOARDSYNC_PORT";
pub const ENV_RELAY_URL: &str = "BOARDSYNC_RELAY_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_permissive: bool,
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4040
}

fn default_room_capacity() -> usize {
    crate::relay::hub::DEFAULT_ROOM_CAPACITY
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_permissive: false,
            room_capacity: default_room_capacity(),
        }
    }
}

/// Persistence service endpoint. Unset means boards stay local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Deadline for each persistence request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    crate::persistence::http::DEFAULT_TIMEOUT.as_secs()
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSection {
    /// WebSocket base of the relay. Defaults to the local `[server]` address.
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            relay_url: None,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSection {
    /// How long an editing indicator survives without a renewal.
    #[serde(default = "default_editing_ttl_ms")]
    pub editing_ttl_ms: i64,
}

fn default_editing_ttl_ms() -> i64 {
    DEFAULT_EDITING_TTL_MS
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            editing_ttl_ms: default_editing_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySection {
    #[serde(default = "default_activity_capacity")]
    pub capacity: usize,
    #[serde(default = "default_notification_limit")]
    pub notification_limit: usize,
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: i64,
}

fn default_activity_capacity() -> usize {
    DEFAULT_ACTIVITY_CAPACITY
}

fn default_notification_limit() -> usize {
    DEFAULT_NOTIFICATION_LIMIT
}

fn default_notification_ttl_ms() -> i64 {
    DEFAULT_NOTIFICATION_TTL_MS
}

impl Default for ActivitySection {
    fn default() -> Self {
        Self {
            capacity: default_activity_capacity(),
            notification_limit: default_notification_limit(),
            notification_ttl_ms: default_notification_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteSection {
    /// Origin invite links are built against.
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_origin() -> String {
    "http://localhost:4040".to_string()
}

impl Default for InviteSection {
    fn default() -> Self {
        Self {
            origin: default_origin(),
        }
    }
}

/// Where the board cache and guest session live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Parsed `boardsync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardsyncToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub presence: PresenceSection,
    #[serde(default)]
    pub activity: ActivitySection,
    #[serde(default)]
    pub invite: InviteSection,
    #[serde(default)]
    pub storage: StorageSection,
}

impl BoardsyncToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse boardsync.toml")
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize boardsync.toml")?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `BOARDSYNC_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_PERSISTENCE_URL).filter(|u| !u.trim().is_empty()) {
            self.persistence.url = Some(url.trim().to_string());
        }
        if let Some(url) = lookup(ENV_RELAY_URL).filter(|u| !u.trim().is_empty()) {
            self.channel.relay_url = Some(url.trim().to_string());
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} '{}'", ENV_PORT, port))?;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; the relay will bind a random port".to_string());
        }
        if self.server.room_capacity == 0 {
            warnings.push("server.room_capacity must be greater than 0".to_string());
        }
        if let Some(url) = &self.persistence.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            warnings.push(format!("Invalid persistence.url '{}': expected http(s) URL", url));
        }
        if self.persistence.timeout_secs == 0 {
            warnings.push("persistence.timeout_secs is 0; every request would fail immediately".to_string());
        }
        if let Some(url) = &self.channel.relay_url
            && !(url.starts_with("ws://") || url.starts_with("wss://"))
        {
            warnings.push(format!("Invalid channel.relay_url '{}': expected ws(s) URL", url));
        }
        if self.channel.max_reconnect_attempts == 0 {
            warnings.push("channel.max_reconnect_attempts is 0; dropped channels never reconnect".to_string());
        }
        if self.channel.base_delay_ms > self.channel.max_delay_ms {
            warnings.push(format!(
                "channel.base_delay_ms ({}) exceeds channel.max_delay_ms ({})",
                self.channel.base_delay_ms, self.channel.max_delay_ms
            ));
        }
        if self.presence.editing_ttl_ms <= 0 {
            warnings.push("presence.editing_ttl_ms must be positive".to_string());
        }
        if self.activity.capacity == 0 {
            warnings.push("activity.capacity must be greater than 0".to_string());
        }
        if self.activity.notification_ttl_ms <= 0 {
            warnings.push("activity.notification_ttl_ms must be positive".to_string());
        }
        if !(self.invite.origin.starts_with("http://") || self.invite.origin.starts_with("https://")) {
            warnings.push(format!(
                "Invalid invite.origin '{}': expected http(s) origin",
                self.invite.origin
            ));
        }

        warnings
    }

    pub fn replica_options(&self) -> ReplicaOptions {
        ReplicaOptions {
            editing_ttl_ms: self.presence.editing_ttl_ms,
            activity_capacity: self.activity.capacity,
            notification_limit: self.activity.notification_limit,
            notification_ttl_ms: self.activity.notification_ttl_ms,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.channel.max_reconnect_attempts,
            base_delay: Duration::from_millis(self.channel.base_delay_ms),
            max_delay: Duration::from_millis(self.channel.max_delay_ms),
        }
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence.timeout_secs)
    }

    /// Relay WebSocket base: configured, else the local `[server]` address.
    pub fn relay_url(&self) -> String {
        match &self.channel.relay_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = match self.server.host.as_str() {
                    "0.0.0.0" | "::" => "127.0.0.1",
                    host => host,
                };
                format!("ws://{}:{}", host, self.server.port)
            }
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            public_origin: self.invite.origin.clone(),
            room_capacity: self.server.room_capacity,
            cors_permissive: self.server.cors_permissive,
        }
    }

    /// Storage directory: configured, else the platform data dir, else `.boardsync`.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("boardsync")))
            .unwrap_or_else(|| PathBuf::from(".boardsync"))
    }

    pub fn board_cache(&self) -> BoardCache {
        BoardCache::new(self.storage_dir().join("boards.json"))
    }

    pub fn guest_session_store(&self) -> GuestSessionStore {
        GuestSessionStore::new(self.storage_dir().join("guest-session.json"))
    }
}
