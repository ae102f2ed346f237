use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tuning for the collaboration hub. Every field has a default so a partial
/// `[hub]` table is enough.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Queued operations per room before `RoomBackpressure`
    pub room_queue_depth: usize,
    pub coordinator_queue_depth: usize,
    /// Per-connection outbound buffer
    pub outbound_buffer: usize,
    /// How long a full outbound buffer may stall one delivery
    pub send_timeout_ms: u64,
    /// Idle period after which an empty room terminates
    pub room_idle_timeout_secs: u64,
    pub max_text_len: usize,
    pub max_messages_per_sec: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            room_queue_depth: 256,
            coordinator_queue_depth: 1024,
            outbound_buffer: 64,
            send_timeout_ms: 250,
            room_idle_timeout_secs: 30,
            max_text_len: 4000,
            max_messages_per_sec: 20,
        }
    }
}

impl HubConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn room_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.room_idle_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.room_queue_depth == 0 {
            bail!("hub.room_queue_depth must be greater than zero");
        }
        if self.coordinator_queue_depth == 0 {
            bail!("hub.coordinator_queue_depth must be greater than zero");
        }
        if self.outbound_buffer == 0 {
            bail!("hub.outbound_buffer must be greater than zero");
        }
        if self.max_messages_per_sec == 0 {
            bail!("hub.max_messages_per_sec must be greater than zero");
        }
        if self.send_timeout_ms == 0 {
            bail!("hub.send_timeout_ms must be greater than zero");
        }
        if self.room_idle_timeout_secs == 0 {
            bail!("hub.room_idle_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub database: String,
    pub cors_origin: Option<String>,
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            database: "scenehub.db".to_string(),
            cors_origin: None,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content).context("Invalid config file")?;
        config.hub.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }
}
