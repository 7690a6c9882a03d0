//! Bridge configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identity string the backend reports from its health endpoint.
pub const DEFAULT_APP_IDENTITY: &str = "yt-dlp-host";
/// Canonical port the backend listens on absent configuration.
pub const DEFAULT_BASE_PORT: u16 = 9090;

/// Where discovery looks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryOrder {
    /// Revalidate the cached port, then the canonical port, then scan.
    CacheFirst,
    /// Probe the canonical port, then the cached port, then scan.
    DefaultFirst,
}

impl DiscoveryOrder {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "cache_first" | "cache-first" => Some(Self::CacheFirst),
            "default_first" | "default-first" => Some(Self::DefaultFirst),
            _ => None,
        }
    }
}

/// Paths to vidlink data on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Durable key-value store (`data/vidlink.db`).
    pub store_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            store_file: root.join("vidlink.db"),
            root,
        })
    }
}

/// Tunables for discovery, polling and deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub host: String,
    pub base_port: u16,
    /// Number of ports above `base_port` that belong to the scan range.
    pub port_span: u16,
    pub batch_size: usize,
    pub probe_timeout_ms: u64,
    pub health_interval_ms: u64,
    pub discovery_interval_ms: u64,
    pub queue_poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub dedup_cooldown_ms: u64,
    pub app_identity: String,
    pub discovery_order: DiscoveryOrder,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            base_port: DEFAULT_BASE_PORT,
            port_span: 15,
            batch_size: 5,
            probe_timeout_ms: 2000,
            health_interval_ms: 4000,
            discovery_interval_ms: 30_000,
            queue_poll_interval_ms: 2000,
            request_timeout_ms: 10_000,
            backoff_base_ms: 1000,
            backoff_max_ms: 60_000,
            dedup_cooldown_ms: 5000,
            app_identity: DEFAULT_APP_IDENTITY.into(),
            discovery_order: DiscoveryOrder::CacheFirst,
        }
    }
}

impl BridgeConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("VIDLINK_HOST") {
            if !host.trim().is_empty() {
                config.host = host.trim().to_string();
            }
        }
        if let Some(v) = env_parse("VIDLINK_BASE_PORT")? {
            config.base_port = v;
        }
        if let Some(v) = env_parse("VIDLINK_PORT_SPAN")? {
            config.port_span = v;
        }
        if let Some(v) = env_parse("VIDLINK_BATCH_SIZE")? {
            config.batch_size = v;
        }
        if let Some(v) = env_parse("VIDLINK_PROBE_TIMEOUT_MS")? {
            config.probe_timeout_ms = v;
        }
        if let Some(v) = env_parse("VIDLINK_HEALTH_INTERVAL_MS")? {
            config.health_interval_ms = v;
        }
        if let Some(v) = env_parse("VIDLINK_DISCOVERY_INTERVAL_MS")? {
            config.discovery_interval_ms = v;
        }
        if let Some(v) = env_parse("VIDLINK_QUEUE_POLL_INTERVAL_MS")? {
            config.queue_poll_interval_ms = v;
        }
        if let Some(v) = env_parse("VIDLINK_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = v;
        }
        if let Some(v) = env_parse("VIDLINK_BACKOFF_BASE_MS")? {
            config.backoff_base_ms = v;
        }
        if let Some(v) = env_parse("VIDLINK_BACKOFF_MAX_MS")? {
            config.backoff_max_ms = v;
        }
        if let Some(v) = env_parse("VIDLINK_DEDUP_COOLDOWN_MS")? {
            config.dedup_cooldown_ms = v;
        }
        if let Ok(identity) = std::env::var("VIDLINK_APP_IDENTITY") {
            if !identity.trim().is_empty() {
                config.app_identity = identity.trim().to_string();
            }
        }
        if let Ok(order) = std::env::var("VIDLINK_DISCOVERY_ORDER") {
            config.discovery_order = DiscoveryOrder::from_name(&order).ok_or_else(|| {
                Error::Config(format!("unknown discovery order: {}", order))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the drivers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.probe_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        if self.health_interval_ms == 0
            || self.queue_poll_interval_ms == 0
            || self.discovery_interval_ms == 0
        {
            return Err(Error::Config("poll intervals must be non-zero".into()));
        }
        if self.backoff_base_ms == 0 || self.backoff_base_ms > self.backoff_max_ms {
            return Err(Error::Config(format!(
                "invalid backoff bounds: base={} max={}",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        if self.base_port.checked_add(self.port_span).is_none() {
            return Err(Error::Config(format!(
                "port range {}+{} overflows",
                self.base_port, self.port_span
            )));
        }
        Ok(())
    }

    /// Last port of the inclusive scan range.
    pub fn max_port(&self) -> u16 {
        self.base_port.saturating_add(self.port_span)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn dedup_cooldown(&self) -> Duration {
        Duration::from_millis(self.dedup_cooldown_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid value: {}", name, raw))),
        _ => Ok(None),
    }
}
