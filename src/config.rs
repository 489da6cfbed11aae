//! Configuration, loaded from TOML.
//!
//! # Configuration file format
//!
//! Aqua Buddy looks for `config.toml` in its data directory (override with
//! `--config`). Every field is optional; a missing or empty file gives the
//! defaults shown here.
//!
//! ```toml
//! # Storage key for the hydration record.
//! storage_key = "aqua-buddy-v1"
//!
//! # Which calendar day a drink counts towards: "utc" or "local".
//! day_boundary = "utc"
//!
//! [notifications]
//! enabled = true
//! icon = "/icons/water.svg"
//!
//! # Offline asset cache.
//! [worker]
//! enabled = true
//! # upstream = "https://aqua.example.com"   # origin to fetch assets from
//! listen = "127.0.0.1:8787"                 # address for `aqua serve`
//! cache_name = "aqua-buddy-cache-v1"
//! assets = ["/", "/index.html", "/styles.css", "/script.js",
//!           "/manifest.webmanifest", "/icons/water.svg"]
//! ```

use crate::notify::REMINDER_ICON;
use crate::state::STORAGE_KEY;
use crate::worker::{ASSETS, CACHE_NAME};
use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AquaConfig {
    /// Storage key for the hydration record (default: `aqua-buddy-v1`).
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Day boundary used for the daily rollover.
    #[serde(default)]
    pub day_boundary: DayBoundary,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Which clock decides "today".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    /// Midnight UTC.
    #[default]
    Utc,
    /// Midnight in the local time zone.
    Local,
}

impl DayBoundary {
    pub fn today(self) -> NaiveDate {
        match self {
            Self::Utc => Utc::now().date_naive(),
            Self::Local => Local::now().date_naive(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Set to false to keep reminders in the chat only.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Root-relative icon path, looked up in the asset cache.
    #[serde(default = "default_icon")]
    pub icon: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            icon: default_icon(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Origin the assets are fetched from. Without one the worker serves
    /// only what is already cached.
    #[serde(default)]
    pub upstream: Option<String>,
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_cache_name")]
    pub cache_name: String,
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upstream: None,
            listen: default_listen(),
            cache_name: default_cache_name(),
            assets: default_assets(),
        }
    }
}

impl Default for AquaConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            day_boundary: DayBoundary::default(),
            notifications: NotificationsConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl AquaConfig {
    /// Load configuration from a TOML file, or defaults if it does not
    /// exist. Problems that still leave a usable config are logged.
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: AquaConfig = toml::from_str(&contents)?;
            debug!(path = %path.display(), "loaded config");
            config
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.validate();
        Ok(config)
    }

    fn validate(&self) {
        if self.storage_key.trim().is_empty() {
            warn!("storage_key is empty, records will share an unnamed key");
        }
        if !self.notifications.icon.starts_with('/') {
            warn!(icon = %self.notifications.icon, "notifications.icon should be a root-relative path");
        }
        if let Some(upstream) = &self.worker.upstream
            && !(upstream.starts_with("http://") || upstream.starts_with("https://"))
        {
            warn!(%upstream, "worker.upstream is not an http(s) URL, fetches will fail");
        }
        if self.worker.assets.is_empty() {
            warn!("worker.assets is empty, nothing will be cached at install");
        }
        if self.worker.cache_name.trim().is_empty() {
            warn!("worker.cache_name is empty");
        }
    }
}

/// Default data directory: `<platform data dir>/aqua-buddy`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aqua-buddy")
}

fn default_true() -> bool {
    true
}

fn default_storage_key() -> String {
    STORAGE_KEY.to_string()
}

fn default_icon() -> String {
    REMINDER_ICON.to_string()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

fn default_cache_name() -> String {
    CACHE_NAME.to_string()
}

fn default_assets() -> Vec<String> {
    ASSETS.iter().map(|s| s.to_string()).collect()
}
