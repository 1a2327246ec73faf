use crate::error::{ExporterError, Result};
use crate::types::ServerPreference;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9090";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

// Routes served alongside the metrics endpoint
const RESERVED_PATHS: &[&str] = &["/", "/health"];

/// Exporter configuration, loaded from TOML and then overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_address: String,
    pub metrics_path: String,
    /// Server to test against; -1 picks the closest one. Any other value,
    /// negative or not, must be in the server list.
    pub server_id: i64,
    /// Fall back to the closest server if `server_id` is not in the list.
    pub server_fallback: bool,
    pub log: LogSettings,
    pub provider: ProviderSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            server_id: -1,
            server_fallback: false,
            log: LogSettings::default(),
            provider: ProviderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: String,
    pub config_url: String,
    pub servers_url: String,
    pub request_timeout_secs: u64,
    pub ping_samples: usize,
    /// Edge length of the random JPEG used for downloads (e.g. 2000 -> random2000x2000.jpg).
    pub download_size: u32,
    pub download_streams: usize,
    /// Bytes per upload request.
    pub upload_size: usize,
    pub upload_streams: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "speedtest-net".to_string(),
            config_url: "https://www.speedtest.net/speedtest-config.php".to_string(),
            servers_url: "https://www.speedtest.net/api/js/servers?engine=js&limit=10".to_string(),
            request_timeout_secs: 30,
            ping_samples: 10,
            download_size: 2000,
            download_streams: 4,
            upload_size: 1_000_000,
            upload_streams: 4,
        }
    }
}

impl ProviderSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Default location: `<config dir>/speedtest-exporter/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "speedtest-exporter")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration.
    /// Strategy:
    /// 1. An explicit path must exist and parse.
    /// 2. Otherwise the default path is used if present.
    /// 3. Otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.metrics_path.starts_with('/') || RESERVED_PATHS.contains(&self.metrics_path.as_str()) {
            return Err(ExporterError::Custom(format!(
                "metrics_path must start with '/' and not be one of {:?}: {}",
                RESERVED_PATHS, self.metrics_path
            )));
        }
        if self.provider.ping_samples == 0
            || self.provider.download_streams == 0
            || self.provider.upload_streams == 0
        {
            return Err(ExporterError::Custom(
                "provider ping_samples, download_streams and upload_streams must be at least 1"
                    .to_string(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(ExporterError::Custom(
                "provider request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn preference(&self) -> ServerPreference {
        ServerPreference::from_raw(self.server_id)
    }
}
