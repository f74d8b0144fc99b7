// Extractor configuration: defaults, config.toml loading and env override

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::diagnostics::DEFAULT_LOG_CAPACITY;
use super::traits::ResolverMode;

pub const CONFIG_DIR_NAME: &str = "stream-extractor";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const MODE_ENV_VAR: &str = "STREAM_EXTRACTOR_MODE";

const DEFAULT_HOSTS: [&str; 5] = [
    "lb1.streamcdn.top",
    "lb2.streamcdn.top",
    "lb3.streamcdn.top",
    "lb4.streamcdn.top",
    "lb5.streamcdn.top",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {var}: {reason}")]
    Env { var: &'static str, reason: String },
}

/// Configuration for stream resolution and playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Resolution strategy
    pub mode: ResolverMode,
    /// Player executable
    pub player: String,
    /// Overrides the system URL opener (xdg-open / open)
    pub url_opener: Option<String>,
    /// Embed page and companion script fetch timeout
    pub fetch_timeout_secs: u64,
    /// Per-host HEAD probe timeout
    pub probe_timeout_secs: u64,
    /// Browser top-level navigation timeout
    pub navigation_timeout_secs: u64,
    /// How long to wait for a playlist request once navigation returns
    pub capture_wait_secs: u64,
    /// Extra wait for a leaf playlist after a provisional capture
    pub capture_settle_millis: u64,
    /// Hard ceiling on one resolution
    pub resolve_deadline_secs: u64,
    /// Candidate playlist hosts, probed in this order
    pub host_pool: Vec<String>,
    /// Token tried when the companion script yields none
    pub fallback_token: String,
    /// Companion script location, relative to the embed URL
    pub companion_script_path: String,
    /// Explicit Chromium/Chrome binary
    pub chrome_executable: Option<PathBuf>,
    /// HTTP/SOCKS proxy URL
    pub proxy: Option<String>,
    /// Retained diagnostic lines
    pub log_capacity: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: ResolverMode::Browser,
            player: "mpv".to_string(),
            url_opener: None,
            fetch_timeout_secs: 10,
            probe_timeout_secs: 4,
            navigation_timeout_secs: 45,
            capture_wait_secs: 20,
            capture_settle_millis: 3000,
            resolve_deadline_secs: 90,
            host_pool: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
            fallback_token: "public".to_string(),
            companion_script_path: "/js/embed.min.js".to_string(),
            chrome_executable: None,
            proxy: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl ExtractorConfig {
    /// `<config_dir>/stream-extractor/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults when absent,
    /// then apply the environment override
    pub fn load() -> Result<Self, ConfigError> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.with_env_override(std::env::var(MODE_ENV_VAR).ok().as_deref())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn with_env_override(self, mode: Option<&str>) -> Result<Self, ConfigError> {
        match mode.map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => {
                let mode = raw.parse().map_err(|reason| ConfigError::Env {
                    var: MODE_ENV_VAR,
                    reason,
                })?;
                Ok(self.with_mode(mode))
            }
            None => Ok(self),
        }
    }

    pub fn with_mode(mut self, mode: ResolverMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_player(mut self, player: impl Into<String>) -> Self {
        self.player = player.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_chrome_executable(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_executable = path;
        self
    }

    pub fn with_host_pool(mut self, hosts: Vec<String>) -> Self {
        self.host_pool = hosts;
        self
    }

    pub fn with_deadline(mut self, seconds: u64) -> Self {
        self.resolve_deadline_secs = seconds;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn capture_wait(&self) -> Duration {
        Duration::from_secs(self.capture_wait_secs)
    }

    pub fn capture_settle(&self) -> Duration {
        Duration::from_millis(self.capture_settle_millis)
    }

    pub fn resolve_deadline(&self) -> Duration {
        Duration::from_secs(self.resolve_deadline_secs)
    }
}
