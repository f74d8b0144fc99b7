// Error types for stream resolution and player handoff

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// A required input (embed URL, playlist URL) was empty
    #[error("empty {0}")]
    EmptyInput(&'static str),

    /// Embed URL could not be parsed as an absolute http(s) URL
    #[error("malformed URL {url}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Network error, timeout or non-2xx response while fetching a page
    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// Embed page lacks one or more obfuscated variables
    #[error("embed page is missing variables: {}", .0.join(", "))]
    MissingVars(Vec<&'static str>),

    /// Every host in the probe pool failed, with both the page token and the fallback
    #[error("no working host after {attempts} probes")]
    NoWorkingHost { attempts: usize },

    /// Headless browser could not be started or prepared
    #[error("browser launch failed: {0}")]
    BrowserLaunchFailure(String),

    /// Neither network interception nor DOM inspection produced a playlist
    #[error("no playlist captured within {}s", .0.as_secs())]
    CaptureTimeout(Duration),

    /// Player process could not be started
    #[error("failed to start {program}: {reason}")]
    PlayerLaunchFailure { program: String, reason: String },

    /// Attached player exited unsuccessfully
    #[error("{program} exited with {status}")]
    PlayerExitError { program: String, status: String },

    /// Caller cancelled the operation
    #[error("cancelled")]
    Cancelled,
}

impl ExtractError {
    pub fn fetch(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::FetchFailure {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::MalformedUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Generate suggestion for the user based on the failure kind
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::MalformedUrl { .. } | Self::EmptyInput(_) => Some(
                "Check the embed URL. It must be an absolute http(s) link\n\
                 as served by the catalogue."
                    .to_string(),
            ),
            Self::FetchFailure { .. } => Some(
                "The embed page could not be loaded. Try:\n\
                 1) Check your internet connection\n\
                 2) Configure a proxy in config.toml\n\
                 3) Try again later"
                    .to_string(),
            ),
            Self::MissingVars(_) | Self::NoWorkingHost { .. } => Some(
                "The static resolver could not rebuild the playlist URL.\n\
                 The provider may have rotated its obfuscation. Try:\n\
                 1) Run with --mode browser\n\
                 2) Open the stream in a browser with --open-browser"
                    .to_string(),
            ),
            Self::BrowserLaunchFailure(_) => Some(
                "Chromium could not be started. Try:\n\
                 1) Install chromium or google-chrome\n\
                 2) Set chrome_executable in config.toml\n\
                 3) Run with --mode static"
                    .to_string(),
            ),
            Self::CaptureTimeout(_) => Some(
                "No playlist appeared while the page was rendering.\n\
                 The stream may be offline or geo-restricted."
                    .to_string(),
            ),
            Self::PlayerLaunchFailure { .. } => Some(
                "Install mpv (or set `player` in config.toml) and make sure it is in PATH."
                    .to_string(),
            ),
            Self::PlayerExitError { .. } | Self::Cancelled => None,
        }
    }
}

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Input,
    Resolve(&'static str),
    Normalize,
    Launch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Resolve(name) => write!(f, "resolve ({})", name),
            Self::Normalize => write!(f, "normalize"),
            Self::Launch => write!(f, "launch"),
        }
    }
}

/// Terminal failure surfaced by the orchestrator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: ExtractError,
}

impl StageError {
    pub fn new(stage: Stage, source: ExtractError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> &ExtractError {
        &self.source
    }
}
