// Common data models for stream resolution

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ExtractError;
use super::headers::HeaderSet;

/// File extension marker every playlist URL carries
pub const PLAYLIST_MARKER: &str = ".m3u8";

/// Body marker of a leaf playlist (one that lists media segments)
pub const SEGMENT_MARKER: &str = "#EXTINF";

/// How a playlist URL was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    /// Observed as a live network response while the page rendered
    NetworkIntercepted,
    /// Read from the rendered DOM after no response was observed
    DomFallback,
    /// Rebuilt from page variables and confirmed by a host probe
    StaticProbe,
    /// Found verbatim in the raw embed HTML
    PageScan,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkIntercepted => write!(f, "network-intercepted"),
            Self::DomFallback => write!(f, "dom-fallback"),
            Self::StaticProbe => write!(f, "static-probe"),
            Self::PageScan => write!(f, "page-scan"),
        }
    }
}

/// Embed page reference with the headers derived for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedReference {
    pub url: String,
    pub origin: String,
    pub referer: String,
    pub user_agent: String,
}

impl EmbedReference {
    /// Derived request headers for fetching this embed page
    pub fn headers(&self) -> HeaderSet {
        let mut headers = HeaderSet::new();
        headers.insert("User-Agent", &self.user_agent);
        headers.insert("Origin", &self.origin);
        headers.insert("Referer", &self.referer);
        headers
    }
}

/// A playlist URL plus the headers needed to play it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStream {
    pub playlist_url: String,
    pub headers: HeaderSet,
    pub discovery_method: DiscoveryMethod,
}

impl CapturedStream {
    /// Build a capture, rejecting URLs that cannot be a playlist
    pub fn new(
        playlist_url: impl Into<String>,
        headers: HeaderSet,
        discovery_method: DiscoveryMethod,
    ) -> Result<Self, ExtractError> {
        let playlist_url = playlist_url.into();
        if playlist_url.trim().is_empty() {
            return Err(ExtractError::EmptyInput("playlist URL"));
        }
        if !playlist_url.contains(PLAYLIST_MARKER) {
            return Err(ExtractError::malformed(
                playlist_url,
                "not a playlist URL",
            ));
        }
        Ok(Self {
            playlist_url,
            headers,
            discovery_method,
        })
    }
}

/// Outcome of one host existence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub succeeded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_requires_marker() {
        let err = CapturedStream::new(
            "https://cdn.example/live/index.mp4",
            HeaderSet::new(),
            DiscoveryMethod::DomFallback,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::MalformedUrl { .. }));

        let err = CapturedStream::new(" ", HeaderSet::new(), DiscoveryMethod::DomFallback)
            .unwrap_err();
        assert_eq!(err, ExtractError::EmptyInput("playlist URL"));
    }

    #[test]
    fn test_discovery_method_display() {
        assert_eq!(
            DiscoveryMethod::NetworkIntercepted.to_string(),
            "network-intercepted"
        );
        assert_eq!(DiscoveryMethod::StaticProbe.to_string(), "static-probe");
    }
}
