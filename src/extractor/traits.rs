// Resolver trait and strategy selection

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use super::diagnostics::DiagnosticLog;
use super::errors::ExtractError;
use super::models::{CapturedStream, EmbedReference};

/// Resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// Render the embed page in headless Chromium and watch its traffic
    #[default]
    Browser,
    /// Rebuild the playlist URL from page variables and probe a host pool
    Static,
    /// Scan the raw embed HTML for a playlist link
    Direct,
}

impl fmt::Display for ResolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
            Self::Static => write!(f, "static"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for ResolverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "browser" => Ok(Self::Browser),
            "static" => Ok(Self::Static),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown resolver mode: {}", other)),
        }
    }
}

/// Trait for playlist resolvers
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Name of the resolver (for logging and stage attribution)
    fn name(&self) -> &'static str;

    /// Resolve the embed page to a playlist URL plus raw headers.
    ///
    /// Implementations must observe `cancel` at every wait point and return
    /// `ExtractError::Cancelled` once it fires.
    async fn resolve(
        &self,
        embed: &EmbedReference,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<CapturedStream, ExtractError>;
}
