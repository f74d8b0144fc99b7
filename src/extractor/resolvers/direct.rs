// Direct resolver - single GET of the embed page, regex scan for a playlist link

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::extractor::diagnostics::DiagnosticLog;
use crate::extractor::errors::ExtractError;
use crate::extractor::http::HttpTransport;
use crate::extractor::models::{CapturedStream, DiscoveryMethod, EmbedReference};
use crate::extractor::traits::Resolver;
use crate::extractor::utils::cancellable;

pub const DIRECT_FETCH_TIMEOUT: Duration = Duration::from_secs(12);

lazy_static! {
    static ref PLAYLIST_LINK: Regex =
        Regex::new(r#"https?:\\?/\\?/[^\s'"<>]+\.m3u8[^\s'"<>]*"#).unwrap();
}

/// First playlist-shaped URL in a page
pub fn find_playlist_link(html: &str) -> Option<String> {
    PLAYLIST_LINK
        .find(html)
        .map(|m| m.as_str().replace("\\/", "/"))
}

pub struct DirectResolver {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl DirectResolver {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            timeout: DIRECT_FETCH_TIMEOUT,
        }
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn resolve(
        &self,
        embed: &EmbedReference,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<CapturedStream, ExtractError> {
        let headers = embed.headers();
        log.log(format!("[direct] fetching {}", embed.url));

        let html = cancellable(
            cancel,
            self.transport.get_text(&embed.url, &headers, self.timeout),
        )
        .await?
        .inspect_err(|e| log.log(format!("[direct] fetch failed: {}", e)))?;

        match find_playlist_link(&html) {
            Some(url) => {
                log.log(format!("[direct] found .m3u8 in page: {}", url));
                CapturedStream::new(url, headers, DiscoveryMethod::PageScan)
            }
            None => {
                log.log("[direct] no .m3u8 found in embed page");
                Err(ExtractError::fetch(
                    embed.url.as_str(),
                    "no .m3u8 found in embed page",
                ))
            }
        }
    }
}
