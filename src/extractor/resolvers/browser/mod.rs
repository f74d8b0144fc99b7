// Browser resolver - renders the embed page in a headless browser
//
// Flow:
// 1. Launch an isolated session with a fixed UA, viewport and fingerprint spoofing
// 2. Register the playlist listener, then navigate (navigation errors are non-fatal)
// 3. Wait on the capture slot; fall back to one DOM inspection if nothing arrived
// 4. Enrich headers with cookies/UA/referer/origin
// 5. Always shut the session down

pub mod capture;
#[cfg(feature = "browser")]
pub mod chromium;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use self::capture::{classify, CaptureSlot, InterceptedResponse};
use crate::extractor::config::ExtractorConfig;
use crate::extractor::diagnostics::DiagnosticLog;
use crate::extractor::errors::ExtractError;
use crate::extractor::headers::{url_origin, HeaderSet};
use crate::extractor::models::{CapturedStream, DiscoveryMethod, EmbedReference, PLAYLIST_MARKER};
use crate::extractor::traits::Resolver;
use crate::extractor::utils::cancellable;

/// User agent presented by the rendered session and forced onto captures
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--no-sandbox",
    "--disable-web-security",
    "--no-first-run",
    "--no-default-browser-check",
    "--mute-audio",
];

const NAVIGATION_HEADERS: &[(&str, &str)] = &[
    ("accept-language", "en-US,en;q=0.9"),
    ("sec-fetch-site", "same-origin"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-user", "?1"),
    ("sec-fetch-dest", "document"),
    (
        "sec-ch-ua",
        "\"Chromium\";v=\"124\", \"Not=A?Brand\";v=\"99\", \"Google Chrome\";v=\"124\"",
    ),
    ("sec-ch-ua-platform", "Linux"),
    ("sec-ch-ua-mobile", "?0"),
];

/// Installed before any page script runs
pub const SPOOF_SCRIPT: &str = r#"
(() => {
  const { width, height } = window.screen || { width: 1920, height: 1080 };
  Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
  Object.defineProperty(navigator, 'maxTouchPoints', { get: () => 1 });
  Object.defineProperty(navigator, 'platform', { get: () => 'Linux x86_64' });
  Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8 });
  Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
  Object.defineProperty(window, 'outerWidth', { get: () => width });
  Object.defineProperty(window, 'outerHeight', { get: () => height });
  if (!window.chrome) {
    window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
  }
})();
"#;

/// Evaluated once when no playlist request was observed
pub const DOM_PROBE_SCRIPT: &str = r#"
(() => {
  try {
    const video = document.querySelector('video');
    if (video) {
      if (video.currentSrc) return video.currentSrc;
      if (video.src) return video.src;
      const source = video.querySelector('source');
      if (source && source.src) return source.src;
    }
    const html = document.documentElement.innerHTML;
    const match = html.match(/https?:\/\/[^'"\s]+\.m3u8[^'"\s]*/i);
    if (match) return match[0];
  } catch (e) {}
  return '';
})()
"#;

/// Everything a backend needs to start a disguised session
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub window: (u32, u32),
    pub launch_args: Vec<String>,
    pub navigation_headers: HeaderSet,
    pub init_script: String,
    pub executable: Option<PathBuf>,
    pub proxy: Option<String>,
}

impl BrowserProfile {
    pub fn stealth(config: &ExtractorConfig) -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            viewport: (1280, 720),
            window: (1920, 1080),
            launch_args: LAUNCH_ARGS.iter().map(|s| s.to_string()).collect(),
            navigation_headers: NAVIGATION_HEADERS.iter().copied().collect(),
            init_script: SPOOF_SCRIPT.to_string(),
            executable: config.chrome_executable.clone(),
            proxy: config.proxy.clone(),
        }
    }
}

/// One live browser session
#[async_trait]
pub trait BrowserSession: Send {
    /// Start forwarding responses whose URL contains `marker`.
    /// Called before navigation.
    async fn intercept(
        &mut self,
        marker: &str,
    ) -> Result<mpsc::UnboundedReceiver<InterceptedResponse>, ExtractError>;

    /// Navigate the page, giving up after `timeout`
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), String>;

    /// Run the DOM probe; empty results map to None
    async fn probe_dom(&mut self) -> Result<Option<String>, String>;

    /// Cookies accumulated during the session, as (name, value)
    async fn cookies(&mut self) -> Result<Vec<(String, String)>, String>;

    /// Tear the session down. Must be safe to call after any failure.
    async fn shutdown(self: Box<Self>);
}

/// Factory for browser sessions
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self, profile: &BrowserProfile) -> Result<Box<dyn BrowserSession>, ExtractError>;
}

#[derive(Debug, Clone, Copy)]
pub struct BrowserTimings {
    pub navigation: Duration,
    pub capture_wait: Duration,
    pub settle: Duration,
}

impl BrowserTimings {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            navigation: config.navigation_timeout(),
            capture_wait: config.capture_wait(),
            settle: config.capture_settle(),
        }
    }
}

pub struct BrowserResolver {
    backend: Box<dyn BrowserBackend>,
    profile: BrowserProfile,
    timings: BrowserTimings,
}

impl BrowserResolver {
    pub fn new(backend: Box<dyn BrowserBackend>, profile: BrowserProfile, timings: BrowserTimings) -> Self {
        Self {
            backend,
            profile,
            timings,
        }
    }

    /// Resolver over the compiled-in Chromium backend
    #[cfg(feature = "browser")]
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(
            Box::new(chromium::ChromiumBackend::new()),
            BrowserProfile::stealth(config),
            BrowserTimings::from_config(config),
        )
    }

    async fn capture(
        &self,
        session: &mut dyn BrowserSession,
        embed: &EmbedReference,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<CapturedStream, ExtractError> {
        let mut responses = cancellable(cancel, session.intercept(PLAYLIST_MARKER)).await??;

        let slot = Arc::new(CaptureSlot::new());
        let listener = {
            let slot = slot.clone();
            let log = log.clone();
            tokio::spawn(async move {
                while let Some(response) = responses.recv().await {
                    let candidate = classify(response);
                    let reason = candidate.reason.describe();
                    let url = candidate.url.clone();
                    if slot.publish(candidate) {
                        log.log(format!("[browser] captured .m3u8 ({}): {}", reason, url));
                    } else {
                        log.log(format!("[browser] ignored .m3u8 ({}): {}", reason, url));
                    }
                }
            })
        };

        log.log(format!("[browser] navigating to {}", embed.url));
        let navigated = cancellable(cancel, session.navigate(&embed.url, self.timings.navigation)).await;
        let waited = match navigated {
            Ok(Ok(())) => {
                log.log("[browser] primary navigation finished");
                slot.wait(self.timings.capture_wait, self.timings.settle, cancel).await
            }
            Ok(Err(e)) => {
                log.log(format!("[browser] navigation warning: {}", e));
                slot.wait(self.timings.capture_wait, self.timings.settle, cancel).await
            }
            Err(cancelled) => Err(cancelled),
        };
        listener.abort();

        let (url, headers, method) = match waited? {
            Some(candidate) => (
                candidate.url,
                candidate.headers,
                DiscoveryMethod::NetworkIntercepted,
            ),
            None => {
                log.log("[browser] no .m3u8 request observed, scanning DOM for fallback");
                match cancellable(cancel, session.probe_dom()).await? {
                    Ok(Some(found)) if found.contains(PLAYLIST_MARKER) => {
                        log.log(format!("[browser] DOM fallback found {}", found));
                        (found, HeaderSet::new(), DiscoveryMethod::DomFallback)
                    }
                    Ok(_) => {
                        log.log("[browser] DOM fallback found nothing");
                        return Err(ExtractError::CaptureTimeout(self.timings.capture_wait));
                    }
                    Err(e) => {
                        log.log(format!("[browser] DOM evaluation failed: {}", e));
                        return Err(ExtractError::CaptureTimeout(self.timings.capture_wait));
                    }
                }
            }
        };

        let headers = self.enrich(headers, session, embed, log, cancel).await?;
        CapturedStream::new(url, headers, method)
    }

    /// Best-effort header enrichment; cookie failures are logged, not raised
    async fn enrich(
        &self,
        mut headers: HeaderSet,
        session: &mut dyn BrowserSession,
        embed: &EmbedReference,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<HeaderSet, ExtractError> {
        match cancellable(cancel, session.cookies()).await? {
            Ok(cookies) => {
                log.log(format!(
                    "[browser] collected {} cookies during session",
                    cookies.len()
                ));
                if !cookies.is_empty() {
                    let joined = cookies
                        .iter()
                        .map(|(name, value)| format!("{}={}", name, value))
                        .collect::<Vec<_>>()
                        .join("; ");
                    headers.insert_if_absent("cookie", joined);
                }
            }
            Err(e) => log.log(format!("[browser] could not read cookies: {}", e)),
        }

        headers.insert("user-agent", self.profile.user_agent.as_str());
        headers.insert_if_absent("referer", embed.url.as_str());
        if let Some(origin) = url_origin(&embed.url) {
            headers.insert_if_absent("origin", origin);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Resolver for BrowserResolver {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn resolve(
        &self,
        embed: &EmbedReference,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<CapturedStream, ExtractError> {
        log.log(format!(
            "[browser] launching {} session for {}",
            self.backend.name(),
            embed.url
        ));

        let mut session = match cancellable(cancel, self.backend.launch(&self.profile)).await? {
            Ok(session) => session,
            Err(e) => {
                log.log(format!("[browser] launch failed: {}", e));
                return Err(e);
            }
        };

        let outcome = self.capture(session.as_mut(), embed, log, cancel).await;
        session.shutdown().await;
        log.log("[browser] session closed");

        match &outcome {
            Ok(stream) => {
                tracing::info!(
                    "browser capture via {}: {}",
                    stream.discovery_method,
                    stream.playlist_url
                );
                log.log(format!(
                    "[browser] found .m3u8 via {}: {}",
                    stream.discovery_method, stream.playlist_url
                ));
            }
            Err(e) => tracing::warn!("browser capture failed: {}", e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::headers::derive_headers;
    use crate::extractor::testing::{FakeBrowser, ScriptedResponse};

    const LEAF: &str = "#EXTM3U\n#EXTINF:4.0,\nseg0.ts\n";

    fn timings() -> BrowserTimings {
        BrowserTimings {
            navigation: Duration::from_secs(5),
            capture_wait: Duration::from_millis(400),
            settle: Duration::from_millis(250),
        }
    }

    fn resolver(fake: &FakeBrowser) -> BrowserResolver {
        BrowserResolver::new(
            Box::new(fake.clone()),
            BrowserProfile::stealth(&ExtractorConfig::default()),
            timings(),
        )
    }

    fn embed() -> EmbedReference {
        derive_headers("https://player.example.org/embed/match-42").unwrap()
    }

    #[tokio::test]
    async fn test_segment_playlist_wins_when_second() {
        let fake = FakeBrowser::new()
            .respond(ScriptedResponse::new(10, "https://cdn.example/master.m3u8", "#EXTM3U\n"))
            .respond(ScriptedResponse::new(60, "https://cdn.example/leaf.m3u8", LEAF));
        let stream = resolver(&fake)
            .resolve(&embed(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.playlist_url, "https://cdn.example/leaf.m3u8");
        assert_eq!(stream.discovery_method, DiscoveryMethod::NetworkIntercepted);
        assert!(fake.was_shut_down());
    }

    #[tokio::test]
    async fn test_segment_playlist_wins_when_first() {
        let fake = FakeBrowser::new()
            .respond(ScriptedResponse::new(10, "https://cdn.example/leaf.m3u8", LEAF))
            .respond(ScriptedResponse::new(60, "https://cdn.example/master.m3u8", "#EXTM3U\n"));
        let stream = resolver(&fake)
            .resolve(&embed(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.playlist_url, "https://cdn.example/leaf.m3u8");
    }

    #[tokio::test]
    async fn test_nested_playlist_followed() {
        let fake = FakeBrowser::new().respond(ScriptedResponse::new(
            5,
            "https://cdn.example/hls/master.m3u8",
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nlow/index.m3u8\n",
        ));
        let stream = resolver(&fake)
            .resolve(&embed(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.playlist_url, "https://cdn.example/hls/low/index.m3u8");
    }

    #[tokio::test]
    async fn test_captured_headers_enriched() {
        let fake = FakeBrowser::new()
            .respond(
                ScriptedResponse::new(5, "https://cdn.example/leaf.m3u8", LEAF)
                    .header("Referer", "https://player.example.org/")
                    .header("Cookie", "existing=1")
                    .header("User-Agent", "HeadlessChrome/124"),
            )
            .cookies(&[("cf", "abc")]);
        let stream = resolver(&fake)
            .resolve(&embed(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        let h = &stream.headers;
        assert_eq!(h.get("cookie"), Some("existing=1"));
        assert_eq!(h.get("user-agent"), Some(BROWSER_USER_AGENT));
        assert_eq!(h.get("referer"), Some("https://player.example.org/"));
        assert_eq!(h.get("origin"), Some("https://player.example.org"));
    }

    #[tokio::test]
    async fn test_dom_fallback_evaluated_once() {
        let fake = FakeBrowser::new()
            .dom("https://cdn.example/dom/live.m3u8?sig=1")
            .cookies(&[("a", "1"), ("b", "2")]);
        let stream = resolver(&fake)
            .resolve(&embed(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.discovery_method, DiscoveryMethod::DomFallback);
        assert_eq!(stream.playlist_url, "https://cdn.example/dom/live.m3u8?sig=1");
        assert_eq!(fake.dom_probes(), 1);
        assert_eq!(stream.headers.get("cookie"), Some("a=1; b=2"));
        assert_eq!(
            stream.headers.get("referer"),
            Some("https://player.example.org/embed/match-42")
        );
        assert_eq!(stream.headers.get("origin"), Some("https://player.example.org"));
    }

    #[tokio::test]
    async fn test_dom_fallback_rejects_non_playlist() {
        let fake = FakeBrowser::new().dom("https://cdn.example/video.mp4");
        let err = resolver(&fake)
            .resolve(&embed(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::CaptureTimeout(_)));
        assert_eq!(fake.dom_probes(), 1);
        assert!(fake.was_shut_down());
    }

    #[tokio::test]
    async fn test_navigation_error_is_not_fatal() {
        let fake = FakeBrowser::new()
            .fail_navigation("net::ERR_ABORTED")
            .respond(ScriptedResponse::new(5, "https://cdn.example/leaf.m3u8", LEAF));
        let log = DiagnosticLog::default();
        let stream = resolver(&fake)
            .resolve(&embed(), &log, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.playlist_url, "https://cdn.example/leaf.m3u8");
        assert!(log
            .snapshot()
            .iter()
            .any(|l| l.contains("navigation warning")));
    }

    #[tokio::test]
    async fn test_cancel_tears_down_session() {
        let fake = FakeBrowser::new();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = BrowserResolver::new(
            Box::new(fake.clone()),
            BrowserProfile::stealth(&ExtractorConfig::default()),
            BrowserTimings {
                capture_wait: Duration::from_secs(30),
                ..timings()
            },
        )
        .resolve(&embed(), &DiagnosticLog::default(), &token)
        .await
        .unwrap_err();
        assert_eq!(err, ExtractError::Cancelled);
        assert!(fake.was_shut_down());
        assert_eq!(fake.dom_probes(), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces() {
        let fake = FakeBrowser::new().fail_launch("no chromium");
        let err = resolver(&fake)
            .resolve(&embed(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::BrowserLaunchFailure("no chromium".into()));
    }
}
