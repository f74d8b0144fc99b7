// Static resolver - rebuilds the playlist URL without rendering the page
//
// Flow:
// 1. GET the embed page, pull the k/i/s variables out of the inline script
// 2. GET the companion script and try to recover the secret token
// 3. HEAD-probe the host pool in fixed order with the token, then with the
//    fallback token; the first 200 wins

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::token::extract_token;
use crate::extractor::config::ExtractorConfig;
use crate::extractor::diagnostics::DiagnosticLog;
use crate::extractor::errors::ExtractError;
use crate::extractor::headers::HeaderSet;
use crate::extractor::http::HttpTransport;
use crate::extractor::models::{CapturedStream, DiscoveryMethod, EmbedReference, ProbeResult};
use crate::extractor::traits::Resolver;
use crate::extractor::utils::cancellable;

const VAR_NAMES: [&str; 3] = ["k", "i", "s"];

lazy_static! {
    static ref VAR_PATTERNS: Vec<(&'static str, Regex)> = VAR_NAMES
        .iter()
        .map(|name| {
            let pattern = format!(r#"var\s+{}\s*=\s*["']([^"']*)["']"#, name);
            (*name, Regex::new(&pattern).unwrap())
        })
        .collect();
}

/// The three obfuscated page variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageVars {
    pub k: String,
    pub i: String,
    pub s: String,
}

/// Pull k/i/s out of the embed HTML. Empty values count as missing.
pub fn extract_vars(html: &str) -> Result<PageVars, ExtractError> {
    let mut found: Vec<Option<String>> = Vec::with_capacity(VAR_NAMES.len());
    let mut missing = Vec::new();

    for (name, re) in VAR_PATTERNS.iter() {
        let value = re
            .captures(html)
            .map(|caps| caps[1].trim().to_string())
            .filter(|v| !v.is_empty());
        if value.is_none() {
            missing.push(*name);
        }
        found.push(value);
    }

    if !missing.is_empty() {
        return Err(ExtractError::MissingVars(missing));
    }

    let mut values = found.into_iter().flatten();
    match (values.next(), values.next(), values.next()) {
        (Some(k), Some(i), Some(s)) => Ok(PageVars { k, i, s }),
        _ => Err(ExtractError::MissingVars(VAR_NAMES.to_vec())),
    }
}

/// Playlist URL for one host/token combination. Every part is pushed as a
/// single path segment, so `/`, `?` or `#` inside a value are percent-encoded.
pub fn probe_url(host: &str, token: &str, vars: &PageVars) -> Result<String, ExtractError> {
    let base = format!("https://{}/", host);
    let mut url = Url::parse(&base).map_err(|e| ExtractError::malformed(&base, e))?;
    url.path_segments_mut()
        .map_err(|_| ExtractError::malformed(&base, "host cannot carry a path"))?
        .clear()
        .extend([
            "secure",
            token,
            vars.k.as_str(),
            "stream",
            vars.i.as_str(),
            vars.s.as_str(),
            "playlist.m3u8",
        ]);
    Ok(url.into())
}

#[derive(Debug, Clone)]
pub struct StaticSettings {
    pub hosts: Vec<String>,
    pub fallback_token: String,
    pub companion_path: String,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
}

impl StaticSettings {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            hosts: config.host_pool.clone(),
            fallback_token: config.fallback_token.clone(),
            companion_path: config.companion_script_path.clone(),
            fetch_timeout: config.fetch_timeout(),
            probe_timeout: config.probe_timeout(),
        }
    }
}

pub struct StaticResolver {
    transport: Arc<dyn HttpTransport>,
    settings: StaticSettings,
}

impl StaticResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: StaticSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    async fn fetch_token(
        &self,
        embed: &EmbedReference,
        headers: &HeaderSet,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ExtractError> {
        let script_url = match Url::parse(&embed.url).and_then(|u| u.join(&self.settings.companion_path)) {
            Ok(u) => u.to_string(),
            Err(e) => {
                log.log(format!("[static] cannot build companion script URL: {}", e));
                return Ok(None);
            }
        };

        log.log(format!("[static] fetching companion script {}", script_url));
        let fetched = cancellable(
            cancel,
            self.transport
                .get_text(&script_url, headers, self.settings.fetch_timeout),
        )
        .await?;

        let script = match fetched {
            Ok(script) => script,
            Err(e) => {
                log.log(format!("[static] companion script unavailable: {}", e));
                return Ok(None);
            }
        };

        match extract_token(&script) {
            Some((token, source)) => {
                log.log(format!("[static] token recovered via {}", source.describe()));
                Ok(Some(token))
            }
            None => {
                log.log("[static] no token found in companion script");
                Ok(None)
            }
        }
    }

    /// Probe every host in order, stopping at the first 200
    async fn probe_hosts(
        &self,
        token: &str,
        vars: &PageVars,
        headers: &HeaderSet,
        attempts: &mut usize,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<Option<ProbeResult>, ExtractError> {
        for host in &self.settings.hosts {
            *attempts += 1;
            let url = match probe_url(host, token, vars) {
                Ok(url) => url,
                Err(e) => {
                    log.log(format!("[static] skipping host {}: {}", host, e));
                    continue;
                }
            };

            let status = cancellable(
                cancel,
                self.transport
                    .head_status(&url, headers, self.settings.probe_timeout),
            )
            .await?;

            let result = ProbeResult {
                succeeded: matches!(status, Ok(200)),
                url,
            };
            match status {
                Ok(code) => log.log(format!("[static] probe {} -> {}", result.url, code)),
                Err(e) => log.log(format!("[static] probe {} failed: {}", result.url, e)),
            }
            if result.succeeded {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    fn name(&self) -> &'static str {
        "static-probe"
    }

    async fn resolve(
        &self,
        embed: &EmbedReference,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<CapturedStream, ExtractError> {
        let headers = embed.headers();

        log.log(format!("[static] fetching embed page {}", embed.url));
        let html = match cancellable(
            cancel,
            self.transport
                .get_text(&embed.url, &headers, self.settings.fetch_timeout),
        )
        .await?
        {
            Ok(html) => {
                log.log(format!("[static] embed page loaded ({} bytes)", html.len()));
                html
            }
            Err(e) => {
                log.log(format!("[static] embed page fetch failed: {}", e));
                return Err(e);
            }
        };

        let vars = match extract_vars(&html) {
            Ok(vars) => {
                log.log(format!(
                    "[static] variables k={} i={} s={}",
                    vars.k, vars.i, vars.s
                ));
                vars
            }
            Err(e) => {
                log.log(format!("[static] {}", e));
                return Err(e);
            }
        };

        let mut attempts = 0;
        if let Some(token) = self.fetch_token(embed, &headers, log, cancel).await? {
            if let Some(hit) = self
                .probe_hosts(&token, &vars, &headers, &mut attempts, log, cancel)
                .await?
            {
                return CapturedStream::new(hit.url, headers, DiscoveryMethod::StaticProbe);
            }
            log.log("[static] no host accepted the recovered token");
        }

        log.log(format!(
            "[static] retrying host pool with fallback token {}",
            self.settings.fallback_token
        ));
        if let Some(hit) = self
            .probe_hosts(
                &self.settings.fallback_token,
                &vars,
                &headers,
                &mut attempts,
                log,
                cancel,
            )
            .await?
        {
            return CapturedStream::new(hit.url, headers, DiscoveryMethod::StaticProbe);
        }

        log.log(format!("[static] all {} probes failed", attempts));
        Err(ExtractError::NoWorkingHost { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::headers::{derive_headers, normalize};
    use crate::extractor::testing::FakeTransport;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    const EMBED: &str = "https://embedsports.top/embed/alpha/match-7/1";
    const SCRIPT: &str = "https://embedsports.top/js/embed.min.js";
    const HTML: &str = r#"<html><script>var k = "abc"; var i='def'; var s="ghi";</script></html>"#;
    const TOKEN: &str = "Zq81-secret-token-xyz";

    fn settings() -> StaticSettings {
        StaticSettings {
            hosts: ["h1.example", "h2.example", "h3.example", "h4.example"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            fallback_token: "public".to_string(),
            companion_path: "/js/embed.min.js".to_string(),
            fetch_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
        }
    }

    fn script_with_token() -> String {
        let reversed: String = TOKEN.chars().rev().collect();
        format!(r#"!function(){{var t=atob("{}");}}();"#, STANDARD.encode(reversed))
    }

    fn resolver(fake: &Arc<FakeTransport>) -> StaticResolver {
        StaticResolver::new(fake.clone(), settings())
    }

    #[test]
    fn test_extract_vars_reports_all_missing() {
        let err = extract_vars(r#"var k = "abc"; var s = "";"#).unwrap_err();
        assert_eq!(err, ExtractError::MissingVars(vec!["i", "s"]));
    }

    #[tokio::test]
    async fn test_first_working_host_in_order() {
        let wanted = format!("https://h3.example/secure/{}/abc/stream/def/ghi/playlist.m3u8", TOKEN);
        let fake = Arc::new(
            FakeTransport::new()
                .page(EMBED, HTML)
                .page(SCRIPT, &script_with_token())
                .status(&format!("https://h1.example/secure/{}/abc/stream/def/ghi/playlist.m3u8", TOKEN), 403)
                .unreachable(&format!("https://h2.example/secure/{}/abc/stream/def/ghi/playlist.m3u8", TOKEN))
                .status(&wanted, 200)
                .status(&format!("https://h4.example/secure/{}/abc/stream/def/ghi/playlist.m3u8", TOKEN), 200),
        );
        let embed = derive_headers(EMBED).unwrap();
        let stream = resolver(&fake)
            .resolve(&embed, &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stream.playlist_url, wanted);
        assert_eq!(stream.discovery_method, DiscoveryMethod::StaticProbe);
        let probed: Vec<String> = fake.heads();
        assert_eq!(probed.len(), 3);
        assert!(probed[0].starts_with("https://h1.example/"));
        assert!(probed[1].starts_with("https://h2.example/"));
        assert_eq!(probed[2], wanted);
        assert_eq!(stream.headers.get("origin"), Some("https://embedsports.top"));
        assert_eq!(stream.headers.get("referer"), Some("https://embedsports.top/"));
    }

    #[tokio::test]
    async fn test_fallback_token_when_script_missing() {
        let wanted = "https://h2.example/secure/public/abc/stream/def/ghi/playlist.m3u8";
        let fake = Arc::new(FakeTransport::new().page(EMBED, HTML).status(wanted, 200));
        let log = DiagnosticLog::default();
        let stream = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &log, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.playlist_url, wanted);
        assert_eq!(fake.heads().len(), 2);
        assert!(log
            .snapshot()
            .iter()
            .any(|l| l.contains("companion script unavailable")));
    }

    #[tokio::test]
    async fn test_fallback_after_token_probes_fail() {
        let wanted = "https://h1.example/secure/public/abc/stream/def/ghi/playlist.m3u8";
        let fake = Arc::new(
            FakeTransport::new()
                .page(EMBED, HTML)
                .page(SCRIPT, &script_with_token())
                .status(wanted, 200),
        );
        let stream = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.playlist_url, wanted);
        // whole pool with the token, then the first fallback host
        assert_eq!(fake.heads().len(), 5);
    }

    #[tokio::test]
    async fn test_no_working_host() {
        let fake = Arc::new(FakeTransport::new().page(EMBED, HTML));
        let err = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::NoWorkingHost { attempts: 4 });
        assert_eq!(fake.heads().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_vars_stops_before_probing() {
        let fake = Arc::new(FakeTransport::new().page(EMBED, r#"var k="abc";"#));
        let err = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::MissingVars(vec!["i", "s"]));
        assert!(fake.heads().is_empty());
    }

    #[tokio::test]
    async fn test_embed_fetch_failure() {
        let fake = Arc::new(FakeTransport::new());
        let err = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FetchFailure { .. }));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let wanted = format!("https://h2.example/secure/{}/abc/stream/def/ghi/playlist.m3u8", TOKEN);
        let fake = Arc::new(
            FakeTransport::new()
                .page(EMBED, HTML)
                .page(SCRIPT, &script_with_token())
                .status(&wanted, 200),
        );
        let embed = derive_headers(EMBED).unwrap();
        let r = resolver(&fake);
        let first = r
            .resolve(&embed, &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        let second = r
            .resolve(&embed, &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.playlist_url, second.playlist_url);
        assert_eq!(normalize(&first.headers), normalize(&second.headers));
    }

    #[test]
    fn test_probe_url_encodes_segments() {
        let vars = PageVars {
            k: "a b".to_string(),
            i: "def".to_string(),
            s: "ghi".to_string(),
        };
        let url = probe_url("h1.example", "c?b/a#", &vars).unwrap();
        assert_eq!(
            url,
            "https://h1.example/secure/c%3Fb%2Fa%23/a%20b/stream/def/ghi/playlist.m3u8"
        );
        let parsed = Url::parse(&url).unwrap();
        assert!(parsed.path().ends_with("/playlist.m3u8"));
        assert_eq!(parsed.query(), None);
        assert_eq!(parsed.fragment(), None);
        assert_eq!(parsed.path_segments().unwrap().count(), 7);
    }

    #[tokio::test]
    async fn test_token_with_url_metacharacters_stays_in_path() {
        let script = r#"var p = "c?b/a".split("").reverse().join("");"#;
        let fake = Arc::new(FakeTransport::new().page(EMBED, HTML).page(SCRIPT, script));
        let err = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &DiagnosticLog::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::NoWorkingHost { attempts: 8 });

        let probed = fake.heads();
        assert_eq!(
            probed[0],
            "https://h1.example/secure/a%2Fb%3Fc/abc/stream/def/ghi/playlist.m3u8"
        );
        for url in &probed {
            let parsed = Url::parse(url).unwrap();
            assert_eq!(parsed.query(), None);
            assert!(parsed.path().ends_with("/abc/stream/def/ghi/playlist.m3u8"));
        }
    }

    #[tokio::test]
    async fn test_cancel_between_probes_stops_loop() {
        let token = CancellationToken::new();
        let fake = Arc::new(
            FakeTransport::new()
                .page(EMBED, HTML)
                .page(SCRIPT, &script_with_token())
                .cancel_on_head(2, token.clone()),
        );
        let err = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &DiagnosticLog::default(), &token)
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::Cancelled);
        assert_eq!(fake.heads().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let fake = Arc::new(FakeTransport::new().page(EMBED, HTML));
        let token = CancellationToken::new();
        token.cancel();
        let err = resolver(&fake)
            .resolve(&derive_headers(EMBED).unwrap(), &DiagnosticLog::default(), &token)
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::Cancelled);
        assert!(fake.gets().is_empty());
    }
}
