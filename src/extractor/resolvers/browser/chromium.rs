// Chromium backend over CDP (chromiumoxide)
//
// One browser process per session, throwaway profile directory, a single
// page prepared before navigation: UA override, extra headers and the
// fingerprint script registered for every new document.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams, Headers,
    RequestId, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::capture::InterceptedResponse;
use super::{BrowserBackend, BrowserProfile, BrowserSession};
use crate::extractor::errors::ExtractError;
use crate::extractor::headers::HeaderSet;
use crate::extractor::tools::{ensure_runtime_available, ToolType};

const BODY_ATTEMPTS: usize = 5;
const BODY_RETRY_DELAY: Duration = Duration::from_millis(200);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

fn launch_failure(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::BrowserLaunchFailure(e.to_string())
}

fn header_set(raw: &serde_json::Value) -> HeaderSet {
    raw.as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(name, value)| value.as_str().map(|v| (name.as_str(), v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Read a response body, retrying while Chromium has not finished buffering it
async fn read_body(page: &Page, request_id: RequestId) -> Option<String> {
    for attempt in 1..=BODY_ATTEMPTS {
        match page
            .execute(GetResponseBodyParams::new(request_id.clone()))
            .await
        {
            Ok(response) => {
                let body = &response.result;
                if !body.base64_encoded {
                    return Some(body.body.clone());
                }
                return STANDARD
                    .decode(&body.body)
                    .ok()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            }
            Err(e) => {
                tracing::trace!("response body attempt {} failed: {}", attempt, e);
                tokio::time::sleep(BODY_RETRY_DELAY).await;
            }
        }
    }
    None
}

#[derive(Default)]
pub struct ChromiumBackend;

impl ChromiumBackend {
    pub fn new() -> Self {
        Self
    }

    async fn prepare_page(browser: &Browser, profile: &BrowserProfile) -> Result<Page, ExtractError> {
        let page = browser.new_page("about:blank").await.map_err(launch_failure)?;

        page.execute(EnableParams::default())
            .await
            .map_err(launch_failure)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            profile.init_script.clone(),
        ))
        .await
        .map_err(launch_failure)?;
        page.execute(SetUserAgentOverrideParams::new(profile.user_agent.clone()))
            .await
            .map_err(launch_failure)?;

        let extra: serde_json::Map<String, serde_json::Value> = profile
            .navigation_headers
            .iter()
            .map(|(name, value)| (name.to_string(), serde_json::Value::from(value)))
            .collect();
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::Value::Object(extra),
        )))
        .await
        .map_err(launch_failure)?;

        Ok(page)
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn launch(&self, profile: &BrowserProfile) -> Result<Box<dyn BrowserSession>, ExtractError> {
        let executable = match &profile.executable {
            Some(path) => path.clone(),
            None => ensure_runtime_available(ToolType::Chromium).await?,
        };
        let profile_dir = tempfile::Builder::new()
            .prefix("stream-extractor-")
            .tempdir()
            .map_err(launch_failure)?;

        let (vw, vh) = profile.viewport;
        let (ww, wh) = profile.window;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&executable)
            .user_data_dir(profile_dir.path())
            .window_size(ww, wh)
            .viewport(Viewport {
                width: vw,
                height: vh,
                ..Default::default()
            });
        for arg in &profile.launch_args {
            builder = builder.arg(arg.as_str());
        }
        if let Some(proxy) = &profile.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        let config = builder.build().map_err(ExtractError::BrowserLaunchFailure)?;

        tracing::debug!("launching {}", executable.display());
        let (mut browser, mut handler) = Browser::launch(config).await.map_err(launch_failure)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match Self::prepare_page(&browser, profile).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.kill().await;
                handler.abort();
                return Err(e);
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler,
            listeners: Vec::new(),
            _profile_dir: profile_dir,
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    _profile_dir: TempDir,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn intercept(
        &mut self,
        marker: &str,
    ) -> Result<mpsc::UnboundedReceiver<InterceptedResponse>, ExtractError> {
        let mut requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(launch_failure)?;
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(launch_failure)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let page = self.page.clone();
        let marker = marker.to_string();

        let listener = tokio::spawn(async move {
            let mut sent_headers: HashMap<String, HeaderSet> = HashMap::new();
            loop {
                tokio::select! {
                    biased;
                    Some(event) = requests.next() => {
                        if event.request.url.contains(&marker) {
                            sent_headers.insert(
                                event.request_id.inner().clone(),
                                header_set(event.request.headers.inner()),
                            );
                        }
                    }
                    Some(event) = responses.next() => {
                        if !event.response.url.contains(&marker) {
                            continue;
                        }
                        let request_headers = sent_headers
                            .remove(event.request_id.inner())
                            .or_else(|| event.response.request_headers.as_ref().map(|h| header_set(h.inner())))
                            .unwrap_or_default();
                        let url = event.response.url.clone();
                        let request_id = event.request_id.clone();
                        let page = page.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let body = read_body(&page, request_id).await;
                            let _ = tx.send(InterceptedResponse { url, request_headers, body });
                        });
                    }
                    else => break,
                }
            }
        });
        self.listeners.push(listener);
        Ok(rx)
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), String> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("navigation timed out after {}s", timeout.as_secs())),
        }
    }

    async fn probe_dom(&mut self) -> Result<Option<String>, String> {
        let found: String = self
            .page
            .evaluate(super::DOM_PROBE_SCRIPT)
            .await
            .map_err(|e| e.to_string())?
            .into_value()
            .map_err(|e| e.to_string())?;
        let found = found.trim().to_string();
        Ok((!found.is_empty()).then_some(found))
    }

    async fn cookies(&mut self) -> Result<Vec<(String, String)>, String> {
        let cookies = self.page.get_cookies().await.map_err(|e| e.to_string())?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn shutdown(mut self: Box<Self>) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        let _ = self.page.clone().close().await;

        let closed = match self.browser.close().await {
            Ok(_) => tokio::time::timeout(CLOSE_TIMEOUT, self.browser.wait())
                .await
                .is_ok(),
            Err(e) => {
                tracing::debug!("browser close failed: {}", e);
                false
            }
        };
        if !closed {
            let _ = self.browser.kill().await;
        }
        self.handler.abort();
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
        self.handler.abort();
    }
}
