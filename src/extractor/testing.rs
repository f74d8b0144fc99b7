// In-memory fakes for the HTTP and browser seams

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::errors::ExtractError;
use super::headers::HeaderSet;
use super::http::HttpTransport;
use super::resolvers::browser::capture::InterceptedResponse;
use super::resolvers::browser::{BrowserBackend, BrowserProfile, BrowserSession};

/// Deterministic transport: pages for GET, status codes for HEAD
#[derive(Default)]
pub struct FakeTransport {
    pages: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    unreachable: HashSet<String>,
    cancel_on_head: Option<(usize, CancellationToken)>,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    /// Fire `token` while the nth HEAD is in flight; that request never answers
    pub fn cancel_on_head(mut self, nth: usize, token: CancellationToken) -> Self {
        self.cancel_on_head = Some((nth, token));
        self
    }

    fn record(&self, method: &'static str, url: &str) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push((method, url.to_string()));
        calls.iter().filter(|(m, _)| *m == method).count()
    }

    fn calls_for(&self, method: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn gets(&self) -> Vec<String> {
        self.calls_for("GET")
    }

    pub fn heads(&self) -> Vec<String> {
        self.calls_for("HEAD")
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get_text(
        &self,
        url: &str,
        _headers: &HeaderSet,
        _timeout: Duration,
    ) -> Result<String, ExtractError> {
        self.record("GET", url);
        if self.unreachable.contains(url) {
            return Err(ExtractError::fetch(url, "connection refused"));
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ExtractError::fetch(url, "HTTP 404 Not Found"))
    }

    async fn head_status(
        &self,
        url: &str,
        _headers: &HeaderSet,
        _timeout: Duration,
    ) -> Result<u16, ExtractError> {
        let nth = self.record("HEAD", url);
        if let Some((at, token)) = &self.cancel_on_head {
            if *at == nth {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }
        if self.unreachable.contains(url) {
            return Err(ExtractError::fetch(url, "connection refused"));
        }
        Ok(self.statuses.get(url).copied().unwrap_or(404))
    }
}

/// One playlist response delivered `delay_ms` after navigation starts
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    delay_ms: u64,
    response: InterceptedResponse,
}

impl ScriptedResponse {
    pub fn new(delay_ms: u64, url: &str, body: &str) -> Self {
        Self {
            delay_ms,
            response: InterceptedResponse {
                url: url.to_string(),
                request_headers: HeaderSet::new(),
                body: Some(body.to_string()),
            },
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.response.request_headers.insert(name, value);
        self
    }
}

#[derive(Default)]
struct Script {
    responses: Vec<ScriptedResponse>,
    dom: Option<String>,
    cookies: Vec<(String, String)>,
    navigation_error: Option<String>,
    launch_error: Option<String>,
}

#[derive(Default)]
struct Observed {
    dom_probes: AtomicUsize,
    shut_down: AtomicBool,
}

/// Scripted browser backend; clones share the script and observations
#[derive(Clone, Default)]
pub struct FakeBrowser {
    script: Arc<Mutex<Script>>,
    observed: Arc<Observed>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut self.script.lock().unwrap());
        self
    }

    pub fn respond(self, response: ScriptedResponse) -> Self {
        self.edit(|s| s.responses.push(response))
    }

    pub fn dom(self, found: &str) -> Self {
        let found = found.to_string();
        self.edit(|s| s.dom = Some(found))
    }

    pub fn cookies(self, cookies: &[(&str, &str)]) -> Self {
        let cookies = cookies
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.edit(|s| s.cookies = cookies)
    }

    pub fn fail_navigation(self, reason: &str) -> Self {
        let reason = reason.to_string();
        self.edit(|s| s.navigation_error = Some(reason))
    }

    pub fn fail_launch(self, reason: &str) -> Self {
        let reason = reason.to_string();
        self.edit(|s| s.launch_error = Some(reason))
    }

    pub fn dom_probes(&self) -> usize {
        self.observed.dom_probes.load(Ordering::SeqCst)
    }

    pub fn was_shut_down(&self) -> bool {
        self.observed.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserBackend for FakeBrowser {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn launch(&self, _profile: &BrowserProfile) -> Result<Box<dyn BrowserSession>, ExtractError> {
        if let Some(reason) = self.script.lock().unwrap().launch_error.clone() {
            return Err(ExtractError::BrowserLaunchFailure(reason));
        }
        Ok(Box::new(FakeSession {
            browser: self.clone(),
            sender: None,
        }))
    }
}

struct FakeSession {
    browser: FakeBrowser,
    sender: Option<mpsc::UnboundedSender<InterceptedResponse>>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn intercept(
        &mut self,
        _marker: &str,
    ) -> Result<mpsc::UnboundedReceiver<InterceptedResponse>, ExtractError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sender = Some(tx);
        Ok(rx)
    }

    async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), String> {
        let (responses, error) = {
            let script = self.browser.script.lock().unwrap();
            (script.responses.clone(), script.navigation_error.clone())
        };
        if let Some(sender) = &self.sender {
            for scripted in responses {
                let sender = sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(scripted.delay_ms)).await;
                    let _ = sender.send(scripted.response);
                });
            }
        }
        match error {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    async fn probe_dom(&mut self) -> Result<Option<String>, String> {
        self.browser.observed.dom_probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.browser.script.lock().unwrap().dom.clone())
    }

    async fn cookies(&mut self) -> Result<Vec<(String, String)>, String> {
        Ok(self.browser.script.lock().unwrap().cookies.clone())
    }

    async fn shutdown(self: Box<Self>) {
        self.browser.observed.shut_down.store(true, Ordering::SeqCst);
    }
}
