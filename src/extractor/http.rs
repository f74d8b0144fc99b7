// HTTP transport used by the static and direct resolvers

use async_trait::async_trait;
use std::time::Duration;

use super::errors::ExtractError;
use super::headers::HeaderSet;

/// Minimal HTTP surface the resolvers need
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url` and return the body; non-2xx responses are failures
    async fn get_text(
        &self,
        url: &str,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> Result<String, ExtractError>;

    /// HEAD `url` and return the status code
    async fn head_status(
        &self,
        url: &str,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> Result<u16, ExtractError>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(proxy: Option<&str>) -> Result<Self, ExtractError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ExtractError::malformed(proxy_url, e))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ExtractError::fetch("<client>", e))?;
        Ok(Self { client })
    }

    fn request_headers(headers: &HeaderSet) -> HeaderSet {
        let mut merged = headers.clone();
        merged.insert_if_absent("Accept", "*/*");
        merged.insert_if_absent("Accept-Language", "en-US,en;q=0.5");
        merged
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_text(
        &self,
        url: &str,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> Result<String, ExtractError> {
        let response = self
            .client
            .get(url)
            .headers(Self::request_headers(headers).to_header_map())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ExtractError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::fetch(url, format!("HTTP {}", status)));
        }

        response.text().await.map_err(|e| ExtractError::fetch(url, e))
    }

    async fn head_status(
        &self,
        url: &str,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> Result<u16, ExtractError> {
        let response = self
            .client
            .head(url)
            .headers(Self::request_headers(headers).to_header_map())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ExtractError::fetch(url, e))?;
        Ok(response.status().as_u16())
    }
}
