use anyhow::{Context, Result};

/// Header carrying the scan's correlation id
pub const MALICE_ID_HEADER: &str = "X-Malice-ID";

/// Posts scan results back to a Malice webhook endpoint
pub struct WebhookClient {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookClient {
    pub fn new(endpoint: String, proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy {}", proxy))?,
            );
        }
        Ok(Self {
            client: builder.build().context("failed to build webhook client")?,
            endpoint,
        })
    }

    /// Send one JSON payload and hand back the endpoint's response body
    pub async fn send(&self, scan_id: &str, payload: String) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(MALICE_ID_HEADER, scan_id)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .with_context(|| format!("failed to POST results to {}", self.endpoint))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::warn!("webhook {} answered {}", self.endpoint, status);
        }
        Ok(body)
    }
}
