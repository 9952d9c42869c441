//! Request/response transport over HTTP POST.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::{BasicAuth, TransportConfig};
use crate::error::{SdkError, SdkResult};
use crate::observability::metrics;
use crate::resilience::with_timeout;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::transport::middleware::MiddlewareRegistry;
use crate::transport::Transport;

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    basic_auth: Option<BasicAuth>,
    middleware: MiddlewareRegistry,
}

impl HttpTransport {
    /// Create a transport for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, &TransportConfig::default(), None)
    }

    /// Create a transport with explicit timeout and optional basic auth.
    pub fn with_config(
        url: impl Into<String>,
        config: &TransportConfig,
        basic_auth: Option<BasicAuth>,
    ) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: config.request_timeout(),
            basic_auth,
            middleware: MiddlewareRegistry::new(),
        }
    }

    /// Send to `url/endpoint_suffix` instead of the base URL.
    pub async fn send_to(&self, endpoint_suffix: &str, payload: RpcRequest) -> SdkResult<RpcResponse> {
        let payload = self.middleware.apply_request(payload);
        let method = payload.method.clone();
        let url = compose_url(&self.url, endpoint_suffix);

        tracing::debug!(method = %method, id = payload.id, url = %url, "Sending HTTP request");

        let mut request = self.client.post(&url).json(&payload);
        if let Some(auth) = &self.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let result = with_timeout(self.timeout, async {
            let response = request.send().await?;
            let body = response.text().await?;
            let raw: Value = serde_json::from_str(&body)?;
            Ok::<Value, SdkError>(raw)
        })
        .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                let outcome = if matches!(e, SdkError::Timeout(_)) { "timeout" } else { "transport_error" };
                tracing::warn!(method = %method, error = %e, "HTTP request failed");
                metrics::record_rpc_request(&method, outcome);
                return Err(e);
            }
        };

        let response = RpcResponse::from_raw(self.middleware.apply_response(&method, raw));
        metrics::record_rpc_request(&method, if response.is_error() { "rpc_error" } else { "ok" });
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn middleware(&self) -> &MiddlewareRegistry {
        &self.middleware
    }

    async fn send(&self, payload: RpcRequest) -> SdkResult<RpcResponse> {
        self.send_to("", payload).await
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("basic_auth", &self.basic_auth.is_some())
            .finish()
    }
}

fn compose_url(base: &str, suffix: &str) -> String {
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), suffix)
    }
}
