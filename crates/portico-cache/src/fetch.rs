//! Network side of the proxy.
//!
//! Any HTTP status is a response; only transport failures are errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::types::{ProxyRequest, ProxyResponse};

const USER_AGENT_VALUE: &str = concat!("portico/", env!("CARGO_PKG_VERSION"));

/// Performs the network request behind a proxy decision.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<ProxyResponse>;
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> ProxyResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| ProxyError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<ProxyResponse> {
        let method =
            reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| ProxyError::Network {
                message: format!("invalid method {}: {}", request.method, e),
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ProxyError::Config {
                    message: format!("invalid header name {:?}: {}", name, e),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ProxyError::Config {
                message: format!("invalid header value for {}: {}", name, e),
            })?;
            builder = builder.header(header_name, header_value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let body = response.bytes().await.map_err(|e| ProxyError::Network {
            message: format!("failed to read response body: {}", e),
        })?;

        debug!(url = %request.url, status, bytes = body.len(), "network response");

        Ok(ProxyResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
