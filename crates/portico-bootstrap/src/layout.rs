//! Layout data and its providers.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BootstrapError, BootstrapResult};

const USER_AGENT_VALUE: &str = concat!("portico-bootstrap/", env!("CARGO_PKG_VERSION"));

/// Path of the header/footer resource under the layout service base URL.
pub const LAYOUT_PATH: &str = "/layout/header-footer";

/// Header/footer payload.
///
/// The bootstrap never inspects it; renderers interpret it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutData(serde_json::Value);

impl LayoutData {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Top-level field lookup.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Top-level string field lookup.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for LayoutData {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Source of header/footer layout data.
#[async_trait]
pub trait LayoutProvider: Send + Sync {
    async fn get_header_footer(&self) -> BootstrapResult<LayoutData>;
}

/// Layout provider backed by the layout HTTP service.
#[derive(Debug, Clone)]
pub struct HttpLayoutProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLayoutProvider {
    /// Create a provider for the service at `base_url`.
    ///
    /// The client carries no request timeout; the mounter applies the
    /// configured layout bound, if any.
    pub fn new(base_url: &str) -> BootstrapResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| BootstrapError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a provider with a custom client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), LAYOUT_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LayoutProvider for HttpLayoutProvider {
    async fn get_header_footer(&self) -> BootstrapResult<LayoutData> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(BootstrapError::LayoutFetch {
                message: format!("{} returned HTTP {}", self.endpoint, status.as_u16()),
            });
        }

        let data: LayoutData = response.json().await?;
        debug!(endpoint = %self.endpoint, "layout data received");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = reqwest::Client::new();
        let a = HttpLayoutProvider::with_client(client.clone(), "https://portal.example.com");
        let b = HttpLayoutProvider::with_client(client, "https://portal.example.com/");
        assert_eq!(a.endpoint(), "https://portal.example.com/layout/header-footer");
        assert_eq!(a.endpoint(), b.endpoint());
    }

    #[test]
    fn test_layout_data_is_transparent() {
        let data: LayoutData = serde_json::from_value(json!({"title": "Audits"})).unwrap();
        assert_eq!(data.str_field("title"), Some("Audits"));
        assert_eq!(serde_json::to_value(&data).unwrap(), json!({"title": "Audits"}));
    }
}
