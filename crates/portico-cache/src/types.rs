//! Request/response types and proxy configuration.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// HTTP method, uppercase.
    pub method: String,

    /// Full request URL; also the partition key.
    pub url: String,

    /// Request headers forwarded to the network.
    pub headers: Vec<(String, String)>,
}

impl ProxyRequest {
    /// GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Only GET requests are routed through the rule table.
    pub fn is_routable(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A response as seen by the proxy.
///
/// Status `0` denotes an opaque cross-origin response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub status: u16,

    #[serde(default)]
    pub headers: Vec<(String, String)>,

    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl ProxyResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response held in a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub response: ProxyResponse,

    /// When the response entered the partition.
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Whether the entry is older than `max_age` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: std::time::Duration) -> bool {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        now - self.stored_at >= max_age
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// Fresh partition entry (CacheFirst hit).
    Cache,
    /// Live network response under a rule.
    Network,
    /// Stored entry served after a NetworkFirst timeout or failure.
    Fallback,
    /// No rule matched; request went straight to the network.
    Passthrough,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
            Self::Fallback => write!(f, "fallback"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Result of handling one intercepted request.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub response: ProxyResponse,

    pub source: ResponseSource,

    /// Partition of the matched rule, `None` for passthrough.
    pub cache_name: Option<String>,

    /// Whether the response was written to the partition.
    pub stored: bool,
}

/// Proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Root directory for persisted partitions.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Manifest file; the built-in manifest is used when unset.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,

    /// Transport timeout for the HTTP fetcher in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("portico")
        .join("partitions")
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            manifest_path: None,
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl ProxyConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PORTICO_CACHE_DIR` | Root for persisted partitions |
    /// | `PORTICO_MANIFEST` | Manifest path (JSON or YAML) |
    /// | `PORTICO_HTTP_TIMEOUT` | Fetcher transport timeout in seconds (default: 30) |
    pub fn from_env() -> Self {
        Self {
            cache_dir: std::env::var("PORTICO_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_cache_dir()),
            manifest_path: std::env::var("PORTICO_MANIFEST").ok().map(PathBuf::from),
            http_timeout_secs: std::env::var("PORTICO_HTTP_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_http_timeout),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(body))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}
