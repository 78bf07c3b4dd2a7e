//! Bootstrap configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, BootstrapResult};
use crate::layout::HttpLayoutProvider;

/// Default id of the application mount anchor.
pub const DEFAULT_ANCHOR_ID: &str = "app";

/// Shell bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Id of the element the application mounts into.
    #[serde(default = "default_anchor_id")]
    pub anchor_id: String,

    /// Base URL of the layout service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_url: Option<String>,

    /// Upper bound for the layout fetch, in seconds. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_timeout_secs: Option<u64>,

    /// Accept development module reloads.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_anchor_id() -> String {
    DEFAULT_ANCHOR_ID.to_string()
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            anchor_id: default_anchor_id(),
            layout_url: None,
            layout_timeout_secs: None,
            dev_mode: false,
        }
    }
}

impl BootstrapConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PORTICO_ANCHOR_ID` | Mount anchor id (default: `app`) |
    /// | `PORTICO_LAYOUT_URL` | Layout service base URL |
    /// | `PORTICO_LAYOUT_TIMEOUT` | Layout fetch bound in seconds |
    /// | `PORTICO_DEV_MODE` | Accept module reloads (`1` or `true`) |
    pub fn from_env() -> Self {
        Self {
            anchor_id: std::env::var("PORTICO_ANCHOR_ID")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default_anchor_id),
            layout_url: std::env::var("PORTICO_LAYOUT_URL").ok(),
            layout_timeout_secs: std::env::var("PORTICO_LAYOUT_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0),
            dev_mode: std::env::var("PORTICO_DEV_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Set the anchor id.
    pub fn with_anchor_id(mut self, id: impl Into<String>) -> Self {
        self.anchor_id = id.into();
        self
    }

    /// Set the layout service base URL.
    pub fn with_layout_url(mut self, url: impl Into<String>) -> Self {
        self.layout_url = Some(url.into());
        self
    }

    /// Bound the layout fetch.
    pub fn with_layout_timeout(mut self, timeout: Duration) -> Self {
        self.layout_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Enable development reloads.
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn layout_timeout(&self) -> Option<Duration> {
        self.layout_timeout_secs.map(Duration::from_secs)
    }

    /// Build the HTTP layout provider for `layout_url`.
    pub fn layout_provider(&self) -> BootstrapResult<HttpLayoutProvider> {
        let url = self
            .layout_url
            .as_deref()
            .ok_or_else(|| BootstrapError::Config {
                message: "layout_url is not set (PORTICO_LAYOUT_URL)".to_string(),
            })?;
        HttpLayoutProvider::new(url)
    }
}
