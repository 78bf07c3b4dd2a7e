//! Runtime cache policy engine for the Portico background network proxy.
//!
//! This crate decides how intercepted requests are served when the network
//! is slow, absent or unreliable:
//!
//! - Ordered rule table with first-match URL selection
//! - CacheFirst and NetworkFirst strategies
//! - Named partitions with LRU capacity eviction and age-based expiry
//! - Per-revision partition persistence
//! - Deployable proxy manifest (identity, rules, bundle grouping)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use portico_cache::{CachePolicyEngine, CacheStore, HttpFetcher, ProxyManifest, ProxyRequest};
//!
//! # async fn example() -> Result<(), portico_cache::ProxyError> {
//! let manifest = ProxyManifest::portico_default();
//! let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30))?);
//! let engine = CachePolicyEngine::from_manifest(&manifest, Arc::new(CacheStore::in_memory()), fetcher)?;
//!
//! let served = engine.handle(&ProxyRequest::get("https://portal.example.com/api/audits")).await?;
//! println!("{} from {}", served.response.status, served.source);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PORTICO_CACHE_DIR` | Root for persisted partitions |
//! | `PORTICO_MANIFEST` | Manifest path (JSON or YAML) |
//! | `PORTICO_HTTP_TIMEOUT` | Fetcher transport timeout in seconds (default: 30) |

pub mod clock;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod rule;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::CachePolicyEngine;
pub use error::{ProxyError, ProxyResult};
pub use fetch::{Fetcher, HttpFetcher};
pub use manifest::{
    AppIdentity, AssetNaming, BundleGroup, DisplayMode, Icon, ProxyManifest, RegisterType,
};
pub use rule::{select_rule, CacheRule, CacheRuleDef, RuleTable, Strategy, UrlPattern};
pub use store::{CachePartition, CacheStore, PartitionSnapshot, PartitionStats};
pub use types::{
    ProxyConfig, ProxyRequest, ProxyResponse, ResponseSource, ServedResponse, StoredResponse,
};
