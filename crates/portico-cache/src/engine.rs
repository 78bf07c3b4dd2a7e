//! Strategy executor.
//!
//! Selection (`RuleTable::select`) is pure; this module runs the selected
//! strategy against the store and the network. The engine never retries.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::fetch::Fetcher;
use crate::manifest::ProxyManifest;
use crate::rule::{CacheRule, RuleTable, Strategy};
use crate::store::CacheStore;
use crate::types::{ProxyRequest, ProxyResponse, ResponseSource, ServedResponse};

/// Installed cache policy: an immutable rule table over an owned store.
#[derive(Clone)]
pub struct CachePolicyEngine {
    table: Arc<RuleTable>,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for CachePolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicyEngine")
            .field("rules", &self.table.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CachePolicyEngine {
    pub fn new(table: RuleTable, store: Arc<CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            table: Arc::new(table),
            store,
            fetcher,
        }
    }

    /// Install the manifest's runtime caching table.
    pub fn from_manifest(
        manifest: &ProxyManifest,
        store: Arc<CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> ProxyResult<Self> {
        Ok(Self::new(manifest.rule_table()?, store, fetcher))
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Handle one intercepted request.
    pub async fn handle(&self, request: &ProxyRequest) -> ProxyResult<ServedResponse> {
        let rule = if request.is_routable() {
            self.table.select(&request.url)
        } else {
            None
        };

        let Some(rule) = rule else {
            debug!(url = %request.url, method = %request.method, "no rule matched, passing through");
            let response = self.fetcher.fetch(request).await?;
            return Ok(ServedResponse {
                response,
                source: ResponseSource::Passthrough,
                cache_name: None,
                stored: false,
            });
        };

        match rule.strategy {
            Strategy::CacheFirst => self.cache_first(rule, request).await,
            Strategy::NetworkFirst => self.network_first(rule, request).await,
        }
    }

    async fn cache_first(
        &self,
        rule: &CacheRule,
        request: &ProxyRequest,
    ) -> ProxyResult<ServedResponse> {
        if let Some(entry) = self.store.lookup(rule, &request.url).await {
            debug!(url = %request.url, partition = %rule.cache_name, "cache hit");
            return Ok(served(entry.response, ResponseSource::Cache, rule, false));
        }

        let response = self.fetcher.fetch(request).await.map_err(|e| {
            warn!(url = %request.url, partition = %rule.cache_name, error = %e, "cache miss and network failed");
            e
        })?;

        let stored = store_if_cacheable(&self.store, rule, &request.url, &response).await?;
        Ok(served(response, ResponseSource::Network, rule, stored))
    }

    async fn network_first(
        &self,
        rule: &CacheRule,
        request: &ProxyRequest,
    ) -> ProxyResult<ServedResponse> {
        let timeout = match rule.network_timeout() {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => {
                return Err(ProxyError::InvalidRule {
                    pattern: rule.pattern.source().to_string(),
                    reason: "NetworkFirst rule needs a network timeout".to_string(),
                })
            }
        };

        // The fetch runs as its own task so a response that arrives after the
        // timeout still lands in the partition.
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let task_rule = rule.clone();
        let task_request = request.clone();
        let mut task = tokio::spawn(async move {
            let response = fetcher.fetch(&task_request).await?;
            let stored = store_if_cacheable(&store, &task_rule, &task_request.url, &response).await?;
            Ok::<_, ProxyError>((response, stored))
        });

        let failure = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok((response, stored)))) => {
                return Ok(served(response, ResponseSource::Network, rule, stored));
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(join_err)) => ProxyError::Network {
                message: format!("network task failed: {}", join_err),
            },
            Err(_) => {
                debug!(url = %request.url, timeout_secs = timeout.as_secs(), "network timeout");
                ProxyError::Timeout {
                    url: request.url.clone(),
                    after: timeout,
                }
            }
        };

        match self.store.lookup(rule, &request.url).await {
            Some(entry) => {
                warn!(
                    url = %request.url,
                    partition = %rule.cache_name,
                    error = %failure,
                    "network unavailable, serving stored response"
                );
                Ok(served(entry.response, ResponseSource::Fallback, rule, false))
            }
            None => {
                warn!(url = %request.url, partition = %rule.cache_name, error = %failure, "network unavailable and nothing stored");
                Err(failure)
            }
        }
    }
}

async fn store_if_cacheable(
    store: &CacheStore,
    rule: &CacheRule,
    key: &str,
    response: &ProxyResponse,
) -> ProxyResult<bool> {
    if !rule.is_cacheable(response.status) {
        debug!(url = key, status = response.status, "status not cacheable");
        return Ok(false);
    }

    store.insert(rule, key, response.clone()).await?;
    Ok(true)
}

fn served(
    response: ProxyResponse,
    source: ResponseSource,
    rule: &CacheRule,
    stored: bool,
) -> ServedResponse {
    ServedResponse {
        response,
        source,
        cache_name: Some(rule.cache_name.clone()),
        stored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::UrlPattern;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, _request: &ProxyRequest) -> ProxyResult<ProxyResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProxyResponse::new(200, "ok"))
        }
    }

    #[tokio::test]
    async fn test_network_first_without_timeout_is_invalid_rule() {
        let fetcher = Arc::new(CountingFetcher::default());
        let engine = CachePolicyEngine::new(
            RuleTable::new(Vec::new()).unwrap(),
            Arc::new(CacheStore::in_memory()),
            fetcher.clone(),
        );

        let mut rule = CacheRule::network_first(
            UrlPattern::new("/api/", true).unwrap(),
            "api-cache",
            10,
            50,
            300,
        );
        rule.network_timeout_seconds = None;

        let err = engine
            .network_first(&rule, &ProxyRequest::get("https://x/api/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::InvalidRule { .. }));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
