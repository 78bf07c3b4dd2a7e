//! Cache rules and first-match rule selection.
//!
//! A rule binds a URL pattern to a strategy, a named partition and the
//! partition's eviction limits. Rules are evaluated in table order and the
//! first match wins; selection is a pure function so it can be tested without
//! a running proxy.

use std::collections::BTreeSet;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, ProxyResult};

/// Strategy applied to requests matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Serve a fresh stored entry; hit the network only on miss or staleness.
    CacheFirst,
    /// Prefer the network within a timeout; fall back to the stored entry.
    NetworkFirst,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CacheFirst => write!(f, "CacheFirst"),
            Self::NetworkFirst => write!(f, "NetworkFirst"),
        }
    }
}

/// Compiled URL matcher.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    case_insensitive: bool,
    regex: Regex,
}

impl UrlPattern {
    /// Compile a pattern.
    pub fn new(source: impl Into<String>, case_insensitive: bool) -> ProxyResult<Self> {
        let source = source.into();
        let regex = RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| ProxyError::InvalidRule {
                pattern: source.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            source,
            case_insensitive,
            regex,
        })
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.case_insensitive == other.case_insensitive
    }
}

/// Serialized shape of a rule (manifest `runtimeCaching` entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRuleDef {
    /// Regular expression matched against the full request URL.
    pub url_pattern: String,

    #[serde(default)]
    pub case_insensitive: bool,

    pub handler: Strategy,

    pub cache_name: String,

    pub max_entries: usize,

    pub max_age_seconds: u64,

    /// Statuses allowed into the partition. Defaults to `[200]`.
    #[serde(default = "default_cacheable_statuses")]
    pub cacheable_statuses: BTreeSet<u16>,

    /// Required for NetworkFirst, rejected for CacheFirst.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_timeout_seconds: Option<u64>,
}

fn default_cacheable_statuses() -> BTreeSet<u16> {
    BTreeSet::from([200])
}

/// A validated cache rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CacheRuleDef", into = "CacheRuleDef")]
pub struct CacheRule {
    pub pattern: UrlPattern,
    pub strategy: Strategy,
    pub cache_name: String,
    pub max_entries: usize,
    pub max_age_seconds: u64,
    pub cacheable_statuses: BTreeSet<u16>,
    pub network_timeout_seconds: Option<u64>,
}

impl CacheRule {
    /// CacheFirst rule with the default cacheable statuses (`200`).
    pub fn cache_first(
        pattern: UrlPattern,
        cache_name: impl Into<String>,
        max_entries: usize,
        max_age_seconds: u64,
    ) -> Self {
        Self {
            pattern,
            strategy: Strategy::CacheFirst,
            cache_name: cache_name.into(),
            max_entries,
            max_age_seconds,
            cacheable_statuses: default_cacheable_statuses(),
            network_timeout_seconds: None,
        }
    }

    /// NetworkFirst rule with the default cacheable statuses (`200`).
    pub fn network_first(
        pattern: UrlPattern,
        cache_name: impl Into<String>,
        network_timeout_seconds: u64,
        max_entries: usize,
        max_age_seconds: u64,
    ) -> Self {
        Self {
            pattern,
            strategy: Strategy::NetworkFirst,
            cache_name: cache_name.into(),
            max_entries,
            max_age_seconds,
            cacheable_statuses: default_cacheable_statuses(),
            network_timeout_seconds: Some(network_timeout_seconds),
        }
    }

    /// Replace the cacheable statuses.
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.cacheable_statuses = statuses.into_iter().collect();
        self
    }

    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    pub fn is_cacheable(&self, status: u16) -> bool {
        self.cacheable_statuses.contains(&status)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    /// NetworkFirst race deadline; `None` for CacheFirst.
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_seconds.map(Duration::from_secs)
    }

    /// Check the per-rule invariants.
    pub fn validate(&self) -> ProxyResult<()> {
        let invalid = |reason: &str| ProxyError::InvalidRule {
            pattern: self.pattern.source().to_string(),
            reason: reason.to_string(),
        };

        if self.cache_name.trim().is_empty() {
            return Err(invalid("cacheName must not be empty"));
        }
        if self.max_entries == 0 {
            return Err(invalid("maxEntries must be greater than 0"));
        }
        if self.max_age_seconds == 0 {
            return Err(invalid("maxAgeSeconds must be greater than 0"));
        }
        if self.cacheable_statuses.is_empty() {
            return Err(invalid("cacheableStatuses must not be empty"));
        }

        match (self.strategy, self.network_timeout_seconds) {
            (Strategy::NetworkFirst, None) => {
                Err(invalid("networkTimeoutSeconds is required for NetworkFirst"))
            }
            (Strategy::NetworkFirst, Some(0)) => {
                Err(invalid("networkTimeoutSeconds must be greater than 0"))
            }
            (Strategy::CacheFirst, Some(_)) => {
                Err(invalid("networkTimeoutSeconds is only meaningful for NetworkFirst"))
            }
            _ => Ok(()),
        }
    }
}

impl TryFrom<CacheRuleDef> for CacheRule {
    type Error = ProxyError;

    fn try_from(def: CacheRuleDef) -> Result<Self, Self::Error> {
        let rule = Self {
            pattern: UrlPattern::new(def.url_pattern, def.case_insensitive)?,
            strategy: def.handler,
            cache_name: def.cache_name,
            max_entries: def.max_entries,
            max_age_seconds: def.max_age_seconds,
            cacheable_statuses: def.cacheable_statuses,
            network_timeout_seconds: def.network_timeout_seconds,
        };
        rule.validate()?;
        Ok(rule)
    }
}

impl From<CacheRule> for CacheRuleDef {
    fn from(rule: CacheRule) -> Self {
        Self {
            url_pattern: rule.pattern.source,
            case_insensitive: rule.pattern.case_insensitive,
            handler: rule.strategy,
            cache_name: rule.cache_name,
            max_entries: rule.max_entries,
            max_age_seconds: rule.max_age_seconds,
            cacheable_statuses: rule.cacheable_statuses,
            network_timeout_seconds: rule.network_timeout_seconds,
        }
    }
}

/// Ordered, validated rule table.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<CacheRule>,
}

impl RuleTable {
    /// Build a table, validating each rule and that rules sharing a partition
    /// agree on its limits.
    pub fn new(rules: Vec<CacheRule>) -> ProxyResult<Self> {
        for (i, rule) in rules.iter().enumerate() {
            rule.validate()?;

            let conflicting = rules[..i].iter().find(|earlier| {
                earlier.cache_name == rule.cache_name
                    && (earlier.max_entries != rule.max_entries
                        || earlier.max_age_seconds != rule.max_age_seconds)
            });
            if let Some(earlier) = conflicting {
                return Err(ProxyError::InvalidRule {
                    pattern: rule.pattern.source().to_string(),
                    reason: format!(
                        "partition '{}' already declared by {} with different limits",
                        rule.cache_name,
                        earlier.pattern.source()
                    ),
                });
            }
        }

        Ok(Self { rules })
    }

    /// First rule matching `url`, if any.
    pub fn select(&self, url: &str) -> Option<&CacheRule> {
        select_rule(url, &self.rules)
    }

    pub fn rules(&self) -> &[CacheRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// First rule in `table` whose pattern matches `url`.
pub fn select_rule<'a>(url: &str, table: &'a [CacheRule]) -> Option<&'a CacheRule> {
    table.iter().find(|rule| rule.matches(url))
}
