//! Background proxy manifest.
//!
//! The manifest is the persisted configuration surface of the proxy: app
//! identity, registration behavior, the runtime caching rule table and the
//! bundle grouping. It is deployed, never mutated at runtime; changing any
//! caching behavior means shipping a manifest with a new `revision`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::rule::{CacheRule, RuleTable, UrlPattern};

const ONE_YEAR_SECS: u64 = 60 * 60 * 24 * 365;
const THIRTY_DAYS_SECS: u64 = 60 * 60 * 24 * 30;
const FIVE_MINUTES_SECS: u64 = 60 * 5;

/// How the proxy picks up a new deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RegisterType {
    /// Activate new revisions without asking.
    #[default]
    AutoUpdate,
    /// Wait for the page to confirm activation.
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    Fullscreen,
    #[default]
    Standalone,
    MinimalUi,
    Browser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub src: String,
    pub sizes: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// Installable app identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub description: String,
    pub theme_color: String,
    pub background_color: String,
    #[serde(default)]
    pub display: DisplayMode,
    #[serde(default)]
    pub icons: Vec<Icon>,
}

/// Named group of modules loaded and cached together at the HTTP layer.
///
/// Bundles only shape load granularity; partitions are chosen from request
/// URLs regardless of bundle membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleGroup {
    pub name: String,
    pub modules: Vec<String>,
}

/// Output file naming templates; `[name]`, `[hash]` and `[ext]` are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetNaming {
    pub chunk_file_names: String,
    pub entry_file_names: String,
    pub asset_file_names: String,
}

impl Default for AssetNaming {
    fn default() -> Self {
        Self {
            chunk_file_names: "assets/js/[name]-[hash].js".to_string(),
            entry_file_names: "assets/js/[name]-[hash].js".to_string(),
            asset_file_names: "assets/[ext]/[name]-[hash].[ext]".to_string(),
        }
    }
}

impl AssetNaming {
    pub fn chunk_file(&self, name: &str, hash: &str) -> String {
        fill_template(&self.chunk_file_names, name, hash, "js")
    }

    pub fn entry_file(&self, name: &str, hash: &str) -> String {
        fill_template(&self.entry_file_names, name, hash, "js")
    }

    pub fn asset_file(&self, name: &str, hash: &str, ext: &str) -> String {
        fill_template(&self.asset_file_names, name, hash, ext)
    }
}

fn fill_template(template: &str, name: &str, hash: &str, ext: &str) -> String {
    template
        .replace("[name]", name)
        .replace("[hash]", hash)
        .replace("[ext]", ext)
}

/// Proxy manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyManifest {
    #[serde(default)]
    pub register_type: RegisterType,

    /// Install revision; partitions of any other revision are discarded.
    pub revision: String,

    #[serde(rename = "manifest")]
    pub identity: AppIdentity,

    /// Static assets precached alongside the app.
    #[serde(default)]
    pub include_assets: Vec<String>,

    /// Rule table, in priority order.
    pub runtime_caching: Vec<CacheRule>,

    #[serde(default)]
    pub bundles: Vec<BundleGroup>,

    #[serde(default)]
    pub output: AssetNaming,
}

impl ProxyManifest {
    /// The deployed Portico manifest.
    pub fn portico_default() -> Self {
        Self {
            register_type: RegisterType::AutoUpdate,
            revision: concat!("portico-", env!("CARGO_PKG_VERSION")).to_string(),
            identity: AppIdentity {
                name: "Portal Auditoria".to_string(),
                short_name: "Auditoria".to_string(),
                description: "Sistema de Gestão de Auditoria".to_string(),
                theme_color: "#0066cc".to_string(),
                background_color: "#ffffff".to_string(),
                display: DisplayMode::Standalone,
                icons: vec![
                    Icon {
                        src: "icon-192.png".to_string(),
                        sizes: "192x192".to_string(),
                        mime_type: "image/png".to_string(),
                    },
                    Icon {
                        src: "icon-512.png".to_string(),
                        sizes: "512x512".to_string(),
                        mime_type: "image/png".to_string(),
                    },
                ],
            },
            include_assets: vec![
                "favicon.ico".to_string(),
                "robots.txt".to_string(),
                "apple-touch-icon.png".to_string(),
            ],
            runtime_caching: default_rules(),
            bundles: default_bundles(),
            output: AssetNaming::default(),
        }
    }

    /// Load a manifest from JSON, or YAML when the extension is `.yaml`/`.yml`.
    pub fn load(path: &Path) -> ProxyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProxyError::InvalidManifest {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let manifest = if is_yaml {
            Self::from_yaml(&content)?
        } else {
            Self::from_json(&content)?
        };

        debug!(path = %path.display(), revision = %manifest.revision, "loaded manifest");
        Ok(manifest)
    }

    pub fn from_json(content: &str) -> ProxyResult<Self> {
        let manifest: Self =
            serde_json::from_str(content).map_err(|e| ProxyError::InvalidManifest {
                message: format!("failed to parse manifest JSON: {}", e),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_yaml(content: &str) -> ProxyResult<Self> {
        let manifest: Self =
            serde_yaml::from_str(content).map_err(|e| ProxyError::InvalidManifest {
                message: format!("failed to parse manifest YAML: {}", e),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn to_json(&self) -> ProxyResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ProxyError::InvalidManifest {
            message: format!("failed to serialize manifest: {}", e),
        })
    }

    pub fn to_yaml(&self) -> ProxyResult<String> {
        serde_yaml::to_string(self).map_err(|e| ProxyError::InvalidManifest {
            message: format!("failed to serialize manifest: {}", e),
        })
    }

    /// Check identity, bundles and the rule table.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.revision.trim().is_empty() {
            return Err(ProxyError::InvalidManifest {
                message: "revision must not be empty".to_string(),
            });
        }
        if self.identity.name.trim().is_empty() {
            return Err(ProxyError::InvalidManifest {
                message: "manifest.name must not be empty".to_string(),
            });
        }

        for (i, bundle) in self.bundles.iter().enumerate() {
            for module in &bundle.modules {
                let owner = self.bundles[..i]
                    .iter()
                    .find(|b| b.modules.iter().any(|m| m == module));
                if let Some(owner) = owner {
                    return Err(ProxyError::InvalidManifest {
                        message: format!(
                            "module {} is in both bundle {} and bundle {}",
                            module, owner.name, bundle.name
                        ),
                    });
                }
            }
        }

        self.rule_table().map(|_| ())
    }

    /// Validated rule table for the engine.
    pub fn rule_table(&self) -> ProxyResult<RuleTable> {
        RuleTable::new(self.runtime_caching.clone())
    }

    /// Bundle a module belongs to, if any.
    pub fn bundle_for(&self, module: &str) -> Option<&BundleGroup> {
        self.bundles
            .iter()
            .find(|b| b.modules.iter().any(|m| m == module))
    }
}

impl Default for ProxyManifest {
    fn default() -> Self {
        Self::portico_default()
    }
}

fn default_rules() -> Vec<CacheRule> {
    let pattern = |source: &str, case_insensitive: bool| {
        UrlPattern::new(source, case_insensitive).expect("built-in url pattern compiles")
    };

    vec![
        CacheRule::cache_first(
            pattern(r"^https://fonts\.googleapis\.com/.*", true),
            "google-fonts-cache",
            10,
            ONE_YEAR_SECS,
        )
        .with_statuses([0, 200]),
        CacheRule::cache_first(
            pattern(r"\.(?:png|jpg|jpeg|svg|gif|webp)$", false),
            "images-cache",
            60,
            THIRTY_DAYS_SECS,
        ),
        CacheRule::network_first(pattern(r"/api/", true), "api-cache", 10, 50, FIVE_MINUTES_SECS)
            .with_statuses([0, 200]),
    ]
}

fn default_bundles() -> Vec<BundleGroup> {
    let group = |name: &str, modules: &[&str]| BundleGroup {
        name: name.to_string(),
        modules: modules.iter().map(|m| m.to_string()).collect(),
    };

    vec![
        group(
            "vendor-core",
            &[
                "./src/core/router/Router",
                "./src/core/http/HttpClient",
                "./src/core/state/Store",
                "./src/core/logger/Logger",
            ],
        ),
        group(
            "vendor-performance",
            &[
                "./src/core/performance/PerformanceMonitor",
                "./src/core/performance/LazyLoader",
                "./src/core/performance/ImageOptimizer",
            ],
        ),
        group(
            "auth",
            &[
                "./src/services/auth.service",
                "./src/pages/public/login/LoginPage",
                "./src/pages/public/register/RegisterPage",
            ],
        ),
        group("admin", &["./src/pages/admin/dashboard/DashboardPage"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Strategy;
    use tempfile::TempDir;

    #[test]
    fn test_default_rule_table_order() {
        let manifest = ProxyManifest::portico_default();
        let table = manifest.rule_table().unwrap();
        let names: Vec<&str> = table.rules().iter().map(|r| r.cache_name.as_str()).collect();
        assert_eq!(names, vec!["google-fonts-cache", "images-cache", "api-cache"]);
    }

    #[test]
    fn test_default_rules_route_by_resource_class() {
        let table = ProxyManifest::portico_default().rule_table().unwrap();

        let fonts = table
            .select("https://fonts.googleapis.com/css2?family=Inter")
            .unwrap();
        assert_eq!(fonts.strategy, Strategy::CacheFirst);
        assert_eq!(fonts.max_entries, 10);
        assert_eq!(fonts.max_age_seconds, 31_536_000);
        assert!(fonts.is_cacheable(0));

        let images = table.select("https://portal.example.com/img/logo.svg").unwrap();
        assert_eq!(images.cache_name, "images-cache");
        assert_eq!(images.max_entries, 60);
        assert_eq!(images.max_age_seconds, 2_592_000);
        assert!(!images.is_cacheable(0));

        let api = table.select("https://portal.example.com/api/audits").unwrap();
        assert_eq!(api.strategy, Strategy::NetworkFirst);
        assert_eq!(api.network_timeout_seconds, Some(10));
        assert_eq!(api.max_entries, 50);
        assert_eq!(api.max_age_seconds, 300);

        assert!(table.select("https://portal.example.com/index.html").is_none());
    }

    #[test]
    fn test_font_rule_wins_over_image_rule() {
        let table = ProxyManifest::portico_default().rule_table().unwrap();
        let rule = table.select("https://fonts.googleapis.com/icon.png").unwrap();
        assert_eq!(rule.cache_name, "google-fonts-cache");
    }

    #[test]
    fn test_json_roundtrip_preserves_rules() {
        let manifest = ProxyManifest::portico_default();
        let json = manifest.to_json().unwrap();
        assert!(json.contains("\"registerType\": \"autoUpdate\""));
        assert!(json.contains("\"display\": \"standalone\""));

        let back = ProxyManifest::from_json(&json).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_yaml_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.yaml");
        std::fs::write(&path, ProxyManifest::portico_default().to_yaml().unwrap()).unwrap();

        let loaded = ProxyManifest::load(&path).unwrap();
        assert_eq!(loaded.runtime_caching.len(), 3);
    }

    #[test]
    fn test_invalid_rule_rejects_manifest() {
        let mut json: serde_json::Value =
            serde_json::from_str(&ProxyManifest::portico_default().to_json().unwrap()).unwrap();
        json["runtimeCaching"][2]["maxEntries"] = serde_json::json!(0);

        let err = ProxyManifest::from_json(&json.to_string()).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidManifest { .. }));
    }

    #[test]
    fn test_module_in_two_bundles_rejected() {
        let mut manifest = ProxyManifest::portico_default();
        manifest.bundles[3]
            .modules
            .push("./src/services/auth.service".to_string());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_bundle_lookup_and_naming() {
        let manifest = ProxyManifest::portico_default();
        let bundle = manifest.bundle_for("./src/core/state/Store").unwrap();
        assert_eq!(bundle.name, "vendor-core");
        assert!(manifest.bundle_for("./src/pages/unknown").is_none());

        assert_eq!(
            manifest.output.chunk_file("vendor-core", "a1b2"),
            "assets/js/vendor-core-a1b2.js"
        );
        assert_eq!(
            manifest.output.asset_file("main", "ff00", "css"),
            "assets/css/main-ff00.css"
        );
    }
}
