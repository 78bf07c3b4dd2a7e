use std::path::PathBuf;
use std::sync::Arc;

use portico_cache::{CacheStore, ProxyConfig, ProxyError, ProxyManifest, SystemClock};

use super::args::*;

pub mod cache;
pub mod fetch;
pub mod manifest;
pub mod route;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = ProxyConfig::from_env();
    let result = match cli.cmd {
        Command::Manifest(args) => manifest::run(args, &config),
        Command::Route(args) => route::run(args, &config),
        Command::Fetch(args) => fetch::run(args, &config).await,
        Command::Cache(args) => cache::run(args, &config).await,
    };

    match result {
        Ok(code) => Ok(code),
        Err(e) => match e.downcast_ref::<ProxyError>() {
            Some(proxy_err) => {
                eprintln!("error: {e:#}");
                Ok(proxy_err.exit_code())
            }
            None => Err(e),
        },
    }
}

/// Manifest from `--config`, then `PORTICO_MANIFEST`, then the built-in one.
pub(crate) fn load_manifest(
    source: &ManifestSource,
    config: &ProxyConfig,
) -> anyhow::Result<ProxyManifest> {
    match source.config.as_ref().or(config.manifest_path.as_ref()) {
        Some(path) => Ok(ProxyManifest::load(path)?),
        None => Ok(ProxyManifest::portico_default()),
    }
}

/// Persistent store for the manifest's revision.
pub(crate) async fn open_store(
    cache_dir: Option<&PathBuf>,
    config: &ProxyConfig,
    manifest: &ProxyManifest,
) -> anyhow::Result<CacheStore> {
    let root = cache_dir.cloned().unwrap_or_else(|| config.cache_dir.clone());
    let store = CacheStore::open(root, &manifest.revision, Arc::new(SystemClock)).await?;
    Ok(store)
}
