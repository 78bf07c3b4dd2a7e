//! CLI command: portico fetch
//!
//! Serve one request through the cache policy engine backed by the
//! persistent partition store, then flush the store.
//!
//! Usage:
//!   portico fetch https://portal.example.com/api/audits -H "Authorization: Bearer ..."
//!   portico fetch https://portal.example.com/img/logo.png --body > logo.png

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use portico_cache::{CachePolicyEngine, HttpFetcher, ProxyConfig, ProxyRequest};
use tracing::info;

use super::{load_manifest, open_store};
use crate::cli::args::FetchArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: FetchArgs, config: &ProxyConfig) -> Result<i32> {
    let manifest = load_manifest(&args.source, config)?;
    let store = Arc::new(open_store(args.cache_dir.as_ref(), config, &manifest).await?);
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(config.http_timeout_secs))?);
    let engine = CachePolicyEngine::from_manifest(&manifest, Arc::clone(&store), fetcher)?;

    let mut request = ProxyRequest::get(&args.url);
    for raw in &args.headers {
        let Some((name, value)) = raw.split_once(':') else {
            bail!("invalid header {raw:?}, expected `Name: value`");
        };
        request = request.with_header(name.trim(), value.trim());
    }

    let served = engine.handle(&request).await?;
    store.flush().await?;

    info!(
        url = %args.url,
        status = served.response.status,
        source = %served.source,
        partition = served.cache_name.as_deref().unwrap_or("-"),
        stored = served.stored,
        "request served"
    );

    if args.body {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&served.response.body)
            .context("failed to write response body")?;
        stdout.flush()?;
    } else {
        println!(
            "{} {} {}{}",
            served.response.status,
            served.source,
            served.cache_name.as_deref().unwrap_or("-"),
            if served.stored { " (stored)" } else { "" }
        );
    }
    Ok(SUCCESS)
}
