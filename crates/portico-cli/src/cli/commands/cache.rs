//! CLI command: portico cache
//!
//! Usage:
//!   portico cache stats [--sweep] [--json]
//!   portico cache clear

use anyhow::Result;
use portico_cache::ProxyConfig;
use serde::Serialize;

use super::{load_manifest, open_store};
use crate::cli::args::{CacheArgs, CacheCommand, CacheStatsArgs, CacheStoreArgs};
use crate::exit_codes::SUCCESS;

#[derive(Debug, Serialize)]
struct PartitionReport {
    name: String,
    entries: usize,
    max_entries: usize,
    max_age_seconds: u64,
}

pub async fn run(args: CacheArgs, config: &ProxyConfig) -> Result<i32> {
    match args.cmd {
        CacheCommand::Stats(args) => stats(args, config).await,
        CacheCommand::Clear(args) => clear(args, config).await,
    }
}

async fn stats(args: CacheStatsArgs, config: &ProxyConfig) -> Result<i32> {
    let manifest = load_manifest(&args.store.source, config)?;
    let store = open_store(args.store.cache_dir.as_ref(), config, &manifest).await?;

    if args.sweep {
        let removed = store.sweep_expired().await;
        store.flush().await?;
        eprintln!("swept {removed} expired entries");
    }

    let mut reports = Vec::new();
    for name in store.partition_names().await {
        let Some(partition) = store.partition(&name).await else {
            continue;
        };
        reports.push(PartitionReport {
            entries: partition.len().await,
            max_entries: partition.max_entries().await,
            max_age_seconds: partition.max_age().await.as_secs(),
            name,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(SUCCESS);
    }

    if reports.is_empty() {
        println!("no partitions for revision {}", manifest.revision);
        return Ok(SUCCESS);
    }
    for report in &reports {
        println!(
            "{:<24} {:>5}/{:<5} max-age {}s",
            report.name, report.entries, report.max_entries, report.max_age_seconds
        );
    }
    Ok(SUCCESS)
}

async fn clear(args: CacheStoreArgs, config: &ProxyConfig) -> Result<i32> {
    let manifest = load_manifest(&args.source, config)?;
    let store = open_store(args.cache_dir.as_ref(), config, &manifest).await?;
    let partitions = store.partition_names().await.len();
    store.clear().await?;
    println!("cleared {partitions} partitions for revision {}", manifest.revision);
    Ok(SUCCESS)
}
