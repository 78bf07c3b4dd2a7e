//! CLI command: portico manifest
//!
//! Usage:
//!   portico manifest [--config portico.yaml] [--format json|yaml] [--check]

use anyhow::Result;
use portico_cache::ProxyConfig;

use super::load_manifest;
use crate::cli::args::{ManifestArgs, OutputFormat};
use crate::exit_codes::SUCCESS;

pub fn run(args: ManifestArgs, config: &ProxyConfig) -> Result<i32> {
    let manifest = load_manifest(&args.source, config)?;

    if args.check {
        println!(
            "ok: {} ({} rules, {} bundles, revision {})",
            manifest.identity.name,
            manifest.runtime_caching.len(),
            manifest.bundles.len(),
            manifest.revision
        );
        return Ok(SUCCESS);
    }

    let rendered = match args.format {
        OutputFormat::Json => manifest.to_json()?,
        OutputFormat::Yaml => manifest.to_yaml()?,
    };
    println!("{}", rendered.trim_end());
    Ok(SUCCESS)
}
