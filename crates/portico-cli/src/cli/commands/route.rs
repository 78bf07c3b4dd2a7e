//! CLI command: portico route
//!
//! Show the rule the engine would apply to a request, without any network or
//! store access.
//!
//! Usage:
//!   portico route https://fonts.googleapis.com/css2?family=Inter
//!   portico route https://portal.example.com/api/audits -X POST --json

use anyhow::Result;
use portico_cache::{ProxyConfig, ProxyRequest};
use serde::Serialize;

use super::load_manifest;
use crate::cli::args::RouteArgs;
use crate::exit_codes::SUCCESS;

#[derive(Debug, Serialize)]
struct RouteDecision<'a> {
    url: &'a str,
    method: &'a str,
    /// Index of the matching rule in the table.
    rule: Option<usize>,
    strategy: Option<String>,
    cache_name: Option<&'a str>,
    max_entries: Option<usize>,
    max_age_seconds: Option<u64>,
    network_timeout_seconds: Option<u64>,
}

pub fn run(args: RouteArgs, config: &ProxyConfig) -> Result<i32> {
    let manifest = load_manifest(&args.source, config)?;
    let table = manifest.rule_table()?;
    let request = ProxyRequest::get(&args.url).with_method(&args.method);

    let selected = if request.is_routable() {
        table
            .rules()
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(&request.url))
    } else {
        None
    };

    let decision = RouteDecision {
        url: &request.url,
        method: &request.method,
        rule: selected.map(|(i, _)| i),
        strategy: selected.map(|(_, r)| r.strategy.to_string()),
        cache_name: selected.map(|(_, r)| r.cache_name.as_str()),
        max_entries: selected.map(|(_, r)| r.max_entries),
        max_age_seconds: selected.map(|(_, r)| r.max_age_seconds),
        network_timeout_seconds: selected.and_then(|(_, r)| r.network_timeout_seconds),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(SUCCESS);
    }

    match selected {
        Some((_, rule)) => {
            let mut line = format!(
                "{} {} -> {} ({}, max {} entries, {}s)",
                decision.method,
                decision.url,
                rule.cache_name,
                rule.strategy,
                rule.max_entries,
                rule.max_age_seconds
            );
            if let Some(timeout) = rule.network_timeout_seconds {
                line.push_str(&format!(", network timeout {}s", timeout));
            }
            println!("{line}");
        }
        None => println!("{} {} -> passthrough", decision.method, decision.url),
    }
    Ok(SUCCESS)
}
