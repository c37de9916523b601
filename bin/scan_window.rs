//! # Scan Window
//!
//! Runs one scan against the configured endpoints and prints what matched.
//!
//! ## Overview
//!
//! This binary:
//! - Loads settings (`Config.toml` or `--config`, then `EVENTSCAN_*` overrides)
//! - Resolves the required events from an ABI JSON file
//! - Plans a window: approximate lookback by default, or precise with `--since`
//! - Fetches and revalidates the logs in that window once, then exits
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin scan_window -- --abi abi/Vault.json --since 2024-05-01T00:00:00Z
//! ```

use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use clap::Parser;
use ethers::abi::Abi;
use eventscan_sdk::{
    metrics, AddressAllowList, EventSignatureSet, LogMatcher, LogScanner, RpcPool, Settings,
    Timestamp, WindowPlanner,
};
use log::info;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "scan_window", about = "Fetch matching event logs for one scan window")]
struct Args {
    /// Settings file (default ./Config.toml); EVENTSCAN_* variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// ABI JSON (plain array or a build artifact with an `abi` field).
    #[arg(long)]
    abi: Option<PathBuf>,

    /// Start of the window as RFC3339; resolved to a block by binary search.
    #[arg(long)]
    since: Option<String>,

    /// Print every matched log instead of per-event counts.
    #[arg(long)]
    verbose: bool,

    /// Prometheus listen address, e.g. 0.0.0.0:9000.
    #[cfg(feature = "observability")]
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,
}

fn load_abi(path: &Path) -> Result<Abi> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading ABI file {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing ABI file {}", path.display()))?;
    let abi_value = match value {
        Value::Object(mut artifact) => artifact
            .remove("abi")
            .ok_or_else(|| anyhow!("{} has no `abi` field", path.display()))?,
        other => other,
    };
    Ok(serde_json::from_value(abi_value)?)
}

fn parse_since(raw: &str) -> Result<Timestamp> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("--since `{}` is not RFC3339", raw))?;
    Ok(Timestamp(parsed.timestamp().max(0) as u64))
}

#[cfg(feature = "observability")]
fn install_exporter(args: &Args) -> Result<()> {
    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Prometheus exporter listening on {}", addr);
    }
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn install_exporter(_args: &Args) -> Result<()> {
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    install_exporter(&args)?;
    metrics::describe_metrics();

    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };

    let abi_path = args
        .abi
        .clone()
        .or_else(|| settings.matcher.abi_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow!("no ABI given (use --abi or matcher.abi_path)"))?;
    let abi = load_abi(&abi_path)?;

    let signatures = EventSignatureSet::resolve(&abi, &settings.matcher.required_events)?;
    let allow_list = AddressAllowList::from_strings(&settings.matcher.addresses)?;
    info!(
        "Matching {} event(s) on {} address(es)",
        signatures.len(),
        if allow_list.is_empty() {
            "all".to_string()
        } else {
            allow_list.len().to_string()
        }
    );
    let matcher = Arc::new(LogMatcher::new(signatures, allow_list));

    let pool = Arc::new(RpcPool::from_settings(&settings)?);
    let planner = WindowPlanner::new(Arc::clone(&pool));

    let range = match &args.since {
        Some(raw) => planner.window_since(parse_since(raw)?).await?,
        None => {
            planner
                .initial_window(settings.scan.lookback(), settings.scan.block_interval())
                .await?
        }
    };

    let scanner = LogScanner::new(
        Arc::clone(&pool),
        Arc::clone(&matcher),
        settings.scan.max_blocks_per_query,
    );
    let logs = scanner.fetch_matching(range).await?;

    println!("window {} ({} blocks): {} matching log(s)", range, range.len(), logs.len());
    if args.verbose {
        for log in &logs {
            let name = log
                .topics
                .first()
                .and_then(|t| matcher.signatures().name_of(t))
                .unwrap_or("?");
            println!(
                "  block {:>10}  {:?}  {}  tx {:?}",
                log.block_number.map(|b| b.as_u64()).unwrap_or_default(),
                log.address,
                name,
                log.transaction_hash.unwrap_or_default()
            );
        }
    } else {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for log in &logs {
            if let Some(name) = log.topics.first().and_then(|t| matcher.signatures().name_of(t)) {
                *counts.entry(name).or_default() += 1;
            }
        }
        for (name, count) in counts {
            println!("  {:<24} {}", name, count);
        }
    }
    Ok(())
}
