use config::{Config, ConfigError, File};
use log::warn;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::types::BlockInterval;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default)]
    pub http_urls: Vec<String>,
    /// Requests per second for the whole pool (floor 1).
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_rate_limit_rps() -> u32 {
    2
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_urls: Vec::new(),
            rate_limit_rps: default_rate_limit_rps(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Scan {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u64,
    #[serde(default = "default_block_interval_seconds")]
    pub approx_block_interval_seconds: f64,
    /// Largest block span requested in a single eth_getLogs call.
    #[serde(default = "default_max_blocks_per_query")]
    pub max_blocks_per_query: u64,
}

fn default_lookback_days() -> u64 {
    14
}
fn default_block_interval_seconds() -> f64 {
    2.2
}
fn default_max_blocks_per_query() -> u64 {
    2_000
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            approx_block_interval_seconds: default_block_interval_seconds(),
            max_blocks_per_query: default_max_blocks_per_query(),
        }
    }
}

impl Scan {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_days.saturating_mul(86_400))
    }

    pub fn block_interval(&self) -> BlockInterval {
        BlockInterval(self.approx_block_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Matcher {
    /// Contract allow-list; empty accepts any address.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Event names that must resolve in the ABI.
    #[serde(default)]
    pub required_events: Vec<String>,
    /// ABI JSON consumed by the scan binary.
    #[serde(default)]
    pub abi_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub matcher: Matcher,
}

pub const ENV_RPC_URLS: &str = "EVENTSCAN_RPC_URLS";
pub const ENV_RPC_RATE_LIMIT: &str = "EVENTSCAN_RPC_RATE_LIMIT";
pub const ENV_RPC_TIMEOUT_MS: &str = "EVENTSCAN_RPC_TIMEOUT_MS";
pub const ENV_LOOKBACK_DAYS: &str = "EVENTSCAN_LOOKBACK_DAYS";
pub const ENV_BLOCK_INTERVAL_SECONDS: &str = "EVENTSCAN_BLOCK_INTERVAL_SECONDS";
pub const ENV_ADDRESSES: &str = "EVENTSCAN_ADDRESSES";
pub const ENV_REQUIRED_EVENTS: &str = "EVENTSCAN_REQUIRED_EVENTS";

impl Settings {
    /// Loads `Config.toml` from the working directory if present, then applies
    /// `EVENTSCAN_*` environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    /// Loads an explicit config file (format inferred from the extension),
    /// then applies `EVENTSCAN_*` overrides the same way [`Settings::new`] does.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with(path.as_ref(), |key| env::var(key).ok())
    }

    fn from_file_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = Config::builder()
            .add_source(File::from(path))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(lookup);
        Ok(settings)
    }

    /// Applies overrides from `lookup` (normally the process environment).
    /// Empty values are ignored; malformed numbers are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_RPC_URLS) {
            if let Some(list) = parse_string_list(&raw) {
                if !list.is_empty() {
                    self.rpc.http_urls = list;
                }
            }
        }
        if let Some(rps) = parse_override::<u32>(&lookup, ENV_RPC_RATE_LIMIT) {
            self.rpc.rate_limit_rps = rps.max(1);
        }
        if let Some(ms) = parse_override::<u64>(&lookup, ENV_RPC_TIMEOUT_MS) {
            self.rpc.request_timeout_ms = ms;
        }
        if let Some(days) = parse_override::<u64>(&lookup, ENV_LOOKBACK_DAYS) {
            self.scan.lookback_days = days;
        }
        if let Some(secs) = parse_override::<f64>(&lookup, ENV_BLOCK_INTERVAL_SECONDS) {
            if secs.is_finite() && secs > 0.0 {
                self.scan.approx_block_interval_seconds = secs;
            } else {
                warn!("Ignoring {}={}: must be a positive number", ENV_BLOCK_INTERVAL_SECONDS, secs);
            }
        }
        // An explicitly empty allow-list is meaningful ("all addresses").
        if let Some(raw) = lookup(ENV_ADDRESSES) {
            if let Some(list) = parse_string_list(&raw) {
                self.matcher.addresses = list.into_iter().map(|a| a.to_lowercase()).collect();
            }
        }
        if let Some(raw) = lookup(ENV_REQUIRED_EVENTS) {
            if let Some(list) = parse_string_list(&raw) {
                if !list.is_empty() {
                    self.matcher.required_events = list;
                }
            }
        }
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, trimmed, e);
            None
        }
    }
}

/// Parses either a JSON string array or a comma-delimited list.
pub fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(
                v.into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }
        // Not valid JSON: strip the brackets and fall through to comma splitting.
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']');
        return Some(split_list(without_brackets));
    }

    Some(split_list(trimmed))
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// True for template values copied from provider docs rather than a real key:
/// `<key>`-style angle brackets, "your-key"/"your_api_key" wording, or runs
/// of `xxxxx`.
pub fn is_placeholder_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    if lower.contains('<') && lower.contains('>') {
        return true;
    }
    if lower.contains("your-") || lower.contains("your_") || lower.contains("yourkey") {
        return true;
    }
    lower.contains("xxxxx")
}

/// Trimmed, de-duplicated, non-placeholder URLs, in configured order.
pub fn usable_endpoint_urls(urls: &[String]) -> Vec<String> {
    let mut usable: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls {
        let url = url.trim();
        if url.is_empty() {
            continue;
        }
        if is_placeholder_url(url) {
            warn!(
                "Skipping placeholder RPC URL {}",
                crate::transport::redact_url(url)
            );
            continue;
        }
        if !usable.iter().any(|u| u == url) {
            usable.push(url.to_string());
        }
    }
    usable
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.rpc.rate_limit_rps, 2);
        assert_eq!(settings.scan.lookback_days, 14);
        assert_eq!(settings.scan.approx_block_interval_seconds, 2.2);
        assert_eq!(settings.scan.lookback(), Duration::from_secs(14 * 86_400));
        assert!(settings.matcher.addresses.is_empty());
    }

    #[test]
    fn test_parse_string_list_formats() {
        assert_eq!(
            parse_string_list("https://a.org, https://b.org ,").unwrap(),
            vec!["https://a.org", "https://b.org"]
        );
        assert_eq!(
            parse_string_list(r#"["https://a.org","https://b.org"]"#).unwrap(),
            vec!["https://a.org", "https://b.org"]
        );
        assert_eq!(
            parse_string_list("[https://a.org,https://b.org]").unwrap(),
            vec!["https://a.org", "https://b.org"]
        );
        assert!(parse_string_list("   ").unwrap().is_empty());
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder_url("https://mainnet.infura.io/v3/<key>"));
        assert!(is_placeholder_url("https://arb-mainnet.g.alchemy.com/v2/YOUR-KEY"));
        assert!(is_placeholder_url("https://rpc.example.org/your_api_key"));
        assert!(is_placeholder_url("https://rpc.example.org/xxxxxxxx"));
        assert!(!is_placeholder_url("https://arb1.arbitrum.io/rpc"));
    }

    #[test]
    fn test_usable_endpoint_urls_filters_and_dedups() {
        let urls = vec![
            " https://a.org ".to_string(),
            "".to_string(),
            "https://b.org/<key>".to_string(),
            "https://a.org".to_string(),
            "https://c.org".to_string(),
        ];
        assert_eq!(usable_endpoint_urls(&urls), vec!["https://a.org", "https://c.org"]);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_overrides(lookup_from(&[
            (ENV_RPC_URLS, "https://a.org,https://b.org"),
            (ENV_RPC_RATE_LIMIT, "0"),
            (ENV_LOOKBACK_DAYS, "3"),
            (ENV_BLOCK_INTERVAL_SECONDS, "12"),
            (ENV_ADDRESSES, "0xAbC0000000000000000000000000000000000001"),
            (ENV_REQUIRED_EVENTS, "Deposit,Withdraw"),
        ]));

        assert_eq!(settings.rpc.http_urls, vec!["https://a.org", "https://b.org"]);
        assert_eq!(settings.rpc.rate_limit_rps, 1);
        assert_eq!(settings.scan.lookback_days, 3);
        assert_eq!(settings.scan.approx_block_interval_seconds, 12.0);
        assert_eq!(
            settings.matcher.addresses,
            vec!["0xabc0000000000000000000000000000000000001"]
        );
        assert_eq!(settings.matcher.required_events, vec!["Deposit", "Withdraw"]);
    }

    #[test]
    fn test_malformed_overrides_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(lookup_from(&[
            (ENV_RPC_RATE_LIMIT, "fast"),
            (ENV_BLOCK_INTERVAL_SECONDS, "-1"),
            (ENV_RPC_URLS, ""),
        ]));
        assert_eq!(settings.rpc.rate_limit_rps, 2);
        assert_eq!(settings.scan.approx_block_interval_seconds, 2.2);
        assert!(settings.rpc.http_urls.is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[rpc]
http_urls = ["https://a.org"]
rate_limit_rps = 5

[scan]
lookback_days = 7

[matcher]
required_events = ["Transfer"]
"#
        )
        .unwrap();

        let settings = Settings::from_file_with(file.path(), |_| None).unwrap();
        assert_eq!(settings.rpc.http_urls, vec!["https://a.org"]);
        assert_eq!(settings.rpc.rate_limit_rps, 5);
        assert_eq!(settings.rpc.request_timeout_ms, 10_000);
        assert_eq!(settings.scan.lookback_days, 7);
        assert_eq!(settings.scan.approx_block_interval_seconds, 2.2);
        assert_eq!(settings.matcher.required_events, vec!["Transfer"]);

        let settings = Settings::from_file_with(
            file.path(),
            lookup_from(&[(ENV_RPC_TIMEOUT_MS, "2500"), (ENV_LOOKBACK_DAYS, "1")]),
        )
        .unwrap();
        assert_eq!(settings.rpc.request_timeout_ms, 2_500);
        assert_eq!(settings.scan.lookback_days, 1);
        assert_eq!(settings.rpc.rate_limit_rps, 5);
    }
}
