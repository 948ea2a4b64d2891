use anyhow::{Context, Result};
use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::cutover::{BASE_MAINNET, BASE_MAINNET_CUTOVER, BASE_SEPOLIA, BASE_SEPOLIA_CUTOVER};
use crate::retry::RetryPolicy;

/// Env vars for the four-endpoint RPC failover list, in priority order.
const BASE_RPC_URL_VARS: [&str; 4] = [
    "PONDER_RPC_URL_BASE_1",
    "PONDER_RPC_URL_BASE_2",
    "PONDER_RPC_URL_BASE_3",
    "PONDER_RPC_URL_BASE_4",
];

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default)]
    pub http_urls: Vec<String>,
    /// Requests per second allowed against each endpoint.
    #[serde(default = "default_qps_limit")]
    pub qps_limit: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_qps_limit() -> u32 {
    25
}
fn default_max_concurrency() -> usize {
    8
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_urls: Vec::new(),
            qps_limit: default_qps_limit(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chain {
    pub chain_id: u64,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            chain_id: BASE_MAINNET,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Contracts {
    #[serde(default = "default_plant_nft")]
    pub plant_nft: String,
    #[serde(default = "default_multicall")]
    pub multicall: String,
}

fn default_plant_nft() -> String {
    "0xeb4e16c804AE9275a655AbBc20cD0658A91F9235".to_string()
}
fn default_multicall() -> String {
    // Multicall3, same address on every EVM chain
    "0xcA11bde05977b3631167028862bE2a173976CA11".to_string()
}

impl Default for Contracts {
    fn default() -> Self {
        Self {
            plant_nft: default_plant_nft(),
            multicall: default_multicall(),
        }
    }
}

impl Contracts {
    pub fn plant_nft_address(&self) -> Result<Address> {
        self.plant_nft
            .trim()
            .parse()
            .with_context(|| format!("invalid contracts.plant_nft address {:?}", self.plant_nft))
    }

    pub fn multicall_address(&self) -> Result<Address> {
        self.multicall
            .trim()
            .parse()
            .with_context(|| format!("invalid contracts.multicall address {:?}", self.multicall))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NameResolver {
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
    #[serde(default = "default_multicall_batch_size")]
    pub multicall_batch_size: usize,
}

fn default_cache_ttl_seconds() -> u64 {
    300 // 5 minutes
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_retry_jitter_ms() -> u64 {
    1000
}
fn default_multicall_batch_size() -> usize {
    100
}

impl Default for NameResolver {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl_seconds(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            multicall_batch_size: default_multicall_batch_size(),
        }
    }
}

impl NameResolver {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_jitter_ms),
        )
    }
}

/// Cutover heights keyed by chain id (as a string, since TOML keys are strings).
#[derive(Debug, Deserialize, Clone)]
pub struct Cutovers {
    #[serde(default = "default_cutover_block")]
    pub default_block: Option<u64>,
    #[serde(default = "default_cutover_networks")]
    pub networks: HashMap<String, u64>,
}

fn default_cutover_block() -> Option<u64> {
    Some(BASE_SEPOLIA_CUTOVER)
}
fn default_cutover_networks() -> HashMap<String, u64> {
    HashMap::from([
        (BASE_MAINNET.to_string(), BASE_MAINNET_CUTOVER),
        (BASE_SEPOLIA.to_string(), BASE_SEPOLIA_CUTOVER),
    ])
}

impl Default for Cutovers {
    fn default() -> Self {
        Self {
            default_block: default_cutover_block(),
            networks: default_cutover_networks(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metrics {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9000
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub chain: Chain,
    #[serde(default)]
    pub contracts: Contracts,
    #[serde(default)]
    pub name_resolver: NameResolver,
    #[serde(default)]
    pub cutovers: Cutovers,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub metrics: Metrics,
}

impl Settings {
    /// Loads `Config.toml` from the working directory and applies env overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;
        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    /// Parses settings from an in-memory TOML document (no env overrides).
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("INDEXER_RPC_HTTP_URLS") {
            if let Some(list) = parse_string_list(&raw) {
                if !list.is_empty() {
                    self.rpc.http_urls = list;
                }
            }
        }

        let failover: Vec<String> = BASE_RPC_URL_VARS
            .iter()
            .filter_map(|var| lookup(var))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if !failover.is_empty() {
            self.rpc.http_urls = failover;
        }

        if let Some(raw) = lookup("INDEXER_CHAIN_ID") {
            match raw.trim().parse() {
                Ok(chain_id) => self.chain.chain_id = chain_id,
                Err(e) => eprintln!("Failed to parse INDEXER_CHAIN_ID={:?}: {}", raw, e),
            }
        }
    }

    /// Startup checks; failing here is preferable to degrading every lookup.
    pub fn validate(&self) -> Result<()> {
        if self.rpc.http_urls.is_empty() {
            anyhow::bail!("no RPC endpoints configured (rpc.http_urls or PONDER_RPC_URL_BASE_1..4)");
        }
        if self.rpc.qps_limit == 0 {
            anyhow::bail!("rpc.qps_limit must be non-zero");
        }
        if self.name_resolver.cache_ttl_seconds == 0 {
            anyhow::bail!("name_resolver.cache_ttl_seconds must be non-zero");
        }
        self.contracts.plant_nft_address()?;
        self.contracts.multicall_address()?;
        Ok(())
    }
}

fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
        // Bracketed but not valid JSON, e.g. [http://a, http://b]
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']');
        return Some(split_list(without_brackets));
    }

    Some(split_list(trimmed))
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
