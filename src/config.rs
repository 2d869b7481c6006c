//! Configuration management
//!
//! Engine settings from a TOML file; secrets and RPC overrides from .env.
//! Every tuning value (thresholds, trade sizes, fees, TTLs, backoff) lives
//! here, never as a constant in the pipeline.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-04 - TOML EngineConfig replaces env-only BotConfig

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::arbitrage::detector::ProfitThreshold;
use crate::arbitrage::executor::SpeculativeMode;
use crate::mempool::MempoolMode;

/// Top-level TOML configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub network: NetworkConfig,
    pub detection: DetectionConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    pub quote_tokens: Vec<QuoteTokenConfig>,
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// ws:// or wss:// URL, or a path to the node's IPC socket
    pub rpc_url: String,
    pub chain_id: u64,
    /// Deployed route executor contract
    pub executor_contract: Address,
    /// Wrapped native token, used to price gas in quote units
    pub wrapped_native: Address,
    /// Bitmap words fetched each side of the current word for CL pools
    #[serde(default = "default_bitmap_radius")]
    pub bitmap_radius: u8,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_bitmap_radius() -> u8 { 2 }
fn default_stats_interval() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_gas_per_swap")]
    pub gas_per_swap: u64,
    #[serde(default = "default_gas_overhead")]
    pub gas_overhead: u64,
    #[serde(default = "default_base_latency")]
    pub base_latency_ms: u64,
    #[serde(default = "default_per_hop_latency")]
    pub per_hop_latency_ms: u64,
    pub confirmed: ProfitThreshold,
    pub speculative: ProfitThreshold,
}

fn default_max_hops() -> usize { 2 }
fn default_gas_per_swap() -> u64 { 150_000 }
fn default_gas_overhead() -> u64 { 60_000 }
fn default_base_latency() -> u64 { 40 }
fn default_per_hop_latency() -> u64 { 5 }

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub priority_fee_wei: u64,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_skip_sim_gas_ceiling")]
    pub skip_sim_gas_ceiling: u64,
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
    /// Receipt and trigger polling interval
    #[serde(default = "default_receipt_poll")]
    pub receipt_poll_ms: u64,
    #[serde(default)]
    pub speculative_mode: SpeculativeMode,
    #[serde(default = "default_cooldown_initial")]
    pub cooldown_initial_blocks: u64,
    #[serde(default = "default_cooldown_max")]
    pub cooldown_max_blocks: u64,
    /// Cap cycles with zero successes before a route is blacklisted (0 = never)
    #[serde(default = "default_cooldown_max_strikes")]
    pub cooldown_max_strikes: u32,
    /// Dry-run only, never broadcast
    #[serde(default)]
    pub dry_run: bool,
}

fn default_gas_limit() -> u64 { 600_000 }
fn default_skip_sim_gas_ceiling() -> u64 { 400_000 }
fn default_receipt_timeout() -> u64 { 30 }
fn default_receipt_poll() -> u64 { 250 }
fn default_cooldown_initial() -> u64 { 10 }
fn default_cooldown_max() -> u64 { 1800 }
fn default_cooldown_max_strikes() -> u32 { 3 }

#[derive(Debug, Clone, Deserialize)]
pub struct MempoolConfig {
    #[serde(default)]
    pub mode: MempoolMode,
    /// Expected confirmation time; shadow entry lifetime
    #[serde(default = "default_shadow_ttl")]
    pub shadow_ttl_ms: u64,
}

fn default_shadow_ttl() -> u64 { 2_500 }

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            mode: MempoolMode::default(),
            shadow_ttl_ms: default_shadow_ttl(),
        }
    }
}

impl MempoolConfig {
    pub fn shadow_ttl(&self) -> Duration {
        Duration::from_millis(self.shadow_ttl_ms)
    }
}

/// A token routes start and end in
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteTokenConfig {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// Input sizes tried per route, in human units
    pub trade_sizes: Vec<Decimal>,
    /// Price of one native token in this quote token, used when no
    /// wrapped-native pool can price gas
    #[serde(default)]
    pub native_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub address: Address,
    /// Must match the `dex` field of whitelisted pools it routes through
    pub dex: String,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RPC_URL` from the environment (.env is loaded by the caller)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RPC_URL") {
            if !url.is_empty() {
                self.network.rpc_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.chain_id == 0 {
            bail!("network.chain_id must be non-zero");
        }
        if !(2..=3).contains(&self.detection.max_hops) {
            bail!("detection.max_hops must be 2 or 3, got {}", self.detection.max_hops);
        }
        for (name, t) in [("confirmed", &self.detection.confirmed), ("speculative", &self.detection.speculative)] {
            if t.min_profit_abs.is_sign_negative() {
                bail!("detection.{}.min_profit_abs must not be negative", name);
            }
        }
        if self.quote_tokens.is_empty() {
            bail!("at least one [[quote_tokens]] entry is required");
        }
        let mut seen = HashSet::new();
        for q in &self.quote_tokens {
            if !seen.insert(q.address) {
                bail!("quote token {} listed twice", q.symbol);
            }
            if q.trade_sizes.is_empty() || q.trade_sizes.iter().any(|s| s <= &Decimal::ZERO) {
                bail!("quote token {}: trade_sizes must be non-empty and positive", q.symbol);
            }
        }
        if self.execution.skip_sim_gas_ceiling > self.execution.gas_limit {
            bail!("execution.skip_sim_gas_ceiling exceeds execution.gas_limit");
        }
        if self.mempool.mode.is_active() && self.routers.is_empty() {
            bail!("mempool.mode is {:?} but no [[routers]] are configured", self.mempool.mode);
        }
        Ok(())
    }

    /// Router address → dex name
    pub fn router_table(&self) -> HashMap<Address, String> {
        self.routers.iter().map(|r| (r.address, r.dex.clone())).collect()
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.receipt_timeout_secs)
    }
}

/// Read the signing key from the environment
pub fn load_private_key() -> Result<String> {
    dotenv::dotenv().ok();
    std::env::var("PRIVATE_KEY").context("PRIVATE_KEY not set")
}
