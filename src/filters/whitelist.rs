//! Static Pool Whitelist/Blacklist
//!
//! The pool universe for one run, loaded from JSON at startup. Only pools
//! with status "active" that survive the blacklist (pool address, fee tier,
//! pair) are registered; everything else never enters state or detection.
//!
//! Config file: config/pools_whitelist.json
//!
//! Created: 2026-01-29
//! Modified: 2026-02-04 - Whitelist entries carry full pool identity (variant, tokens, tick spacing)

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::types::{DexVariant, Pool};

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PoolWhitelist {
    pub version: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    pub whitelist: WhitelistSection,
    #[serde(default)]
    pub blacklist: BlacklistSection,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WhitelistSection {
    pub pools: Vec<WhitelistPool>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    #[default]
    Active,
    /// Kept in the file for reference, never registered
    Disabled,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WhitelistPool {
    pub address: String,
    /// Label such as "WETH/USDC"
    pub pair: String,
    pub dex: String,
    pub variant: DexVariant,
    pub token0: String,
    pub token1: String,
    /// Fee in pips
    pub fee_tier: u32,
    #[serde(default)]
    pub tick_spacing: i32,
    #[serde(default)]
    pub status: PoolStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct BlacklistSection {
    #[serde(default)]
    pub pools: Vec<BlacklistPool>,
    #[serde(default)]
    pub fee_tiers: Vec<BlacklistTier>,
    #[serde(default)]
    pub pairs: Vec<BlacklistPair>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlacklistPool {
    pub address: String,
    pub reason: String,
    #[serde(default)]
    pub date_added: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlacklistTier {
    pub tier: u32,
    pub reason: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlacklistPair {
    pub pair: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Parsed whitelist plus precomputed blacklist lookups
pub struct WhitelistFilter {
    pools: Vec<Pool>,
    disabled: usize,
    blacklisted_addrs: HashSet<Address>,
    blacklisted_tiers: HashSet<u32>,
    /// Uppercased pair labels
    blacklisted_pairs: HashSet<String>,
    pub raw: PoolWhitelist,
}

impl WhitelistFilter {
    /// Load from a JSON file path. A missing or malformed file aborts startup.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read whitelist file: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid whitelist: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: PoolWhitelist = serde_json::from_str(content).context("Failed to parse whitelist JSON")?;
        Self::from_config(raw)
    }

    /// Build from an already-parsed config. Every entry, active or not, must
    /// parse; addresses must be unique across the whitelist.
    pub fn from_config(raw: PoolWhitelist) -> Result<Self> {
        let blacklisted_addrs = raw
            .blacklist
            .pools
            .iter()
            .map(|p| parse_addr(&p.address).with_context(|| format!("blacklist entry {}", p.address)))
            .collect::<Result<HashSet<_>>>()?;
        let blacklisted_tiers: HashSet<u32> = raw.blacklist.fee_tiers.iter().map(|t| t.tier).collect();
        let blacklisted_pairs: HashSet<String> = raw.blacklist.pairs.iter().map(|p| p.pair.to_uppercase()).collect();

        let mut filter = Self {
            pools: Vec::new(),
            disabled: 0,
            blacklisted_addrs,
            blacklisted_tiers,
            blacklisted_pairs,
            raw: PoolWhitelist {
                version: String::new(),
                last_updated: None,
                whitelist: WhitelistSection { pools: Vec::new() },
                blacklist: BlacklistSection::default(),
            },
        };

        let mut seen = HashSet::new();
        for entry in &raw.whitelist.pools {
            let pool = to_pool(entry).with_context(|| format!("whitelist entry {} ({})", entry.address, entry.pair))?;
            if !seen.insert(pool.address) {
                bail!("duplicate whitelist address {}", pool.address);
            }
            if entry.status == PoolStatus::Disabled {
                filter.disabled += 1;
                continue;
            }
            if filter.is_pool_allowed(&pool.address, pool.fee, &pool.label) {
                filter.pools.push(pool);
            }
        }

        info!(
            "Whitelist v{} loaded: {} active pools, {} disabled, {} blacklisted pools, {} blacklisted tiers",
            raw.version,
            filter.pools.len(),
            filter.disabled,
            filter.blacklisted_addrs.len(),
            filter.blacklisted_tiers.len(),
        );
        if filter.pools.is_empty() {
            warn!("Whitelist has no active pools");
        }
        filter.raw = raw;
        Ok(filter)
    }

    /// Is this pool allowed to participate in detection?
    pub fn is_pool_allowed(&self, address: &Address, fee_tier: u32, pair: &str) -> bool {
        if self.blacklisted_tiers.contains(&fee_tier) {
            debug!("Whitelist: {} rejected, fee tier {} blacklisted", address, fee_tier);
            return false;
        }
        if self.blacklisted_addrs.contains(address) {
            debug!("Whitelist: {} rejected, pool blacklisted", address);
            return false;
        }
        if self.blacklisted_pairs.contains(&pair.to_uppercase()) {
            debug!("Whitelist: {} rejected, pair {} blacklisted", address, pair);
            return false;
        }
        true
    }

    /// Active, non-blacklisted pools in file order
    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn into_pools(self) -> Vec<Pool> {
        self.pools
    }

    pub fn active_pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn disabled_pool_count(&self) -> usize {
        self.disabled
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_addr(s: &str) -> Result<Address> {
    s.trim()
        .parse::<Address>()
        .with_context(|| format!("bad address {:?}", s))
}

fn to_pool(entry: &WhitelistPool) -> Result<Pool> {
    let token0 = parse_addr(&entry.token0)?;
    let token1 = parse_addr(&entry.token1)?;
    if token0 == token1 {
        bail!("token0 and token1 are both {}", token0);
    }
    let tick_spacing = match entry.variant {
        DexVariant::ConcentratedLiquidity if entry.tick_spacing <= 0 => {
            bail!("concentrated pool needs a positive tick_spacing")
        }
        DexVariant::ConcentratedLiquidity => entry.tick_spacing,
        DexVariant::ConstantProduct => 0,
    };
    Ok(Pool {
        address: parse_addr(&entry.address)?,
        variant: entry.variant,
        token0,
        token1,
        fee: entry.fee_tier,
        tick_spacing,
        dex: entry.dex.clone(),
        label: entry.pair.clone(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const JSON: &str = r#"{
        "version": "2.0",
        "last_updated": "2026-02-04T00:00:00Z",
        "whitelist": {
            "pools": [
                {
                    "address": "0x45dda9cb7c25131df268515131f647d726f50608",
                    "pair": "WETH/USDC",
                    "dex": "UniswapV3",
                    "variant": "concentrated_liquidity",
                    "token0": "0x2791bca1f2de4661ed88a30c99a7a9449aa84174",
                    "token1": "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619",
                    "fee_tier": 500,
                    "tick_spacing": 10,
                    "status": "active"
                },
                {
                    "address": "0x853ee4b2a13f8a742d64c8f088be7ba2131f670d",
                    "pair": "WETH/USDC",
                    "dex": "QuickSwapV2",
                    "variant": "constant_product",
                    "token0": "0x2791bca1f2de4661ed88a30c99a7a9449aa84174",
                    "token1": "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619",
                    "fee_tier": 3000
                },
                {
                    "address": "0x0e44ceb592acfc5d3f09d996302eb4c499ff8c10",
                    "pair": "WETH/USDC",
                    "dex": "UniswapV3",
                    "variant": "concentrated_liquidity",
                    "token0": "0x2791bca1f2de4661ed88a30c99a7a9449aa84174",
                    "token1": "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619",
                    "fee_tier": 3000,
                    "tick_spacing": 60,
                    "status": "disabled"
                },
                {
                    "address": "0x04537f43f6add7b1b60cab199c7a910024ee0594",
                    "pair": "WETH/USDC",
                    "dex": "UniswapV3",
                    "variant": "concentrated_liquidity",
                    "token0": "0x2791bca1f2de4661ed88a30c99a7a9449aa84174",
                    "token1": "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619",
                    "fee_tier": 100,
                    "tick_spacing": 1
                },
                {
                    "address": "0x86f1d8390222a3691c28938ec7404a1661e618e0",
                    "pair": "WMATIC/WETH",
                    "dex": "UniswapV3",
                    "variant": "concentrated_liquidity",
                    "token0": "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270",
                    "token1": "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619",
                    "fee_tier": 10000,
                    "tick_spacing": 200
                }
            ]
        },
        "blacklist": {
            "pools": [
                { "address": "0x04537f43f6add7b1b60cab199c7a910024ee0594", "reason": "Phantom liquidity" }
            ],
            "fee_tiers": [
                { "tier": 10000, "reason": "Thin books" }
            ]
        }
    }"#;

    #[test]
    fn test_only_active_unblacklisted_pools() {
        let f = WhitelistFilter::from_json(JSON).unwrap();
        let addrs: Vec<Address> = f.pools().iter().map(|p| p.address).collect();
        assert_eq!(
            addrs,
            vec![
                address!("45dda9cb7c25131df268515131f647d726f50608"),
                address!("853ee4b2a13f8a742d64c8f088be7ba2131f670d"),
            ]
        );
        assert_eq!(f.disabled_pool_count(), 1);

        let cp = &f.pools()[1];
        assert_eq!(cp.variant, DexVariant::ConstantProduct);
        assert_eq!(cp.tick_spacing, 0);
        assert_eq!(cp.dex, "QuickSwapV2");
    }

    #[test]
    fn test_blacklist_checks() {
        let f = WhitelistFilter::from_json(JSON).unwrap();
        let addr = address!("0000000000000000000000000000000000000001");
        assert!(!f.is_pool_allowed(&addr, 10000, "TEST/USDC"));
        assert!(!f.is_pool_allowed(&address!("04537f43f6add7b1b60cab199c7a910024ee0594"), 100, "WETH/USDC"));
        assert!(f.is_pool_allowed(&addr, 500, "TEST/USDC"));
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let mut raw: PoolWhitelist = serde_json::from_str(JSON).unwrap();
        let dup = raw.whitelist.pools[0].clone();
        raw.whitelist.pools.push(dup);
        let err = WhitelistFilter::from_config(raw).err().unwrap();
        assert!(format!("{:#}", err).contains("duplicate whitelist address"));
    }

    #[test]
    fn test_bad_entries_rejected() {
        let mut raw: PoolWhitelist = serde_json::from_str(JSON).unwrap();
        raw.whitelist.pools[0].token0 = "0xnothex".into();
        assert!(WhitelistFilter::from_config(raw).is_err());

        let mut raw: PoolWhitelist = serde_json::from_str(JSON).unwrap();
        raw.whitelist.pools[0].tick_spacing = 0;
        assert!(WhitelistFilter::from_config(raw).is_err());

        assert!(WhitelistFilter::from_json("{}").is_err());
    }
}
