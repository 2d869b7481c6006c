//! Core data structures
//!
//! Pool identity, versioned pool state, opportunities and chain headers.
//! Pools are keyed by their on-chain address only; `label` and `dex` exist for
//! logging and router resolution and never participate in keying.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Address-keyed pools, versioned state, speculative opportunities

use alloy::primitives::{Address, TxHash, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// AMM pricing variants we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexVariant {
    /// Reserve-ratio pools (Uniswap V2 and forks)
    ConstantProduct,
    /// Tick-and-liquidity pools (Uniswap V3 and forks)
    ConcentratedLiquidity,
}

impl fmt::Display for DexVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DexVariant::ConstantProduct => write!(f, "CP"),
            DexVariant::ConcentratedLiquidity => write!(f, "CL"),
        }
    }
}

/// Immutable pool identity, registered once at startup from the whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub address: Address,
    pub variant: DexVariant,
    pub token0: Address,
    pub token1: Address,
    /// Fee in pips (hundredths of a bip): 500 = 0.05%, 3000 = 0.30%
    pub fee: u32,
    /// Tick spacing (ConcentratedLiquidity only, 0 otherwise)
    pub tick_spacing: i32,
    /// DEX name, used to resolve router calls to pools
    pub dex: String,
    /// Human-readable label such as "WETH/USDC". Never a key.
    pub label: String,
}

impl Pool {
    /// True if the pool trades `token`
    pub fn has_token(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }

    /// The other side of the pool, or None if `token` isn't in it
    pub fn other_token(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    /// Fee as a percentage (for logging)
    pub fn fee_percent(&self) -> f64 {
        self.fee as f64 / 10_000.0
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{} {} {:.2}%]@{}",
            self.label,
            self.dex,
            self.variant,
            self.fee_percent(),
            self.address
        )
    }
}

/// Monotonically comparable version of a pool state.
///
/// Ordered by (block_number, log_index). A state read over RPC at block N is
/// stamped `(N, u64::MAX)` so logs from block N it already reflects are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionToken {
    pub block_number: u64,
    pub log_index: u64,
}

impl VersionToken {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// Version for a full state read at the end of `block_number`
    pub fn snapshot_at(block_number: u64) -> Self {
        Self {
            block_number,
            log_index: u64::MAX,
        }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.log_index == u64::MAX {
            write!(f, "{}:end", self.block_number)
        } else {
            write!(f, "{}:{}", self.block_number, self.log_index)
        }
    }
}

/// Concentrated-liquidity state (sqrtPriceX96 / tick / in-range liquidity)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcentratedState {
    /// sqrt(price) as a Q64.96 fixed point number
    pub sqrt_price_x96: U256,
    /// Current in-range liquidity
    pub liquidity: u128,
    /// Current tick
    pub tick: i32,
    /// Fee in pips
    pub fee: u32,
    /// Initialized ticks → liquidityNet
    pub ticks: BTreeMap<i32, i128>,
    /// Inclusive range of ticks whose initialization status is known.
    /// Swaps that would step outside it are not quoted.
    pub tick_window: (i32, i32),
}

/// Mutable, versioned pool payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolState {
    ConstantProduct { reserve0: U256, reserve1: U256 },
    ConcentratedLiquidity(ConcentratedState),
}

impl PoolState {
    pub fn variant(&self) -> DexVariant {
        match self {
            PoolState::ConstantProduct { .. } => DexVariant::ConstantProduct,
            PoolState::ConcentratedLiquidity(_) => DexVariant::ConcentratedLiquidity,
        }
    }

    /// Raw price of token0 in token1 units (no decimal adjustment). Logging only.
    pub fn raw_price(&self) -> f64 {
        match self {
            PoolState::ConstantProduct { reserve0, reserve1 } => {
                let r0 = u256_to_f64(*reserve0);
                if r0 == 0.0 {
                    return 0.0;
                }
                u256_to_f64(*reserve1) / r0
            }
            PoolState::ConcentratedLiquidity(cl) => {
                let sqrt = u256_to_f64(cl.sqrt_price_x96) / 2f64.powi(96);
                sqrt * sqrt
            }
        }
    }
}

/// Identity + state + version read atomically from one pool cell
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pool: Arc<Pool>,
    pub state: PoolState,
    pub version: VersionToken,
}

/// One leg of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hop {
    pub pool: Address,
    pub variant: DexVariant,
    pub token_in: Address,
    pub token_out: Address,
}

/// Which state an opportunity was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunitySource {
    Confirmed,
    Speculative,
}

impl fmt::Display for OpportunitySource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpportunitySource::Confirmed => write!(f, "confirmed"),
            OpportunitySource::Speculative => write!(f, "speculative"),
        }
    }
}

/// The pending transaction a speculative opportunity depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
    pub tx_hash: TxHash,
    /// Shadowed pool the trigger moves
    pub pool: Address,
    /// When the shadow entry (and thus the opportunity) expires
    pub expires_at: Instant,
}

/// Route identity used for at-most-one in-flight submission
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub pools: Vec<Address>,
    pub source: OpportunitySource,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pools: Vec<String> = self.pools.iter().map(|p| short_addr(p)).collect();
        write!(f, "{}:{}", self.source, pools.join(">"))
    }
}

/// Arbitrage opportunity detected in one cycle
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub hops: Vec<Hop>,
    /// Quote token the route starts and ends in
    pub quote_token: Address,
    pub amount_in: U256,
    pub expected_out: U256,
    /// (out - in) / in, in basis points, before gas
    pub gross_spread_bps: i64,
    /// Gas cost converted to quote-token units
    pub gas_cost_quote: U256,
    /// expected_out - amount_in - gas_cost_quote
    pub net_profit: U256,
    /// Estimated time from detection to submission
    pub estimated_latency: Duration,
    pub source: OpportunitySource,
    pub trigger: Option<TriggerInfo>,
    pub detected_at: Instant,
}

impl Opportunity {
    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            pools: self.hops.iter().map(|h| h.pool).collect(),
            source: self.source,
        }
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Speculative opportunities die with their shadow entry
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match &self.trigger {
            Some(trigger) => now >= trigger.expires_at,
            None => false,
        }
    }

    /// Minimum acceptable output (input + required profit)
    pub fn min_amount_out(&self, min_profit: U256) -> U256 {
        self.amount_in.saturating_add(min_profit)
    }
}

/// Latest known block header fields the engine needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub number: u64,
    pub base_fee_per_gas: u128,
    pub timestamp: u64,
}

/// Convert U256 to f64 (lossy, for logging/prices only)
pub fn u256_to_f64(value: U256) -> f64 {
    let limbs = value.as_limbs();
    let mut out = 0.0f64;
    for (i, limb) in limbs.iter().enumerate() {
        out += (*limb as f64) * 2f64.powi(64 * i as i32);
    }
    out
}

/// Raw token amount → human-readable Decimal (precision is dropped when the
/// raw value exceeds Decimal's 96-bit mantissa)
pub fn to_decimal(amount: U256, decimals: u8) -> Decimal {
    let mut value = amount;
    let mut scale = decimals as u32;
    let mantissa_max = U256::from(1u128 << 96);
    let ten = U256::from(10u8);

    while value >= mantissa_max && scale > 0 {
        value /= ten;
        scale -= 1;
    }
    if value >= mantissa_max {
        return Decimal::MAX;
    }
    while scale > 28 {
        value /= ten;
        scale -= 1;
    }

    let raw = value.to::<u128>() as i128;
    Decimal::from_i128_with_scale(raw, scale)
}

/// Human-readable Decimal → raw token amount (truncates below one unit).
/// `None` for negative or oversized values.
pub fn from_decimal(value: Decimal, decimals: u8) -> Option<U256> {
    if value.is_sign_negative() {
        return None;
    }
    let mut raw = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    let decimals = decimals as u32;
    let ten = U256::from(10u8);
    if decimals >= scale {
        raw = raw.checked_mul(ten.checked_pow(U256::from(decimals - scale))?)?;
    } else {
        raw /= ten.pow(U256::from(scale - decimals));
    }
    Some(raw)
}

/// Shortened address for compact log lines
pub fn short_addr(address: &Address) -> String {
    let full = format!("{:x}", address);
    format!("0x{}..{}", &full[..4], &full[full.len() - 4..])
}
