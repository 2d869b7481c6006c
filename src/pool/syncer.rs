//! Pool Synchronization
//!
//! Keeps canonical pool state in step with the chain:
//! - Initial sync: every whitelisted pool is read over RPC at one pinned block
//!   and registered with version `(block, end)`.
//!   ConstantProduct: getReserves. ConcentratedLiquidity: slot0, liquidity, and
//!   the tick bitmap words around the current tick with each initialized tick's
//!   liquidityNet.
//! - Ongoing: pool logs (V2 Sync, V3 Swap/Mint/Burn) are decoded into
//!   `PoolLogEvent`s and applied through the manager's version check.
//!
//! Created: 2026-01-28
//! Modified: 2026-02-01 - Migrated from ethers-rs to alloy
//! Modified: 2026-02-03 - Pinned-block initial sync, tick bitmap window, log-driven updates

use alloy::eips::BlockId;
use alloy::primitives::aliases::I24;
use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::state::{PoolStateManager, UpdateOutcome};
use super::v3_math::{self, MAX_TICK, MIN_TICK};
use crate::contracts::{IUniswapV2Pair, UniswapV3Pool};
use crate::types::{ConcentratedState, DexVariant, Pool, PoolState, VersionToken};

/// Canonical pool event decoded from a log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// V2 reserves after the block's last transfer into the pair
    Sync { reserve0: U256, reserve1: U256 },
    /// V3 post-swap price, in-range liquidity and tick
    Swap { sqrt_price_x96: U256, liquidity: u128, tick: i32 },
    Mint { tick_lower: i32, tick_upper: i32, amount: u128 },
    Burn { tick_lower: i32, tick_upper: i32, amount: u128 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLogEvent {
    pub pool: Address,
    pub version: VersionToken,
    pub tx_hash: Option<TxHash>,
    pub event: PoolEvent,
}

/// topic0 of every log the engine subscribes to
pub fn pool_event_topics() -> Vec<B256> {
    vec![
        IUniswapV2Pair::Sync::SIGNATURE_HASH,
        UniswapV3Pool::Swap::SIGNATURE_HASH,
        UniswapV3Pool::Mint::SIGNATURE_HASH,
        UniswapV3Pool::Burn::SIGNATURE_HASH,
    ]
}

/// Decode a subscribed log. Removed (reorged) logs and logs without a block
/// position are ignored.
pub fn decode_pool_log(log: &Log) -> Option<PoolLogEvent> {
    if log.removed {
        return None;
    }
    let version = VersionToken::new(log.block_number?, log.log_index?);
    let topic0 = *log.topic0()?;
    let data = &log.inner.data;

    let event = if topic0 == IUniswapV2Pair::Sync::SIGNATURE_HASH {
        let ev = IUniswapV2Pair::Sync::decode_log_data(data).ok()?;
        PoolEvent::Sync {
            reserve0: U256::from(ev.reserve0),
            reserve1: U256::from(ev.reserve1),
        }
    } else if topic0 == UniswapV3Pool::Swap::SIGNATURE_HASH {
        let ev = UniswapV3Pool::Swap::decode_log_data(data).ok()?;
        PoolEvent::Swap {
            sqrt_price_x96: U256::from(ev.sqrtPriceX96),
            liquidity: ev.liquidity,
            tick: i32::try_from(ev.tick).ok()?,
        }
    } else if topic0 == UniswapV3Pool::Mint::SIGNATURE_HASH {
        let ev = UniswapV3Pool::Mint::decode_log_data(data).ok()?;
        PoolEvent::Mint {
            tick_lower: i32::try_from(ev.tickLower).ok()?,
            tick_upper: i32::try_from(ev.tickUpper).ok()?,
            amount: ev.amount,
        }
    } else if topic0 == UniswapV3Pool::Burn::SIGNATURE_HASH {
        let ev = UniswapV3Pool::Burn::decode_log_data(data).ok()?;
        PoolEvent::Burn {
            tick_lower: i32::try_from(ev.tickLower).ok()?,
            tick_upper: i32::try_from(ev.tickUpper).ok()?,
            amount: ev.amount,
        }
    } else {
        return None;
    };

    Some(PoolLogEvent {
        pool: log.inner.address,
        version,
        tx_hash: log.transaction_hash,
        event,
    })
}

/// Apply a decoded log to canonical state through the version check
pub fn apply_pool_event(manager: &PoolStateManager, ev: &PoolLogEvent) -> UpdateOutcome {
    let outcome = match &ev.event {
        PoolEvent::Sync { reserve0, reserve1 } => manager.update(
            &ev.pool,
            PoolState::ConstantProduct {
                reserve0: *reserve0,
                reserve1: *reserve1,
            },
            ev.version,
        ),
        PoolEvent::Swap {
            sqrt_price_x96,
            liquidity,
            tick,
        } => manager.update_with(&ev.pool, ev.version, |current| match current {
            PoolState::ConcentratedLiquidity(cl) => {
                let mut next = cl.clone();
                next.sqrt_price_x96 = *sqrt_price_x96;
                next.liquidity = *liquidity;
                next.tick = *tick;
                Some(PoolState::ConcentratedLiquidity(next))
            }
            PoolState::ConstantProduct { .. } => None,
        }),
        PoolEvent::Mint {
            tick_lower,
            tick_upper,
            amount,
        } => apply_position_change(manager, ev, *tick_lower, *tick_upper, i128::try_from(*amount).ok()),
        PoolEvent::Burn {
            tick_lower,
            tick_upper,
            amount,
        } => apply_position_change(
            manager,
            ev,
            *tick_lower,
            *tick_upper,
            i128::try_from(*amount).ok().map(|a| -a),
        ),
    };

    trace!("Pool log {} at {}: {:?}", ev.pool, ev.version, outcome);
    outcome
}

fn apply_position_change(
    manager: &PoolStateManager,
    ev: &PoolLogEvent,
    tick_lower: i32,
    tick_upper: i32,
    delta: Option<i128>,
) -> UpdateOutcome {
    let delta = match delta {
        Some(d) => d,
        None => return UpdateOutcome::Rejected,
    };
    manager.update_with(&ev.pool, ev.version, |current| match current {
        PoolState::ConcentratedLiquidity(cl) => {
            let mut next = cl.clone();
            v3_math::apply_liquidity_delta(&mut next, tick_lower, tick_upper, delta)?;
            Some(PoolState::ConcentratedLiquidity(next))
        }
        PoolState::ConstantProduct { .. } => None,
    })
}

/// Initial sync summary
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub block: u64,
    pub synced: usize,
    pub failed: usize,
}

/// Reads pool state over RPC for registration
pub struct PoolSyncer<P> {
    provider: Arc<P>,
    /// Bitmap words fetched on each side of the current tick's word
    bitmap_radius: i32,
}

impl<P: Provider + 'static> PoolSyncer<P> {
    pub fn new(provider: Arc<P>, bitmap_radius: u8) -> Self {
        Self {
            provider,
            bitmap_radius: bitmap_radius as i32,
        }
    }

    /// Read every pool at one pinned block and register it.
    ///
    /// Pools that fail to read are skipped (their routes are unavailable);
    /// a duplicate address aborts startup.
    pub async fn sync_into(&self, manager: &PoolStateManager, pools: Vec<Pool>) -> Result<SyncReport> {
        let block = self
            .provider
            .get_block_number()
            .await
            .context("Failed to get block number for initial sync")?;
        info!("Initial sync of {} pools at block {}", pools.len(), block);

        let futs: Vec<_> = pools.iter().map(|pool| self.fetch_state(pool, block)).collect();
        let results = join_all(futs).await;

        let mut report = SyncReport {
            block,
            ..Default::default()
        };
        for (pool, result) in pools.into_iter().zip(results) {
            match result {
                Ok(state) => {
                    debug!("Synced {} | price={:.6e}", pool, state.raw_price());
                    manager
                        .register(pool, state, VersionToken::snapshot_at(block))
                        .context("Pool registration failed")?;
                    report.synced += 1;
                }
                Err(e) => {
                    warn!("Failed to sync {}: {:#}", pool, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Initial sync complete: {} synced, {} failed (block {})",
            report.synced, report.failed, report.block
        );
        Ok(report)
    }

    /// Full state of one pool at `block`
    pub async fn fetch_state(&self, pool: &Pool, block: u64) -> Result<PoolState> {
        match pool.variant {
            DexVariant::ConstantProduct => self.fetch_constant_product(pool, block).await,
            DexVariant::ConcentratedLiquidity => self.fetch_concentrated(pool, block).await,
        }
    }

    async fn fetch_constant_product(&self, pool: &Pool, block: u64) -> Result<PoolState> {
        let pair = IUniswapV2Pair::new(pool.address, Arc::clone(&self.provider));
        let reserves = pair
            .getReserves()
            .block(BlockId::number(block))
            .call()
            .await
            .context("Failed to get reserves")?;

        Ok(PoolState::ConstantProduct {
            reserve0: U256::from(reserves.reserve0),
            reserve1: U256::from(reserves.reserve1),
        })
    }

    async fn fetch_concentrated(&self, pool: &Pool, block: u64) -> Result<PoolState> {
        if pool.tick_spacing <= 0 {
            return Err(anyhow!("pool {} has no tick spacing", pool.address));
        }
        let contract = UniswapV3Pool::new(pool.address, Arc::clone(&self.provider));
        let at = BlockId::number(block);

        let slot0_call = contract.slot0().block(at);
        let liq_call = contract.liquidity().block(at);
        let (slot0, liquidity) = tokio::join!(slot0_call.call(), liq_call.call());
        let slot0 = slot0.context("Failed to get slot0")?;
        let liquidity = liquidity.context("Failed to get liquidity")?;

        let tick = i32::try_from(slot0.tick).map_err(|_| anyhow!("slot0 tick out of range"))?;
        let spacing = pool.tick_spacing;
        let (ticks, tick_window) = self.fetch_tick_window(&contract, tick, spacing, at).await?;

        debug!(
            "{}: tick={} liquidity={} initialized ticks in window {:?}: {}",
            pool.label,
            tick,
            liquidity,
            tick_window,
            ticks.len()
        );

        Ok(PoolState::ConcentratedLiquidity(ConcentratedState {
            sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
            liquidity,
            tick,
            fee: pool.fee,
            ticks,
            tick_window,
        }))
    }

    /// Initialized ticks (→ liquidityNet) in the bitmap words around `tick`,
    /// and the inclusive tick range those words cover.
    async fn fetch_tick_window(
        &self,
        contract: &UniswapV3Pool::UniswapV3PoolInstance<Arc<P>>,
        tick: i32,
        spacing: i32,
        at: BlockId,
    ) -> Result<(BTreeMap<i32, i128>, (i32, i32))> {
        let compressed = tick.div_euclid(spacing);
        let center_word = compressed >> 8;
        let min_word = (MIN_TICK / spacing) >> 8;
        let max_word = (MAX_TICK / spacing) >> 8;
        let first_word = (center_word - self.bitmap_radius).max(min_word);
        let last_word = (center_word + self.bitmap_radius).min(max_word);

        let word_futs: Vec<_> = (first_word..=last_word)
            .map(|word| async move {
                let pos = i16::try_from(word).context("bitmap word out of range")?;
                let bitmap = contract
                    .tickBitmap(pos)
                    .block(at)
                    .call()
                    .await
                    .with_context(|| format!("Failed to get tickBitmap({})", word))?;
                Ok::<_, anyhow::Error>((word, bitmap))
            })
            .collect();

        let mut initialized = Vec::new();
        for result in join_all(word_futs).await {
            let (word, bitmap) = result?;
            for bit in 0..256usize {
                if bitmap.bit(bit) {
                    initialized.push((word * 256 + bit as i32) * spacing);
                }
            }
        }

        let tick_futs: Vec<_> = initialized
            .iter()
            .map(|t| async move {
                let arg = I24::try_from(*t).map_err(|_| anyhow!("tick {} out of int24 range", t))?;
                let info = contract
                    .ticks(arg)
                    .block(at)
                    .call()
                    .await
                    .with_context(|| format!("Failed to get ticks({})", t))?;
                Ok::<_, anyhow::Error>((*t, info.liquidityNet))
            })
            .collect();

        let mut ticks = BTreeMap::new();
        for result in join_all(tick_futs).await {
            let (t, net) = result?;
            ticks.insert(t, net);
        }

        let window = (
            (first_word * 256 * spacing).max(MIN_TICK),
            ((last_word * 256 + 255) * spacing).min(MAX_TICK),
        );
        Ok((ticks, window))
    }
}
