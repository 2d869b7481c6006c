//! Mempool Predictor
//!
//! Given a pending transaction, decode the router call, resolve it to exactly
//! one whitelisted pool, simulate the swap and write the predicted post-swap
//! state to the shadow overlay. Canonical state is only ever read.
//!
//! Pool resolution: router address → DEX name (config), then
//! (DEX, unordered token pair) → candidate pools, narrowed by fee tier when the
//! calldata carries one. Zero or several candidates → the swap is dropped.
//!
//! Created: 2026-02-01
//! Modified: 2026-02-03 - Shadow overlay output, address-keyed resolution, stacked predictions

use alloy::primitives::{Address, TxHash};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::decoder::decode_calldata;
use super::shadow::ShadowOverlay;
use super::types::{DecodedSwap, PendingTx, Prediction, PredictorCounts, PredictorStats};
use crate::pool::{PoolStateManager, PriceCalculator};
use crate::types::Pool;

type PairKey = (String, Address, Address);

fn pair_key(dex: &str, a: Address, b: Address) -> PairKey {
    if a < b {
        (dex.to_string(), a, b)
    } else {
        (dex.to_string(), b, a)
    }
}

/// Why a pending transaction produced no prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Contract creation or a router we don't track
    NotRouter,
    /// Unknown selector, exact-output, or malformed calldata
    DecodeFailure,
    /// No unique whitelisted pool for the decoded swap
    Unresolved,
    /// Pool state can't price the swap
    Unpriceable,
}

pub struct MempoolPredictor {
    manager: PoolStateManager,
    overlay: ShadowOverlay,
    /// Router address → DEX name
    routers: HashMap<Address, String>,
    pools_by_pair: HashMap<PairKey, Vec<Arc<Pool>>>,
    ttl: Duration,
    stats: Arc<PredictorStats>,
}

impl MempoolPredictor {
    /// Build the resolution index from the pools registered in `manager`.
    pub fn new(
        manager: PoolStateManager,
        overlay: ShadowOverlay,
        routers: HashMap<Address, String>,
        ttl: Duration,
    ) -> Self {
        let mut pools_by_pair: HashMap<PairKey, Vec<Arc<Pool>>> = HashMap::new();
        for pool in manager.pools() {
            pools_by_pair
                .entry(pair_key(&pool.dex, pool.token0, pool.token1))
                .or_default()
                .push(pool);
        }
        debug!(
            "Predictor: {} routers, {} (dex, pair) keys, ttl={:?}",
            routers.len(),
            pools_by_pair.len(),
            ttl
        );

        Self {
            manager,
            overlay,
            routers,
            pools_by_pair,
            ttl,
            stats: Arc::new(PredictorStats::default()),
        }
    }

    pub fn overlay(&self) -> &ShadowOverlay {
        &self.overlay
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn counts(&self) -> PredictorCounts {
        self.stats.counts()
    }

    /// Predict the effect of a pending transaction, TTL starting now.
    pub fn on_pending(&self, tx: &PendingTx) -> Result<Prediction, SkipReason> {
        self.on_pending_at(tx, Instant::now())
    }

    pub fn on_pending_at(&self, tx: &PendingTx, now: Instant) -> Result<Prediction, SkipReason> {
        let dex = match tx.to.and_then(|to| self.routers.get(&to)) {
            Some(dex) => dex,
            None => return Err(SkipReason::NotRouter),
        };
        self.stats.seen.fetch_add(1, Ordering::Relaxed);

        let swap = match decode_calldata(&tx.input) {
            Some(swap) => swap,
            None => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                trace!("{}: {}", tx.hash, crate::error::ArbError::DecodeFailure(tx.hash));
                return Err(SkipReason::DecodeFailure);
            }
        };

        let pool = match self.resolve(dex, &swap) {
            Some(pool) => pool,
            None => {
                self.stats.unresolved.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "{} {} {}→{} fee={:?}: no unique pool",
                    tx.hash,
                    swap.function_name,
                    swap.token_in,
                    swap.token_out,
                    swap.fee_tier
                );
                return Err(SkipReason::Unresolved);
            }
        };

        self.predict(tx.hash, &pool, &swap, now)
    }

    /// Unique whitelisted pool for a decoded swap on `dex`
    fn resolve(&self, dex: &str, swap: &DecodedSwap) -> Option<Arc<Pool>> {
        let candidates = self
            .pools_by_pair
            .get(&pair_key(dex, swap.token_in, swap.token_out))?;
        let mut matching = candidates
            .iter()
            .filter(|p| swap.fee_tier.map_or(true, |fee| fee == p.fee));
        let first = matching.next()?;
        if matching.next().is_some() {
            return None;
        }
        Some(Arc::clone(first))
    }

    fn predict(
        &self,
        trigger: TxHash,
        pool: &Pool,
        swap: &DecodedSwap,
        now: Instant,
    ) -> Result<Prediction, SkipReason> {
        // Stack on the newest live prediction for this pool, else canonical
        let (base, stacked) = match self.overlay.get_at(&pool.address, now) {
            Some(entry) => (entry.state, true),
            None => match self.manager.get(&pool.address) {
                Some(snapshot) => (snapshot.state, false),
                None => return Err(SkipReason::Unresolved),
            },
        };

        let (amount_out, post_state) =
            match PriceCalculator::simulate_swap(pool, &base, swap.token_in, swap.amount_in) {
                Some(result) => result,
                None => return Err(SkipReason::Unpriceable),
            };
        let impact = PriceCalculator::price_impact_bps(&base, &post_state);

        let entry = self
            .overlay
            .insert(pool.address, post_state, trigger, self.ttl, now);
        self.stats.predicted.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Predicted {} on {}: in={} out={} impact={:.2}bps stacked={} seq={}",
            swap.function_name,
            pool,
            swap.amount_in,
            amount_out,
            impact,
            stacked,
            entry.sequence
        );

        Ok(Prediction {
            pool: pool.address,
            trigger,
            function_name: swap.function_name.clone(),
            amount_in: swap.amount_in,
            amount_out,
            price_impact_bps: impact,
            stacked,
            sequence: entry.sequence,
            expires_at: entry.expires_at,
        })
    }

    /// Triggers were mined: their effect is now canonical
    pub fn on_included(&self, hashes: &[TxHash]) -> usize {
        let removed = self.overlay.on_included(hashes);
        self.stats
            .included
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn sweep(&self) -> usize {
        self.overlay.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ISwapRouter, IUniswapV2Router02};
    use crate::types::{DexVariant, PoolState, VersionToken};
    use alloy::primitives::{address, aliases::U24, b256, Bytes, U160, U256};
    use alloy::sol_types::SolCall;

    const USDC: Address = address!("2791bca1f2de4661ed88a30c99a7a9449aa84174");
    const WETH: Address = address!("7ceb23fd6bc0add59e62ac25578270cff1b9f619");
    const V2_POOL: Address = address!("853ee4b2a13f8a742d64c8f088be7ba2131f670d");
    const V3_POOL_A: Address = address!("45dda9cb7c25131df268515131f647d726f50608");
    const V3_POOL_B: Address = address!("0e44ceb592acfc5d3f09d996302eb4c499ff8c10");
    const V2_ROUTER: Address = address!("a5e0829caced8ffdd4de3c43696c57f7d7a678ff");
    const V3_ROUTER: Address = address!("e592427a0aece92de3edee1f18e0157c05861564");
    const TX: TxHash = b256!("1111111111111111111111111111111111111111111111111111111111111111");

    fn pool(address: Address, variant: DexVariant, fee: u32, dex: &str) -> Pool {
        Pool {
            address,
            variant,
            token0: USDC,
            token1: WETH,
            fee,
            tick_spacing: if variant == DexVariant::ConcentratedLiquidity { 10 } else { 0 },
            dex: dex.to_string(),
            label: "WETH/USDC".to_string(),
        }
    }

    fn cl_state() -> PoolState {
        PoolState::ConcentratedLiquidity(crate::types::ConcentratedState {
            sqrt_price_x96: U256::from(1u8) << 96,
            liquidity: 10u128.pow(24),
            tick: 0,
            fee: 500,
            ticks: Default::default(),
            tick_window: (-887272, 887272),
        })
    }

    fn predictor() -> MempoolPredictor {
        let manager = PoolStateManager::new();
        manager
            .register(
                pool(V2_POOL, DexVariant::ConstantProduct, 3000, "QuickSwapV2"),
                PoolState::ConstantProduct {
                    reserve0: U256::from(2_000_000_000_000u64),
                    reserve1: U256::from(1_000u64) * U256::from(10u64.pow(18)),
                },
                VersionToken::snapshot_at(1),
            )
            .unwrap();
        manager
            .register(
                pool(V3_POOL_A, DexVariant::ConcentratedLiquidity, 500, "UniswapV3"),
                cl_state(),
                VersionToken::snapshot_at(1),
            )
            .unwrap();
        manager
            .register(
                pool(V3_POOL_B, DexVariant::ConcentratedLiquidity, 3000, "UniswapV3"),
                cl_state(),
                VersionToken::snapshot_at(1),
            )
            .unwrap();

        let routers = HashMap::from([
            (V2_ROUTER, "QuickSwapV2".to_string()),
            (V3_ROUTER, "UniswapV3".to_string()),
        ]);
        MempoolPredictor::new(manager, ShadowOverlay::new(), routers, Duration::from_secs(4))
    }

    fn v2_swap(amount_in: u64) -> PendingTx {
        let input = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: U256::from(amount_in),
            amountOutMin: U256::ZERO,
            path: vec![USDC, WETH],
            to: Address::ZERO,
            deadline: U256::MAX,
        }
        .abi_encode();
        PendingTx {
            hash: TX,
            to: Some(V2_ROUTER),
            input: Bytes::from(input),
            max_priority_fee: Some(30_000_000_000),
            seen_at: Instant::now(),
        }
    }

    fn v3_swap(fee: u32) -> PendingTx {
        let input = ISwapRouter::exactInputSingleCall {
            params: ISwapRouter::ExactInputSingleParams {
                tokenIn: WETH,
                tokenOut: USDC,
                fee: U24::from(fee),
                recipient: Address::ZERO,
                deadline: U256::MAX,
                amountIn: U256::from(10u64.pow(18)),
                amountOutMinimum: U256::ZERO,
                sqrtPriceLimitX96: U160::ZERO,
            },
        }
        .abi_encode();
        PendingTx {
            hash: TX,
            to: Some(V3_ROUTER),
            input: Bytes::from(input),
            max_priority_fee: None,
            seen_at: Instant::now(),
        }
    }

    #[test]
    fn test_prediction_writes_shadow_not_canonical() {
        let predictor = predictor();
        let now = Instant::now();
        let before = predictor.manager.get(&V2_POOL).unwrap();

        let prediction = predictor.on_pending_at(&v2_swap(1_000_000_000), now).unwrap();
        assert_eq!(prediction.pool, V2_POOL);
        assert!(!prediction.stacked);
        assert_eq!(prediction.expires_at, now + Duration::from_secs(4));

        let shadow = predictor.overlay().get_at(&V2_POOL, now).unwrap();
        assert_ne!(shadow.state, before.state);
        // Canonical untouched
        let after = predictor.manager.get(&V2_POOL).unwrap();
        assert_eq!(after.state, before.state);
        assert_eq!(after.version, before.version);
    }

    #[test]
    fn test_second_prediction_stacks() {
        let predictor = predictor();
        let now = Instant::now();
        let first = predictor.on_pending_at(&v2_swap(1_000_000_000), now).unwrap();
        let second = predictor.on_pending_at(&v2_swap(1_000_000_000), now).unwrap();
        assert!(second.stacked);
        // Same input into a pool already moved the same way yields less
        assert!(second.amount_out < first.amount_out);
    }

    #[test]
    fn test_fee_tier_disambiguates_v3_pools() {
        let predictor = predictor();
        let prediction = predictor.on_pending_at(&v3_swap(3000), Instant::now()).unwrap();
        assert_eq!(prediction.pool, V3_POOL_B);

        // No whitelisted 1% pool
        assert_eq!(
            predictor.on_pending_at(&v3_swap(10_000), Instant::now()).unwrap_err(),
            SkipReason::Unresolved
        );
        assert_eq!(predictor.counts().unresolved, 1);
    }

    #[test]
    fn test_decode_failures_are_counted() {
        let predictor = predictor();
        let mut tx = v2_swap(1);
        tx.input = Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            predictor.on_pending_at(&tx, Instant::now()).unwrap_err(),
            SkipReason::DecodeFailure
        );
        assert_eq!(predictor.counts().decode_failures, 1);

        // Not a tracked router: not counted as a decode failure
        tx.to = Some(Address::ZERO);
        assert_eq!(predictor.on_pending_at(&tx, Instant::now()).unwrap_err(), SkipReason::NotRouter);
        assert_eq!(predictor.counts().decode_failures, 1);
    }

    #[test]
    fn test_on_included_clears_prediction() {
        let predictor = predictor();
        let now = Instant::now();
        predictor.on_pending_at(&v2_swap(1_000_000_000), now).unwrap();
        assert_eq!(predictor.on_included(&[TX]), 1);
        assert!(predictor.overlay().get_at(&V2_POOL, now).is_none());
        assert_eq!(predictor.counts().included, 1);
    }
}
