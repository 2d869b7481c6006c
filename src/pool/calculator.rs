//! Price Calculator
//!
//! Pure swap simulation over a `PoolState`. Shared by quoting
//! (`PoolStateManager::quote_exact_input`) and the mempool predictor, so the
//! detector and the shadow overlay always agree on AMM math.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Fee in pips, concentrated-liquidity dispatch, post-swap state

use alloy::primitives::{Address, U256};
use tracing::trace;

use super::v3_math;
use crate::types::{Pool, PoolState};

/// Stateless AMM math
pub struct PriceCalculator;

impl PriceCalculator {
    /// Constant-product output for an exact input.
    ///
    /// Formula: out = in * (1e6 - fee) * rOut / (rIn * 1e6 + in * (1e6 - fee))
    ///
    /// With fee = 3000 this is bit-identical to Uniswap V2's 997/1000 form.
    /// `None` on zero input, empty reserves or overflow.
    pub fn get_amount_out(
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_pips: u32,
    ) -> Option<U256> {
        if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
            return None;
        }
        let denominator_scale = U256::from(v3_math::FEE_DENOMINATOR);
        let fee_complement = U256::from(v3_math::FEE_DENOMINATOR.checked_sub(fee_pips)?);

        let amount_in_with_fee = amount_in.checked_mul(fee_complement)?;
        let numerator = amount_in_with_fee.checked_mul(reserve_out)?;
        let denominator = reserve_in
            .checked_mul(denominator_scale)?
            .checked_add(amount_in_with_fee)?;

        Some(numerator / denominator)
    }

    /// Exact-input swap of `amount_in` of `token_in` through `pool`.
    ///
    /// Returns (amount_out, post-swap state). `None` if the token isn't in the
    /// pool, the state variant doesn't match, or the swap can't be priced.
    pub fn simulate_swap(
        pool: &Pool,
        state: &PoolState,
        token_in: Address,
        amount_in: U256,
    ) -> Option<(U256, PoolState)> {
        let zero_for_one = if token_in == pool.token0 {
            true
        } else if token_in == pool.token1 {
            false
        } else {
            return None;
        };

        let result = match state {
            PoolState::ConstantProduct { reserve0, reserve1 } => {
                let (reserve_in, reserve_out) = if zero_for_one {
                    (*reserve0, *reserve1)
                } else {
                    (*reserve1, *reserve0)
                };
                let out = Self::get_amount_out(amount_in, reserve_in, reserve_out, pool.fee)?;
                if out >= reserve_out {
                    return None;
                }
                let new_in = reserve_in.checked_add(amount_in)?;
                let new_out = reserve_out - out;
                let next = if zero_for_one {
                    PoolState::ConstantProduct { reserve0: new_in, reserve1: new_out }
                } else {
                    PoolState::ConstantProduct { reserve0: new_out, reserve1: new_in }
                };
                (out, next)
            }
            PoolState::ConcentratedLiquidity(cl) => {
                let (out, next) =
                    v3_math::swap_exact_input(cl, pool.tick_spacing, zero_for_one, amount_in)?;
                (out, PoolState::ConcentratedLiquidity(next))
            }
        };

        trace!(
            pool = %pool.address,
            zero_for_one,
            amount_in = %amount_in,
            amount_out = %result.0,
            "simulated swap"
        );
        Some(result)
    }

    /// Price impact of a swap in basis points (spot vs post-swap raw price)
    pub fn price_impact_bps(before: &PoolState, after: &PoolState) -> f64 {
        let p0 = before.raw_price();
        let p1 = after.raw_price();
        if p0 == 0.0 {
            return 0.0;
        }
        ((p1 - p0) / p0).abs() * 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConcentratedState, DexVariant};
    use alloy::primitives::address;
    use std::collections::BTreeMap;

    fn cp_pool(fee: u32) -> Pool {
        Pool {
            address: address!("853ee4b2a13f8a742d64c8f088be7ba2131f670d"),
            variant: DexVariant::ConstantProduct,
            token0: address!("2791bca1f2de4661ed88a30c99a7a9449aa84174"),
            token1: address!("7ceb23fd6bc0add59e62ac25578270cff1b9f619"),
            fee,
            tick_spacing: 0,
            dex: "QuickSwapV2".to_string(),
            label: "WETH/USDC".to_string(),
        }
    }

    /// Uniswap V2 getAmountOut, verbatim
    fn uniswap_v2_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
        let amount_in_with_fee = amount_in * U256::from(997u64);
        let numerator = amount_in_with_fee * reserve_out;
        let denominator = reserve_in * U256::from(1000u64) + amount_in_with_fee;
        numerator / denominator
    }

    #[test]
    fn test_get_amount_out() {
        let amount_in = U256::from(1_000_000_000_000_000_000u64); // 1 ETH
        let reserve_in = U256::from(100_000_000_000_000_000_000u128); // 100 ETH
        let reserve_out = U256::from(200_000_000_000u64); // 200,000 USDC (6 decimals)

        let amount_out =
            PriceCalculator::get_amount_out(amount_in, reserve_in, reserve_out, 3000).unwrap();

        // ~1974 USDC after fee and slippage
        assert!(amount_out > U256::from(1_970_000_000u64));
        assert!(amount_out < U256::from(2_000_000_000u64));
    }

    #[test]
    fn test_constant_product_matches_v2_bit_for_bit() {
        let cases = [
            (1u128, 1_000u128, 1_000u128),
            (1_000_000, 123_456_789, 987_654_321),
            (10u128.pow(18), 10u128.pow(20), 2 * 10u128.pow(11)),
            (999_999_999_999, 10u128.pow(24) + 7, 10u128.pow(15) + 3),
            (10u128.pow(30), 10u128.pow(30), 10u128.pow(30)),
        ];
        for (a, r_in, r_out) in cases {
            let (a, r_in, r_out) = (U256::from(a), U256::from(r_in), U256::from(r_out));
            let ours = PriceCalculator::get_amount_out(a, r_in, r_out, 3000).unwrap();
            assert_eq!(ours, uniswap_v2_amount_out(a, r_in, r_out));
        }
    }

    #[test]
    fn test_get_amount_out_zero_inputs() {
        let hundred = U256::from(100u64);
        assert!(PriceCalculator::get_amount_out(U256::ZERO, hundred, hundred, 3000).is_none());
        assert!(PriceCalculator::get_amount_out(hundred, U256::ZERO, hundred, 3000).is_none());
        assert!(PriceCalculator::get_amount_out(hundred, hundred, U256::ZERO, 3000).is_none());
    }

    #[test]
    fn test_simulate_cp_updates_reserves() {
        let pool = cp_pool(3000);
        let state = PoolState::ConstantProduct {
            reserve0: U256::from(1_000_000_000u64),
            reserve1: U256::from(500_000_000_000_000_000u128),
        };
        let (out, next) =
            PriceCalculator::simulate_swap(&pool, &state, pool.token0, U256::from(1_000_000u64))
                .unwrap();
        match next {
            PoolState::ConstantProduct { reserve0, reserve1 } => {
                assert_eq!(reserve0, U256::from(1_001_000_000u64));
                assert_eq!(reserve1, U256::from(500_000_000_000_000_000u128) - out);
            }
            _ => panic!("variant changed"),
        }
        assert!(PriceCalculator::price_impact_bps(&state, &next) > 0.0);
    }

    #[test]
    fn test_simulate_rejects_foreign_token() {
        let pool = cp_pool(3000);
        let state = PoolState::ConstantProduct {
            reserve0: U256::from(1000u64),
            reserve1: U256::from(1000u64),
        };
        assert!(PriceCalculator::simulate_swap(&pool, &state, Address::ZERO, U256::from(1u8)).is_none());
    }

    #[test]
    fn test_simulate_cl_dispatch() {
        let mut pool = cp_pool(500);
        pool.variant = DexVariant::ConcentratedLiquidity;
        pool.tick_spacing = 10;
        let state = PoolState::ConcentratedLiquidity(ConcentratedState {
            sqrt_price_x96: v3_math::get_sqrt_ratio_at_tick(0).unwrap(),
            liquidity: 10u128.pow(24),
            tick: 0,
            fee: 500,
            ticks: BTreeMap::new(),
            tick_window: (v3_math::MIN_TICK, v3_math::MAX_TICK),
        });
        let (out, next) =
            PriceCalculator::simulate_swap(&pool, &state, pool.token1, U256::from(1_000_000u64))
                .unwrap();
        assert!(out > U256::ZERO && out < U256::from(1_000_000u64));
        assert!(matches!(next, PoolState::ConcentratedLiquidity(ref cl) if cl.sqrt_price_x96 > *v3_math::Q96));
    }
}
