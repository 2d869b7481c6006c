//! Concentrated-liquidity swap math
//!
//! Integer reproduction of Uniswap V3's TickMath, SqrtPriceMath, SwapMath and
//! the exact-input swap loop, with the on-chain rounding directions. Tick
//! bitmap word boundaries are emulated over a `BTreeMap` of initialized ticks
//! so swap steps split exactly where the pool contract splits them.
//!
//! Every function returns `None` on overflow or an out-of-range input instead
//! of panicking.
//!
//! Created: 2026-02-01
//! Modified: 2026-02-03 - Full swap loop with tick crossing (was within-tick only)
//!
//! References:
//!     - Uniswap V3 TickMath.sol, SqrtPriceMath.sol, SwapMath.sol, TickBitmap.sol

use alloy::primitives::{U256, U512};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use crate::types::ConcentratedState;

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// Fee denominator: fees are expressed in pips (1e-6)
pub const FEE_DENOMINATOR: u32 = 1_000_000;

pub static MIN_SQRT_RATIO: Lazy<U256> = Lazy::new(|| U256::from(4295128739u64));
pub static MAX_SQRT_RATIO: Lazy<U256> = Lazy::new(|| {
    U256::from_str_radix("1461446703485210103287273052203988822378723970342", 10)
        .unwrap_or(U256::MAX)
});

/// 2^96
pub static Q96: Lazy<U256> = Lazy::new(|| U256::from(1u8) << 96);

/// (bit of |tick|, multiplier) pairs from TickMath.getSqrtRatioAtTick
const TICK_MAGIC: [(u32, u128); 19] = [
    (0x2, 0xfff97272373d413259a46990580e213a),
    (0x4, 0xfff2e50f5f656932ef12357cf3c7fdcc),
    (0x8, 0xffe5caca7e10e4e61c3624eaa0941cd0),
    (0x10, 0xffcb9843d60f6159c9db58835c926644),
    (0x20, 0xff973b41fa98c081472e6896dfb254c0),
    (0x40, 0xff2ea16466c96a3843ec78b326b52861),
    (0x80, 0xfe5dee046a99a2a811c461f1969c3053),
    (0x100, 0xfcbe86c7900a88aedcffc83b479aa3a4),
    (0x200, 0xf987a7253ac413176f2b074cf7815e54),
    (0x400, 0xf3392b0822b70005940c7a398e4b70f3),
    (0x800, 0xe7159475a2c29b7443b29c7fa6e889d9),
    (0x1000, 0xd097f3bdfd2022b8845ad8f792aa5825),
    (0x2000, 0xa9f746462d870fdf8a65dc1f90e061e5),
    (0x4000, 0x70d869a156d2a1b890bb3df62baf32f7),
    (0x8000, 0x31be135f97d08fd981231505542fcfa6),
    (0x10000, 0x9aa508b5b7a84e1c677de54f3e99bc9),
    (0x20000, 0x5d6af8dedb81196699c329225ee604),
    (0x40000, 0x2216e584f5fa1ea926041bedfe98),
    (0x80000, 0x48a170391f7dc42444e8fa2),
];

// ── FullMath ────────────────────────────────────────────────────────────────

fn widen(x: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(x.as_limbs());
    U512::from_limbs(limbs)
}

fn narrow(x: U512) -> Option<U256> {
    let limbs = x.as_limbs();
    if limbs[4..].iter().any(|l| *l != 0) {
        return None;
    }
    Some(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

/// floor(a * b / denominator) with a 512-bit intermediate
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    narrow(widen(a) * widen(b) / widen(denominator))
}

/// ceil(a * b / denominator) with a 512-bit intermediate
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let product = widen(a) * widen(b);
    let d = widen(denominator);
    let mut result = product / d;
    if !(product % d).is_zero() {
        result += U512::from(1u8);
    }
    narrow(result)
}

fn div_rounding_up(a: U256, b: U256) -> Option<U256> {
    if b.is_zero() {
        return None;
    }
    let q = a / b;
    if (a % b).is_zero() {
        Some(q)
    } else {
        q.checked_add(U256::from(1u8))
    }
}

// ── TickMath ────────────────────────────────────────────────────────────────

/// sqrt(1.0001^tick) * 2^96
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Option<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return None;
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        U256::from(1u8) << 128
    };
    for (bit, magic) in TICK_MAGIC {
        if abs_tick & bit != 0 {
            ratio = (ratio * U256::from(magic)) >> 128;
        }
    }
    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 → Q64.96, rounding up
    let round = if (ratio % (U256::from(1u8) << 32usize)).is_zero() { 0u8 } else { 1u8 };
    Some((ratio >> 32) + U256::from(round))
}

/// Greatest tick whose sqrt ratio is <= `sqrt_price_x96`
pub fn get_tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Option<i32> {
    if sqrt_price_x96 < *MIN_SQRT_RATIO || sqrt_price_x96 >= *MAX_SQRT_RATIO {
        return None;
    }
    let (mut lo, mut hi) = (MIN_TICK, MAX_TICK);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if get_sqrt_ratio_at_tick(mid)? <= sqrt_price_x96 {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Some(lo)
}

// ── SqrtPriceMath ───────────────────────────────────────────────────────────

/// Next price after adding `amount` of token0 (exact input, price moves down)
pub fn get_next_sqrt_price_from_amount0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
) -> Option<U256> {
    if amount.is_zero() {
        return Some(sqrt_price_x96);
    }
    let numerator1: U256 = U256::from(liquidity) << 96;

    if let Some(product) = amount.checked_mul(sqrt_price_x96) {
        if let Some(denominator) = numerator1.checked_add(product) {
            return mul_div_rounding_up(numerator1, sqrt_price_x96, denominator);
        }
    }
    let denominator = (numerator1 / sqrt_price_x96).checked_add(amount)?;
    div_rounding_up(numerator1, denominator)
}

/// Next price after adding `amount` of token1 (exact input, price moves up)
pub fn get_next_sqrt_price_from_amount1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
) -> Option<U256> {
    if liquidity == 0 {
        return None;
    }
    let max_u160 = (U256::from(1u8) << 160) - U256::from(1u8);
    let quotient = if amount <= max_u160 {
        (amount << 96) / U256::from(liquidity)
    } else {
        mul_div(amount, *Q96, U256::from(liquidity))?
    };
    sqrt_price_x96.checked_add(quotient)
}

pub fn get_next_sqrt_price_from_input(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Option<U256> {
    if sqrt_price_x96.is_zero() || liquidity == 0 {
        return None;
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_in)
    } else {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_in)
    }
}

/// Token0 amount between two prices
pub fn get_amount0_delta(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Option<U256> {
    let (lower, upper) = if sqrt_a > sqrt_b { (sqrt_b, sqrt_a) } else { (sqrt_a, sqrt_b) };
    if lower.is_zero() {
        return None;
    }
    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = upper - lower;

    if round_up {
        div_rounding_up(mul_div_rounding_up(numerator1, numerator2, upper)?, lower)
    } else {
        Some(mul_div(numerator1, numerator2, upper)? / lower)
    }
}

/// Token1 amount between two prices
pub fn get_amount1_delta(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Option<U256> {
    let (lower, upper) = if sqrt_a > sqrt_b { (sqrt_b, sqrt_a) } else { (sqrt_a, sqrt_b) };
    if round_up {
        mul_div_rounding_up(U256::from(liquidity), upper - lower, *Q96)
    } else {
        mul_div(U256::from(liquidity), upper - lower, *Q96)
    }
}

// ── SwapMath ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_price_next: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_amount: U256,
}

/// One exact-input swap step toward `sqrt_target`
pub fn compute_swap_step(
    sqrt_current: U256,
    sqrt_target: U256,
    liquidity: u128,
    amount_remaining: U256,
    fee_pips: u32,
) -> Option<SwapStep> {
    let zero_for_one = sqrt_current >= sqrt_target;
    let fee_denominator = U256::from(FEE_DENOMINATOR);
    let fee_complement = U256::from(FEE_DENOMINATOR.checked_sub(fee_pips)?);

    let remaining_less_fee = mul_div(amount_remaining, fee_complement, fee_denominator)?;
    let amount_in_to_target = if zero_for_one {
        get_amount0_delta(sqrt_target, sqrt_current, liquidity, true)?
    } else {
        get_amount1_delta(sqrt_current, sqrt_target, liquidity, true)?
    };

    let sqrt_next = if remaining_less_fee >= amount_in_to_target {
        sqrt_target
    } else {
        get_next_sqrt_price_from_input(sqrt_current, liquidity, remaining_less_fee, zero_for_one)?
    };
    let reached_target = sqrt_next == sqrt_target;

    let (amount_in, amount_out) = if zero_for_one {
        let amount_in = if reached_target {
            amount_in_to_target
        } else {
            get_amount0_delta(sqrt_next, sqrt_current, liquidity, true)?
        };
        (amount_in, get_amount1_delta(sqrt_next, sqrt_current, liquidity, false)?)
    } else {
        let amount_in = if reached_target {
            amount_in_to_target
        } else {
            get_amount1_delta(sqrt_current, sqrt_next, liquidity, true)?
        };
        (amount_in, get_amount0_delta(sqrt_current, sqrt_next, liquidity, false)?)
    };

    let fee_amount = if !reached_target {
        amount_remaining.checked_sub(amount_in)?
    } else {
        mul_div_rounding_up(amount_in, U256::from(fee_pips), fee_complement)?
    };

    Some(SwapStep {
        sqrt_price_next: sqrt_next,
        amount_in,
        amount_out,
        fee_amount,
    })
}

// ── TickBitmap emulation ────────────────────────────────────────────────────

/// Next initialized tick within the same 256-bit bitmap word as `tick`.
///
/// Returns (tick_next, initialized). When nothing is initialized in the word,
/// `tick_next` is the word boundary in the search direction.
pub fn next_initialized_tick_within_one_word(
    ticks: &BTreeMap<i32, i128>,
    tick: i32,
    tick_spacing: i32,
    lte: bool,
) -> (i32, bool) {
    let spacing = tick_spacing.max(1);
    let mut compressed = tick / spacing;
    if tick < 0 && tick % spacing != 0 {
        compressed -= 1;
    }

    if lte {
        let bit_pos = compressed.rem_euclid(256);
        let lo = (compressed - bit_pos) * spacing;
        let hi = compressed * spacing;
        match ticks.range(lo..=hi).next_back() {
            Some((t, _)) => (*t, true),
            None => (lo, false),
        }
    } else {
        let next = compressed + 1;
        let bit_pos = next.rem_euclid(256);
        let lo = next * spacing;
        let hi = (next + (255 - bit_pos)) * spacing;
        match ticks.range(lo..=hi).next() {
            Some((t, _)) => (*t, true),
            None => (hi, false),
        }
    }
}

fn add_delta(liquidity: u128, delta: i128) -> Option<u128> {
    if delta < 0 {
        liquidity.checked_sub(delta.unsigned_abs())
    } else {
        liquidity.checked_add(delta as u128)
    }
}

// ── Swap loop ───────────────────────────────────────────────────────────────

/// Exact-input swap over a concentrated-liquidity state.
///
/// Returns the output amount and the post-swap state. `None` if the swap
/// would need tick data outside `tick_window`, cannot be filled before the
/// price limit, or overflows.
pub fn swap_exact_input(
    state: &ConcentratedState,
    tick_spacing: i32,
    zero_for_one: bool,
    amount_in: U256,
) -> Option<(U256, ConcentratedState)> {
    if amount_in.is_zero() || state.sqrt_price_x96.is_zero() {
        return None;
    }
    let (window_lo, window_hi) = state.tick_window;
    if state.tick < window_lo || state.tick > window_hi {
        return None;
    }

    let price_limit = if zero_for_one {
        *MIN_SQRT_RATIO + U256::from(1u8)
    } else {
        *MAX_SQRT_RATIO - U256::from(1u8)
    };

    let mut remaining = amount_in;
    let mut amount_out = U256::ZERO;
    let mut sqrt_price = state.sqrt_price_x96;
    let mut tick = state.tick;
    let mut liquidity = state.liquidity;

    while !remaining.is_zero() {
        if sqrt_price == price_limit {
            return None;
        }
        let sqrt_start = sqrt_price;

        let (tick_next, initialized) =
            next_initialized_tick_within_one_word(&state.ticks, tick, tick_spacing, zero_for_one);
        let tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);
        if tick_next < window_lo || tick_next > window_hi {
            return None;
        }

        let sqrt_next_tick = get_sqrt_ratio_at_tick(tick_next)?;
        let sqrt_target = if (zero_for_one && sqrt_next_tick < price_limit)
            || (!zero_for_one && sqrt_next_tick > price_limit)
        {
            price_limit
        } else {
            sqrt_next_tick
        };

        let step = compute_swap_step(sqrt_price, sqrt_target, liquidity, remaining, state.fee)?;
        sqrt_price = step.sqrt_price_next;
        remaining = remaining.checked_sub(step.amount_in.checked_add(step.fee_amount)?)?;
        amount_out = amount_out.checked_add(step.amount_out)?;

        if sqrt_price == sqrt_next_tick {
            if initialized {
                let mut liquidity_net = state.ticks.get(&tick_next).copied().unwrap_or(0);
                if zero_for_one {
                    liquidity_net = liquidity_net.checked_neg()?;
                }
                liquidity = add_delta(liquidity, liquidity_net)?;
            }
            tick = if zero_for_one { tick_next - 1 } else { tick_next };
        } else if sqrt_price != sqrt_start {
            tick = get_tick_at_sqrt_ratio(sqrt_price)?;
        }
    }

    let mut next = state.clone();
    next.sqrt_price_x96 = sqrt_price;
    next.tick = tick;
    next.liquidity = liquidity;
    Some((amount_out, next))
}

/// Apply a position change (Mint: positive, Burn: negative) to the tick map
/// and in-range liquidity.
pub fn apply_liquidity_delta(
    state: &mut ConcentratedState,
    tick_lower: i32,
    tick_upper: i32,
    delta: i128,
) -> Option<()> {
    if tick_lower >= tick_upper {
        return None;
    }
    // Zero-amount burns only poke fees
    if delta == 0 {
        return Some(());
    }
    for (tick, signed) in [(tick_lower, delta), (tick_upper, delta.checked_neg()?)] {
        let net = state.ticks.get(&tick).copied().unwrap_or(0).checked_add(signed)?;
        if net == 0 && delta < 0 {
            state.ticks.remove(&tick);
        } else {
            state.ticks.insert(tick, net);
        }
    }
    if state.tick >= tick_lower && state.tick < tick_upper {
        state.liquidity = add_delta(state.liquidity, delta)?;
    }
    Some(())
}
