//! Mempool Calldata Decoder
//!
//! Decode exact-input DEX swaps from pending transaction input bytes.
//!
//! Supported Function Selectors:
//!     V3 SwapRouter:
//!       0x414bf389  exactInputSingle(ExactInputSingleParams)
//!       0xc04b8d59  exactInput(ExactInputParams)            (first hop)
//!       0xac9650d8  multicall(bytes[])
//!     V3 SwapRouter02:
//!       0x04e45aaf  exactInputSingle(ExactInputSingleParams) (no deadline)
//!       0xb858183f  exactInput(ExactInputParams)             (first hop)
//!       0x5ae401dc  multicall(uint256,bytes[])
//!     V2 Router:
//!       0x38ed1739  swapExactTokensForTokens                 (first hop)
//!       0x18cbafe5  swapExactTokensForETH                    (first hop)
//!       0x5c11d795  swapExactTokensForTokensSupportingFeeOnTransferTokens
//!
//! Exact-output swaps (0xdb3e2198, 0xf28c0498, 0x8803dbee) and unknown
//! selectors are not decoded.
//!
//! Created: 2026-02-01
//! Modified: 2026-02-03 - alloy SolCall decoding, SwapRouter02 shapes, exact-input only

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use tracing::trace;

use super::types::{DecodedSwap, SwapProtocol};
use crate::contracts::{ISwapRouter, ISwapRouter02, IUniswapV2Router02};

/// Exact-output selectors, recognized only to label them in traces
const EXACT_OUTPUT_SELECTORS: [[u8; 4]; 3] = [
    [0xdb, 0x3e, 0x21, 0x98], // exactOutputSingle
    [0xf2, 0x8c, 0x04, 0x98], // exactOutput
    [0x88, 0x03, 0xdb, 0xee], // swapTokensForExactTokens
];

/// Multicalls nest at most this deep
const MAX_MULTICALL_DEPTH: usize = 2;

/// Decode swap calldata from transaction input bytes.
/// Returns None if the selector is unknown, exact-output, or decoding fails.
pub fn decode_calldata(input: &[u8]) -> Option<DecodedSwap> {
    decode_with_depth(input, 0)
}

fn decode_with_depth(input: &[u8], depth: usize) -> Option<DecodedSwap> {
    if input.len() < 4 {
        return None;
    }
    let selector: [u8; 4] = input[..4].try_into().ok()?;

    if selector == ISwapRouter::exactInputSingleCall::SELECTOR {
        let call = ISwapRouter::exactInputSingleCall::abi_decode(input).ok()?;
        let p = call.params;
        return Some(DecodedSwap {
            function_name: "exactInputSingle".to_string(),
            protocol: SwapProtocol::V3,
            token_in: p.tokenIn,
            token_out: p.tokenOut,
            fee_tier: Some(p.fee.to::<u32>()),
            amount_in: p.amountIn,
            amount_out_min: p.amountOutMinimum,
        });
    }
    if selector == ISwapRouter02::exactInputSingleCall::SELECTOR {
        let call = ISwapRouter02::exactInputSingleCall::abi_decode(input).ok()?;
        let p = call.params;
        return Some(DecodedSwap {
            function_name: "exactInputSingle02".to_string(),
            protocol: SwapProtocol::V3,
            token_in: p.tokenIn,
            token_out: p.tokenOut,
            fee_tier: Some(p.fee.to::<u32>()),
            amount_in: p.amountIn,
            amount_out_min: p.amountOutMinimum,
        });
    }
    if selector == ISwapRouter::exactInputCall::SELECTOR {
        let call = ISwapRouter::exactInputCall::abi_decode(input).ok()?;
        let p = call.params;
        return v3_path_swap("exactInput", &p.path, p.amountIn, p.amountOutMinimum);
    }
    if selector == ISwapRouter02::exactInputCall::SELECTOR {
        let call = ISwapRouter02::exactInputCall::abi_decode(input).ok()?;
        let p = call.params;
        return v3_path_swap("exactInput02", &p.path, p.amountIn, p.amountOutMinimum);
    }
    if selector == ISwapRouter::multicallCall::SELECTOR {
        let call = ISwapRouter::multicallCall::abi_decode(input).ok()?;
        return decode_multicall(&call.data, depth);
    }
    if selector == ISwapRouter02::multicallCall::SELECTOR {
        let call = ISwapRouter02::multicallCall::abi_decode(input).ok()?;
        return decode_multicall(&call.data, depth);
    }
    if selector == IUniswapV2Router02::swapExactTokensForTokensCall::SELECTOR {
        let call = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(input).ok()?;
        return v2_path_swap("swapExactTokensForTokens", &call.path, call.amountIn, call.amountOutMin);
    }
    if selector == IUniswapV2Router02::swapExactTokensForETHCall::SELECTOR {
        let call = IUniswapV2Router02::swapExactTokensForETHCall::abi_decode(input).ok()?;
        return v2_path_swap("swapExactTokensForETH", &call.path, call.amountIn, call.amountOutMin);
    }
    if selector
        == IUniswapV2Router02::swapExactTokensForTokensSupportingFeeOnTransferTokensCall::SELECTOR
    {
        let call =
            IUniswapV2Router02::swapExactTokensForTokensSupportingFeeOnTransferTokensCall::abi_decode(
                input,
            )
            .ok()?;
        return v2_path_swap(
            "swapExactTokensForTokensSupportingFeeOnTransferTokens",
            &call.path,
            call.amountIn,
            call.amountOutMin,
        );
    }

    if EXACT_OUTPUT_SELECTORS.contains(&selector) {
        trace!("Exact-output swap {} ignored", selector_hex(input));
    } else {
        trace!("Unknown selector: {}", selector_hex(input));
    }
    None
}

/// First decodable swap among the inner calls
fn decode_multicall(calls: &[alloy::primitives::Bytes], depth: usize) -> Option<DecodedSwap> {
    if depth >= MAX_MULTICALL_DEPTH {
        return None;
    }
    calls.iter().find_map(|inner| {
        decode_with_depth(inner, depth + 1).map(|mut swap| {
            swap.function_name = format!("multicall>{}", swap.function_name);
            swap
        })
    })
}

fn v3_path_swap(name: &str, path: &[u8], amount_in: U256, amount_out_min: U256) -> Option<DecodedSwap> {
    let (token_in, fee, token_out, hops) = decode_v3_path(path)?;
    Some(DecodedSwap {
        function_name: name.to_string(),
        protocol: SwapProtocol::V3,
        token_in,
        token_out,
        fee_tier: Some(fee),
        amount_in,
        // Minimum applies to the final hop
        amount_out_min: if hops == 1 { amount_out_min } else { U256::ZERO },
    })
}

fn v2_path_swap(name: &str, path: &[Address], amount_in: U256, amount_out_min: U256) -> Option<DecodedSwap> {
    if path.len() < 2 {
        return None;
    }
    Some(DecodedSwap {
        function_name: name.to_string(),
        protocol: SwapProtocol::V2,
        token_in: path[0],
        token_out: path[1],
        fee_tier: None,
        amount_in,
        amount_out_min: if path.len() == 2 { amount_out_min } else { U256::ZERO },
    })
}

/// Return the 4-byte selector as a hex string for logging
pub fn selector_hex(input: &[u8]) -> String {
    if input.len() < 4 {
        return "0x????".to_string();
    }
    format!("0x{:02x}{:02x}{:02x}{:02x}", input[0], input[1], input[2], input[3])
}

/// Decode the first hop of a V3 packed path:
/// token(20) | fee(3) | token(20) [| fee(3) | token(20) ...]
///
/// Returns (token_in, fee, token_out, hop_count)
fn decode_v3_path(path: &[u8]) -> Option<(Address, u32, Address, usize)> {
    if path.len() < 43 || (path.len() - 20) % 23 != 0 {
        return None;
    }
    let token_in = Address::from_slice(&path[0..20]);
    let fee = u32::from(path[20]) << 16 | u32::from(path[21]) << 8 | u32::from(path[22]);
    let token_out = Address::from_slice(&path[23..43]);
    let hops = (path.len() - 20) / 23;
    Some((token_in, fee, token_out, hops))
}
