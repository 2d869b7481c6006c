//! Mempool Type Definitions
//!
//! Pending transactions as seen by the predictor, decoded swap calldata, and
//! prediction results.
//!
//! Created: 2026-02-01
//! Modified: 2026-02-03 - Predictions against shadow state replace CSV observation types

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Mempool operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MempoolMode {
    /// No mempool subscription
    Off,
    /// Predict and detect speculative opportunities, log only
    #[default]
    Observe,
    /// Predict, detect and dispatch speculative opportunities
    Execute,
}

impl MempoolMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Off)
    }

    pub fn dispatches(&self) -> bool {
        matches!(self, Self::Execute)
    }
}

/// A pending transaction from the node's mempool
#[derive(Debug, Clone)]
pub struct PendingTx {
    pub hash: TxHash,
    pub to: Option<Address>,
    pub input: Bytes,
    pub max_priority_fee: Option<u128>,
    pub seen_at: Instant,
}

/// Which router family produced a decoded swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapProtocol {
    V2,
    V3,
}

/// Exact-input swap extracted from router calldata. Only the first hop of a
/// multi-hop path is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    /// e.g. "exactInputSingle", "multicall>exactInput"
    pub function_name: String,
    pub protocol: SwapProtocol,
    pub token_in: Address,
    pub token_out: Address,
    /// Fee tier in pips (V3 only)
    pub fee_tier: Option<u32>,
    pub amount_in: U256,
    /// Caller's minimum output; only meaningful for single-hop swaps
    pub amount_out_min: U256,
}

/// Predicted effect of a pending swap, written to the shadow overlay
#[derive(Debug, Clone)]
pub struct Prediction {
    pub pool: Address,
    pub trigger: TxHash,
    pub function_name: String,
    pub amount_in: U256,
    pub amount_out: U256,
    pub price_impact_bps: f64,
    /// Whether the prediction stacked on an earlier shadow entry
    pub stacked: bool,
    pub sequence: u64,
    pub expires_at: Instant,
}

/// Predictor counters, shared across clones
#[derive(Debug, Default)]
pub struct PredictorStats {
    pub seen: AtomicU64,
    pub decode_failures: AtomicU64,
    pub unresolved: AtomicU64,
    pub predicted: AtomicU64,
    pub included: AtomicU64,
}

/// Point-in-time copy of `PredictorStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictorCounts {
    pub seen: u64,
    pub decode_failures: u64,
    pub unresolved: u64,
    pub predicted: u64,
    pub included: u64,
}

impl PredictorStats {
    pub fn counts(&self) -> PredictorCounts {
        PredictorCounts {
            seen: self.seen.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            predicted: self.predicted.load(Ordering::Relaxed),
            included: self.included.load(Ordering::Relaxed),
        }
    }
}
