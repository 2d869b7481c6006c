//! Error Taxonomy
//!
//! Per-opportunity and per-attempt failures are local and recovered: the
//! opportunity is discarded or the attempt is marked terminal. Only
//! `ChainIdMismatch` and `KeyCollision` are invariant violations.
//!
//! Created: 2026-02-03

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArbError {
    /// Incoming pool-state version not newer than the stored one.
    #[error("stale update for pool {0}")]
    StaleUpdate(Address),

    /// Pending transaction does not match a known swap shape.
    #[error("pending tx {0} did not decode as a whitelisted swap")]
    DecodeFailure(TxHash),

    /// Dry-run rejected the route (or reported profit below threshold).
    #[error("insufficient profit at simulation: {0}")]
    InsufficientProfit(String),

    /// On-chain revert because output fell below the caller's minimum.
    #[error("slippage exceeded: {0}")]
    SlippageExceeded(String),

    /// A built transaction carried (or was signed for) the wrong chain id.
    #[error("chain id mismatch: expected {expected}, got {actual:?}")]
    ChainIdMismatch { expected: u64, actual: Option<u64> },

    /// No terminal outcome within the receipt timeout.
    #[error("submission timed out for {0}")]
    SubmissionTimeout(TxHash),

    /// Two registrations for the same pool address.
    #[error("pool key collision at {0}")]
    KeyCollision(Address),

    #[error("unknown pool {0}")]
    UnknownPool(Address),

    #[error("nonce {0} is already reserved")]
    NonceInUse(u64),

    #[error("illegal attempt transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// Dry-run passed but the executor never broadcasts
    #[error("dry-run only, not broadcast")]
    DryRun,

    /// Speculative trigger not mined before the opportunity expired
    #[error("opportunity expired: {0}")]
    Expired(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ArbError {
    /// Invariant violations surface as hard errors; everything else is local.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::ChainIdMismatch { .. } | Self::KeyCollision(_))
    }
}
