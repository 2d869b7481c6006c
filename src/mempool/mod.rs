//! Mempool Module
//!
//! Turn pending router transactions into short-lived predicted pool states.
//!
//! Architecture:
//!     types.rs       PendingTx, DecodedSwap, Prediction, MempoolMode, counters
//!     decoder.rs     Calldata → DecodedSwap (V2/V3 router functions, multicall)
//!     shadow.rs      ShadowOverlay: TTL'd predicted states, separate from canonical
//!     predictor.rs   Decode → resolve pool → simulate → write shadow entry
//!
//! Created: 2026-02-01
//! Modified: 2026-02-03 - Shadow overlay and predictor replace CSV observation

pub mod decoder;
pub mod predictor;
pub mod shadow;
pub mod types;

pub use predictor::{MempoolPredictor, SkipReason};
pub use shadow::{ShadowEntry, ShadowOverlay};
pub use types::{DecodedSwap, MempoolMode, PendingTx, Prediction, PredictorCounts};
