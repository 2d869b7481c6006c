//! Arbitrage Module
//!
//! Route detection over a state view, and single-transaction route execution
//! with per-route cooldown and nonce management.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-05 - Views, attempts, transport and nonce manager

pub mod attempt;
pub mod cooldown;
pub mod detector;
pub mod executor;
pub mod nonce;
pub mod transport;
pub mod view;

pub use attempt::{AttemptStatus, BlockPosition, ExecutionAttempt, RevertReason};
pub use cooldown::RouteCooldown;
pub use detector::{rank, ArbitrageDetector, GasPricing, PairGroup, ProfitThreshold};
pub use executor::{ExecutionStrategy, Executor, ExecutorConfig, SpeculativeMode, StrategyPolicy};
pub use nonce::NonceManager;
pub use transport::{CallOutcome, ReceiptInfo, RpcTransport, Transport};
pub use view::{CanonicalView, SpeculativeView, StateView};
