//! DEX Arbitrage Engine Library
//!
//! Versioned pool state, mempool prediction into a shadow overlay, route
//! detection over confirmed and speculative state, and single-transaction
//! route execution.
//!
//! Created: 2026-01-28
//! Modified: 2026-02-06 - Engine, mempool predictor and route executor replace paper trading

pub mod arbitrage;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod filters;
pub mod mempool;
pub mod pool;
pub mod types;

// Re-export commonly used types
pub use arbitrage::{ArbitrageDetector, ExecutionAttempt, Executor};
pub use config::EngineConfig;
pub use engine::{ChainEvent, Engine, EngineContext, EventSource};
pub use error::ArbError;
pub use mempool::{MempoolPredictor, ShadowOverlay};
pub use pool::PoolStateManager;
pub use types::{Opportunity, OpportunitySource, Pool, PoolState};
