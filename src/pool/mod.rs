//! Pool management module
//!
//! Versioned canonical pool state, AMM math for both pool variants, and the
//! RPC/log synchronization that feeds them.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Address-keyed versioned cells, exact V3 math

pub mod calculator;
pub mod state;
pub mod syncer;
pub mod v3_math;

pub use calculator::PriceCalculator;
pub use state::{PoolStateManager, StoreStats, UpdateOutcome};
pub use syncer::{apply_pool_event, decode_pool_log, PoolEvent, PoolLogEvent, PoolSyncer};
