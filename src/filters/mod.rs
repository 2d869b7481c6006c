//! Pool filtering system
//!
//! Whitelist/blacklist loading for the pools the engine registers.
//! Loaded from config/pools_whitelist.json at startup.
//!
//! Created: 2026-01-29

pub mod whitelist;

pub use whitelist::{PoolStatus, PoolWhitelist, WhitelistFilter};
