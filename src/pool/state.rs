//! Pool State Management
//!
//! Thread-safe, versioned storage for canonical pool state using DashMap.
//! Each pool lives in its own cell keyed by on-chain address; the DashMap entry
//! guard is the unit of synchronization, and writes apply only when the
//! incoming version is strictly newer than the stored one.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Address keying (symbol keys collided across fee tiers), version tokens

use alloy::primitives::{Address, U256};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

use super::calculator::PriceCalculator;
use crate::error::ArbError;
use crate::types::{Pool, PoolSnapshot, PoolState, VersionToken};

/// Result of a canonical write. Only `Applied` changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Version not newer than the stored one; no-op
    Stale,
    UnknownPool,
    /// Payload variant differs from the registered pool's variant
    VariantMismatch,
    /// Delta could not be applied to the current state (overflow, bad range)
    Rejected,
}

#[derive(Debug, Clone)]
struct PoolCell {
    pool: Arc<Pool>,
    state: PoolState,
    version: VersionToken,
}

impl PoolCell {
    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pool: Arc::clone(&self.pool),
            state: self.state.clone(),
            version: self.version,
        }
    }
}

/// Store statistics for periodic logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub pools: usize,
    pub applied_updates: u64,
    pub stale_updates: u64,
    pub oldest_block: u64,
    pub newest_block: u64,
}

/// Thread-safe pool state manager
///
/// Key is the pool address. Labels, DEX names and token pairs are never keys:
/// two fee tiers of the same pair are two distinct pools.
#[derive(Debug, Clone, Default)]
pub struct PoolStateManager {
    pools: Arc<DashMap<Address, PoolCell>>,
    applied: Arc<AtomicU64>,
    stale: Arc<AtomicU64>,
}

impl PoolStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool with its initial state. A second registration of the
    /// same address is a key collision.
    pub fn register(
        &self,
        pool: Pool,
        initial_state: PoolState,
        version: VersionToken,
    ) -> Result<(), ArbError> {
        let address = pool.address;
        if initial_state.variant() != pool.variant {
            return Err(ArbError::Config(format!(
                "pool {} registered as {} with {} state",
                address,
                pool.variant,
                initial_state.variant()
            )));
        }

        match self.pools.entry(address) {
            Entry::Occupied(existing) => {
                error!(
                    "Key collision: {} already registered as {}, rejecting {}",
                    address,
                    existing.get().pool,
                    pool
                );
                Err(ArbError::KeyCollision(address))
            }
            Entry::Vacant(slot) => {
                debug!("Registered pool {} at version {}", pool, version);
                slot.insert(PoolCell {
                    pool: Arc::new(pool),
                    state: initial_state,
                    version,
                });
                Ok(())
            }
        }
    }

    /// Identity + state + version, read atomically
    pub fn get(&self, address: &Address) -> Option<PoolSnapshot> {
        self.pools.get(address).map(|cell| cell.snapshot())
    }

    /// Pool identity only
    pub fn pool(&self, address: &Address) -> Option<Arc<Pool>> {
        self.pools.get(address).map(|cell| Arc::clone(&cell.pool))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.pools.contains_key(address)
    }

    /// Replace the state iff `version` is strictly newer than the stored one.
    pub fn update(
        &self,
        address: &Address,
        candidate: PoolState,
        version: VersionToken,
    ) -> UpdateOutcome {
        self.update_with(address, version, move |_| Some(candidate))
    }

    /// Compute the candidate from the current state under the cell guard.
    /// Used for delta events (Mint/Burn) that need the stored state.
    pub fn update_with<F>(&self, address: &Address, version: VersionToken, f: F) -> UpdateOutcome
    where
        F: FnOnce(&PoolState) -> Option<PoolState>,
    {
        let mut cell = match self.pools.get_mut(address) {
            Some(cell) => cell,
            None => return UpdateOutcome::UnknownPool,
        };

        if version <= cell.version {
            self.stale.fetch_add(1, Ordering::Relaxed);
            trace!(
                "Stale update for {}: incoming {} <= stored {}",
                address,
                version,
                cell.version
            );
            return UpdateOutcome::Stale;
        }

        let candidate = match f(&cell.state) {
            Some(candidate) => candidate,
            None => return UpdateOutcome::Rejected,
        };
        if candidate.variant() != cell.pool.variant {
            debug!(
                "Variant mismatch for {}: pool is {}, update is {}",
                address,
                cell.pool.variant,
                candidate.variant()
            );
            return UpdateOutcome::VariantMismatch;
        }

        cell.state = candidate;
        cell.version = version;
        self.applied.fetch_add(1, Ordering::Relaxed);
        UpdateOutcome::Applied
    }

    /// Per-pool atomic reads. Cross-pool consistency is not guaranteed.
    pub fn snapshot(&self, addresses: &[Address]) -> HashMap<Address, PoolSnapshot> {
        addresses
            .iter()
            .filter_map(|addr| self.get(addr).map(|snap| (*addr, snap)))
            .collect()
    }

    /// Snapshot of every registered pool
    pub fn snapshot_all(&self) -> HashMap<Address, PoolSnapshot> {
        self.pools
            .iter()
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect()
    }

    /// All registered pool identities
    pub fn pools(&self) -> Vec<Arc<Pool>> {
        self.pools
            .iter()
            .map(|entry| Arc::clone(&entry.value().pool))
            .collect()
    }

    /// Exact-input quote against canonical state. `None` means the route is
    /// unavailable (absent pool, empty liquidity, outside the known tick window).
    pub fn quote_exact_input(
        &self,
        address: &Address,
        token_in: Address,
        amount_in: U256,
    ) -> Option<U256> {
        let cell = self.pools.get(address)?;
        PriceCalculator::simulate_swap(&cell.pool, &cell.state, token_in, amount_in)
            .map(|(out, _)| out)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn applied_updates(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn stale_updates(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    /// Pools whose last applied version is more than `max_blocks` behind
    pub fn lagging_pools(&self, current_block: u64, max_blocks: u64) -> usize {
        self.pools
            .iter()
            .filter(|entry| current_block.saturating_sub(entry.value().version.block_number) > max_blocks)
            .count()
    }

    pub fn stats(&self) -> StoreStats {
        let blocks: Vec<u64> = self
            .pools
            .iter()
            .map(|entry| entry.value().version.block_number)
            .collect();

        StoreStats {
            pools: blocks.len(),
            applied_updates: self.applied_updates(),
            stale_updates: self.stale_updates(),
            oldest_block: blocks.iter().copied().min().unwrap_or(0),
            newest_block: blocks.iter().copied().max().unwrap_or(0),
        }
    }
}
