//! Shadow Overlay
//!
//! Predicted pool states from pending swaps, kept apart from canonical state.
//! Entries carry a trigger hash and an expiry; expired entries are treated as
//! absent on every read and evicted lazily, with `sweep` as the periodic pass.
//!
//! The overlay has its own DashMap and never touches the canonical store's
//! locks.
//!
//! Created: 2026-02-03

use alloy::primitives::{Address, TxHash};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::types::PoolState;

/// One predicted state for one pool
#[derive(Debug, Clone)]
pub struct ShadowEntry {
    pub state: PoolState,
    /// Overlay-wide receive order
    pub sequence: u64,
    pub trigger: TxHash,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl ShadowEntry {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Per-pool stacks of shadow entries, oldest first. Each entry was computed on
/// top of the one before it, so the newest unexpired entry is the prediction.
#[derive(Debug, Clone, Default)]
pub struct ShadowOverlay {
    entries: Arc<DashMap<Address, Vec<ShadowEntry>>>,
    sequence: Arc<AtomicU64>,
}

impl ShadowOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a predicted state for `pool` and return the stored entry.
    pub fn insert(
        &self,
        pool: Address,
        state: PoolState,
        trigger: TxHash,
        ttl: Duration,
        now: Instant,
    ) -> ShadowEntry {
        let entry = ShadowEntry {
            state,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            trigger,
            created_at: now,
            expires_at: now + ttl,
        };
        self.entries.entry(pool).or_default().push(entry.clone());
        entry
    }

    /// Newest unexpired entry for `pool`
    pub fn get(&self, pool: &Address) -> Option<ShadowEntry> {
        self.get_at(pool, Instant::now())
    }

    pub fn get_at(&self, pool: &Address, now: Instant) -> Option<ShadowEntry> {
        let newest = {
            let mut stack = self.entries.get_mut(pool)?;
            stack.retain(|e| !e.is_expired_at(now));
            stack.last().cloned()
        };
        if newest.is_none() {
            self.entries.remove_if(pool, |_, stack| stack.is_empty());
        }
        newest
    }

    /// Newest unexpired entry per shadowed pool
    pub fn snapshot_at(&self, now: Instant) -> HashMap<Address, ShadowEntry> {
        self.entries
            .iter()
            .filter_map(|item| {
                item.value()
                    .iter()
                    .rev()
                    .find(|e| !e.is_expired_at(now))
                    .map(|e| (*item.key(), e.clone()))
            })
            .collect()
    }

    /// Evict expired entries. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, stack| {
            let before = stack.len();
            stack.retain(|e| !e.is_expired_at(now));
            evicted += before - stack.len();
            !stack.is_empty()
        });
        if evicted > 0 {
            trace!("Shadow sweep evicted {} entries", evicted);
        }
        evicted
    }

    /// Drop entries whose trigger was mined, and anything stacked beneath
    /// them: canonical state now carries that swap. Returns the number removed.
    pub fn on_included(&self, hashes: &[TxHash]) -> usize {
        if hashes.is_empty() {
            return 0;
        }
        let mined: HashSet<&TxHash> = hashes.iter().collect();
        let mut removed = 0;
        self.entries.retain(|_, stack| {
            if let Some(idx) = stack.iter().rposition(|e| mined.contains(&e.trigger)) {
                let before = stack.len();
                stack.drain(..=idx);
                removed += before - stack.len();
            }
            !stack.is_empty()
        });
        removed
    }

    /// Total live (not yet evicted) entries
    pub fn len(&self) -> usize {
        self.entries.iter().map(|item| item.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
