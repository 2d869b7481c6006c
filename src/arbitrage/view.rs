//! State Views
//!
//! What the detector reads. A view is materialized once per detection cycle:
//! `CanonicalView` copies the manager's snapshot; `SpeculativeView` lays the
//! newest unexpired shadow entries over it. Each pool is read atomically;
//! cross-pool consistency is not attempted.
//!
//! Created: 2026-02-03

use alloy::primitives::{Address, TxHash, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::mempool::ShadowOverlay;
use crate::pool::{PoolStateManager, PriceCalculator};
use crate::types::{OpportunitySource, Pool, PoolState};

/// Where a speculative state came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMeta {
    pub trigger: TxHash,
    pub expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ViewEntry {
    pub pool: Arc<Pool>,
    pub state: PoolState,
    /// Set when `state` is a prediction rather than canonical
    pub shadow: Option<ShadowMeta>,
}

pub trait StateView: Send + Sync {
    fn source(&self) -> OpportunitySource;

    fn entry(&self, pool: &Address) -> Option<&ViewEntry>;

    /// Pools whose state in this view is a prediction
    fn shadowed_pools(&self) -> Vec<Address>;

    /// Exact-input quote against this view. `None` = route unavailable.
    fn quote_exact_input(&self, pool: &Address, token_in: Address, amount_in: U256) -> Option<U256> {
        let entry = self.entry(pool)?;
        PriceCalculator::simulate_swap(&entry.pool, &entry.state, token_in, amount_in).map(|(out, _)| out)
    }
}

fn canonical_entries(manager: &PoolStateManager) -> HashMap<Address, ViewEntry> {
    manager
        .snapshot_all()
        .into_iter()
        .map(|(addr, snap)| {
            (
                addr,
                ViewEntry {
                    pool: snap.pool,
                    state: snap.state,
                    shadow: None,
                },
            )
        })
        .collect()
}

/// Confirmed state only
pub struct CanonicalView {
    entries: HashMap<Address, ViewEntry>,
}

impl CanonicalView {
    pub fn new(manager: &PoolStateManager) -> Self {
        Self {
            entries: canonical_entries(manager),
        }
    }
}

impl StateView for CanonicalView {
    fn source(&self) -> OpportunitySource {
        OpportunitySource::Confirmed
    }

    fn entry(&self, pool: &Address) -> Option<&ViewEntry> {
        self.entries.get(pool)
    }

    fn shadowed_pools(&self) -> Vec<Address> {
        Vec::new()
    }
}

/// Unexpired shadow entries merged over canonical state
pub struct SpeculativeView {
    entries: HashMap<Address, ViewEntry>,
    shadowed: Vec<Address>,
}

impl SpeculativeView {
    pub fn new(manager: &PoolStateManager, overlay: &ShadowOverlay) -> Self {
        Self::at(manager, overlay, Instant::now())
    }

    pub fn at(manager: &PoolStateManager, overlay: &ShadowOverlay, now: Instant) -> Self {
        let mut entries = canonical_entries(manager);
        let mut shadowed = Vec::new();
        for (addr, shadow) in overlay.snapshot_at(now) {
            if let Some(entry) = entries.get_mut(&addr) {
                entry.state = shadow.state;
                entry.shadow = Some(ShadowMeta {
                    trigger: shadow.trigger,
                    expires_at: shadow.expires_at,
                });
                shadowed.push(addr);
            }
        }
        Self { entries, shadowed }
    }
}

impl StateView for SpeculativeView {
    fn source(&self) -> OpportunitySource {
        OpportunitySource::Speculative
    }

    fn entry(&self, pool: &Address) -> Option<&ViewEntry> {
        self.entries.get(pool)
    }

    fn shadowed_pools(&self) -> Vec<Address> {
        self.shadowed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DexVariant, VersionToken};
    use alloy::primitives::{address, b256};
    use std::time::Duration;

    #[test]
    fn test_speculative_view_overlays_only_live_entries() {
        let manager = PoolStateManager::new();
        let pool_addr = address!("853ee4b2a13f8a742d64c8f088be7ba2131f670d");
        manager
            .register(
                Pool {
                    address: pool_addr,
                    variant: DexVariant::ConstantProduct,
                    token0: address!("2791bca1f2de4661ed88a30c99a7a9449aa84174"),
                    token1: address!("7ceb23fd6bc0add59e62ac25578270cff1b9f619"),
                    fee: 3000,
                    tick_spacing: 0,
                    dex: "QuickSwapV2".into(),
                    label: "WETH/USDC".into(),
                },
                PoolState::ConstantProduct {
                    reserve0: U256::from(100u64),
                    reserve1: U256::from(100u64),
                },
                VersionToken::snapshot_at(1),
            )
            .unwrap();

        let overlay = ShadowOverlay::new();
        let t0 = Instant::now();
        let predicted = PoolState::ConstantProduct {
            reserve0: U256::from(150u64),
            reserve1: U256::from(67u64),
        };
        overlay.insert(
            pool_addr,
            predicted.clone(),
            b256!("00000000000000000000000000000000000000000000000000000000000000aa"),
            Duration::from_secs(2),
            t0,
        );

        let live = SpeculativeView::at(&manager, &overlay, t0);
        assert_eq!(live.source(), OpportunitySource::Speculative);
        assert_eq!(live.shadowed_pools(), vec![pool_addr]);
        assert_eq!(live.entry(&pool_addr).unwrap().state, predicted);

        let expired = SpeculativeView::at(&manager, &overlay, t0 + Duration::from_secs(2));
        assert!(expired.shadowed_pools().is_empty());
        assert!(expired.entry(&pool_addr).unwrap().shadow.is_none());

        let canonical = CanonicalView::new(&manager);
        assert_eq!(canonical.source(), OpportunitySource::Confirmed);
        assert_ne!(canonical.entry(&pool_addr).unwrap().state, predicted);
    }
}
