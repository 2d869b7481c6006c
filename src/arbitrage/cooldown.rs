//! Route Guard
//!
//! Admission control for route execution. A route (pools in hop order plus
//! the opportunity source) runs at most one attempt at a time. A failed route
//! sits out a window measured in blocks that grows fivefold per consecutive
//! failure up to a ceiling; a route that keeps hitting the ceiling without
//! ever succeeding is shut off until a success or restart.
//!
//! Window sequence with the stock settings: 10, 50, 250, 1250, then 1800
//! blocks. Any success clears the route's history.
//!
//! Created: 2026-01-31
//! Modified: 2026-02-05 - Keyed by pool route + source, in-flight guard

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::types::RouteKey;

/// Failure history of one route
struct CooldownEntry {
    last_failed_block: u64,
    cooldown_blocks: u64,
    failure_count: u32,
    success_count: u32,
    /// Failures that landed on the ceiling window
    max_cooldown_cycles: u32,
}

impl CooldownEntry {
    fn expires_at(&self) -> u64 {
        self.last_failed_block.saturating_add(self.cooldown_blocks)
    }
}

/// Reason `try_begin` turned a route away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteBlock {
    InFlight,
    CoolingDown { until_block: u64 },
    Blacklisted,
}

/// Window growth per consecutive failure
const ESCALATION_FACTOR: u64 = 5;

pub struct RouteCooldown {
    entries: HashMap<RouteKey, CooldownEntry>,
    in_flight: HashSet<RouteKey>,
    blacklist: HashSet<RouteKey>,
    initial_cooldown: u64,
    max_cooldown: u64,
    /// Ceiling hits without a success before the route is shut off; 0 disables
    max_strikes: u32,
}

impl RouteCooldown {
    /// `initial_cooldown` of 0 turns off backoff; the in-flight guard stays on.
    pub fn new(initial_cooldown: u64, max_cooldown: u64, max_strikes: u32) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashSet::new(),
            blacklist: HashSet::new(),
            initial_cooldown,
            max_cooldown: max_cooldown.max(initial_cooldown),
            max_strikes,
        }
    }

    pub fn check(&self, key: &RouteKey, current_block: u64) -> Option<RouteBlock> {
        if self.in_flight.contains(key) {
            return Some(RouteBlock::InFlight);
        }
        if self.initial_cooldown == 0 {
            return None;
        }
        if self.blacklist.contains(key) {
            return Some(RouteBlock::Blacklisted);
        }
        match self.entries.get(key) {
            Some(entry) if current_block < entry.expires_at() => Some(RouteBlock::CoolingDown {
                until_block: entry.expires_at(),
            }),
            _ => None,
        }
    }

    /// Claim the route for one attempt. Fails if it is in flight, cooling
    /// down or blacklisted.
    pub fn try_begin(&mut self, key: &RouteKey, current_block: u64) -> Result<(), RouteBlock> {
        if let Some(block) = self.check(key, current_block) {
            return Err(block);
        }
        self.in_flight.insert(key.clone());
        Ok(())
    }

    /// Release the in-flight claim without touching backoff (nothing was
    /// learned about the route, e.g. the opportunity expired before submit).
    pub fn release(&mut self, key: &RouteKey) {
        self.in_flight.remove(key);
    }

    /// Close the attempt as failed and widen the route's window.
    pub fn record_failure(&mut self, key: &RouteKey, block: u64) {
        self.in_flight.remove(key);
        if self.initial_cooldown == 0 || self.blacklist.contains(key) {
            return;
        }

        let entry = self.entries.entry(key.clone()).or_insert(CooldownEntry {
            last_failed_block: block,
            cooldown_blocks: 0,
            failure_count: 0,
            success_count: 0,
            max_cooldown_cycles: 0,
        });

        entry.failure_count += 1;
        entry.last_failed_block = block;

        // window = initial * 5^(n-1), clamped to the ceiling
        let escalated = self
            .initial_cooldown
            .saturating_mul(ESCALATION_FACTOR.saturating_pow(entry.failure_count.saturating_sub(1)));
        let new_cooldown = escalated.min(self.max_cooldown);
        if new_cooldown == self.max_cooldown {
            entry.max_cooldown_cycles += 1;
        }
        entry.cooldown_blocks = new_cooldown;

        if self.max_strikes > 0
            && entry.max_cooldown_cycles >= self.max_strikes
            && entry.success_count == 0
        {
            info!(
                "Route {} shut off: ceiling reached {} times, never succeeded ({} failures)",
                key, entry.max_cooldown_cycles, entry.failure_count
            );
            self.blacklist.insert(key.clone());
            return;
        }

        debug!(
            "Route {} backing off {} blocks after failure {} (ceiling hits {}/{})",
            key, entry.cooldown_blocks, entry.failure_count, entry.max_cooldown_cycles, self.max_strikes
        );
    }

    /// Close the attempt as successful; the route starts clean.
    pub fn record_success(&mut self, key: &RouteKey) {
        self.in_flight.remove(key);
        if self.blacklist.remove(key) {
            info!("Route {} back in service after a success", key);
        }
        if self.entries.remove(key).is_some() {
            debug!("Route {} backoff cleared", key);
        }
    }

    /// Forget routes whose window has passed
    pub fn cleanup(&mut self, current_block: u64) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| current_block < entry.expires_at());
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Block {}: {} route windows elapsed", current_block, removed);
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn blacklist_count(&self) -> usize {
        self.blacklist.len()
    }
}
