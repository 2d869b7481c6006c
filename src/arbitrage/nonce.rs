//! Nonce Manager
//!
//! Hands out nonces at build time. Released nonces are reused lowest first;
//! a nonce is only taken back once the node confirms it never saw the
//! transaction that carried it.
//!
//! A transaction that outlives the receipt timeout while the node still
//! knows it leaves its nonce orphaned. `reconcile` settles orphans against
//! the chain nonce: mined ones are retired, evicted ones are released.
//!
//! Created: 2026-02-05
//! Modified: 2026-02-07 - Orphaned nonces reconciled against the chain nonce

use alloy::primitives::{Address, TxHash};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::transport::Transport;
use crate::error::ArbError;

#[derive(Debug, Default)]
struct NonceBook {
    next: u64,
    released: BTreeSet<u64>,
    live: HashSet<u64>,
    /// Live nonces whose transaction timed out but was still known
    orphans: BTreeMap<u64, TxHash>,
}

#[derive(Debug, Default)]
pub struct NonceManager {
    book: Mutex<NonceBook>,
}

impl NonceManager {
    /// Start from the account's pending nonce
    pub fn new(start: u64) -> Self {
        Self {
            book: Mutex::new(NonceBook {
                next: start,
                ..Default::default()
            }),
        }
    }

    fn book(&self) -> MutexGuard<'_, NonceBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reserve(&self) -> u64 {
        let mut book = self.book();
        let nonce = match book.released.pop_first() {
            Some(n) => n,
            None => {
                let n = book.next;
                book.next += 1;
                n
            }
        };
        book.live.insert(nonce);
        nonce
    }

    /// The transaction carrying `nonce` was mined (success or revert)
    pub fn consume(&self, nonce: u64) {
        let mut book = self.book();
        book.live.remove(&nonce);
        book.orphans.remove(&nonce);
    }

    /// Give back a nonce whose transaction never reached the node
    pub fn release(&self, nonce: u64) -> Result<(), ArbError> {
        let mut book = self.book();
        if !book.live.remove(&nonce) {
            return Err(ArbError::NonceInUse(nonce));
        }
        book.orphans.remove(&nonce);
        book.released.insert(nonce);
        debug!("Nonce {} released", nonce);
        Ok(())
    }

    /// Release `nonce` unless the node knows `hash`. A nonce whose signed
    /// transaction may still be pending stays out of circulation as an
    /// orphan until `reconcile` settles it.
    pub async fn reclaim(&self, nonce: u64, hash: Option<TxHash>, transport: &dyn Transport) -> bool {
        let known = match hash {
            None => false,
            Some(hash) => match transport.transaction_known(hash).await {
                Ok(known) => known,
                Err(e) => {
                    warn!("Nonce {}: could not check {} ({}), keeping it reserved", nonce, hash, e);
                    true
                }
            },
        };
        if known {
            if let Some(hash) = hash {
                let mut book = self.book();
                if book.live.contains(&nonce) {
                    book.orphans.insert(nonce, hash);
                }
            }
            return false;
        }
        self.release(nonce).is_ok()
    }

    /// Align with the chain nonce. Everything below it was mined (ours or
    /// external): live and orphaned entries are retired, released ones are
    /// gone for good.
    pub fn resync(&self, chain_nonce: u64) {
        let mut book = self.book();
        if chain_nonce > book.next {
            book.next = chain_nonce;
        }
        book.released = book.released.split_off(&chain_nonce);
        book.orphans = book.orphans.split_off(&chain_nonce);
        let before = book.live.len();
        book.live.retain(|&n| n >= chain_nonce);
        let retired = before - book.live.len();
        if retired > 0 {
            debug!("Nonce resync at {}: {} live nonces retired", chain_nonce, retired);
        }
    }

    /// Settle orphaned nonces: resync to the chain nonce, then release every
    /// remaining orphan whose transaction the node no longer knows. No-op
    /// without orphans. Returns the number of nonces released.
    pub async fn reconcile(&self, account: Address, transport: &dyn Transport) -> Result<usize, ArbError> {
        if self.orphan_count() == 0 {
            return Ok(0);
        }
        let chain_nonce = transport.nonce(account).await?;
        self.resync(chain_nonce);

        let orphans: Vec<(u64, TxHash)> = self.book().orphans.iter().map(|(&n, &h)| (n, h)).collect();
        let mut released = 0;
        for (nonce, hash) in orphans {
            if !transport.transaction_known(hash).await? && self.release(nonce).is_ok() {
                info!("Nonce {} released: {} evicted before inclusion", nonce, hash);
                released += 1;
            }
        }
        Ok(released)
    }

    pub fn orphan_count(&self) -> usize {
        self.book().orphans.len()
    }

    pub fn live_count(&self) -> usize {
        self.book().live.len()
    }

    pub fn released_count(&self) -> usize {
        self.book().released.len()
    }
}
