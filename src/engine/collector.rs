//! Event Collectors
//!
//! `AlloyEventSource` merges three pubsub subscriptions into one stream:
//! new heads (each followed by the block's transaction hashes), logs of the
//! registered pools, and full pending transactions addressed to a known
//! router. `ChannelEventSource` replays events pushed into an mpsc channel.
//!
//! Created: 2026-01-28
//! Modified: 2026-02-06 - Pubsub subscriptions replace interval polling

use alloy::consensus::Transaction as _;
use alloy::network::TransactionResponse;
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use super::{ChainEvent, EventSource, EventStream};
use crate::mempool::PendingTx;
use crate::pool::syncer::pool_event_topics;
use crate::pool::decode_pool_log;
use crate::types::BlockHeader;

/// Live chain events from a WebSocket or IPC provider
pub struct AlloyEventSource<P> {
    provider: Arc<P>,
    pools: Vec<Address>,
    /// Empty = no pending-transaction subscription
    routers: HashSet<Address>,
}

impl<P: Provider + 'static> AlloyEventSource<P> {
    pub fn new(provider: Arc<P>, pools: Vec<Address>, routers: HashSet<Address>) -> Self {
        Self {
            provider,
            pools,
            routers,
        }
    }
}

#[async_trait]
impl<P: Provider + 'static> EventSource for AlloyEventSource<P> {
    async fn events(&self) -> Result<EventStream<'_>> {
        let heads = self
            .provider
            .subscribe_blocks()
            .await
            .context("newHeads subscription failed")?
            .into_stream();

        let provider = Arc::clone(&self.provider);
        let blocks = heads
            .then(move |head| {
                let provider = Arc::clone(&provider);
                async move {
                    let mut events = vec![ChainEvent::NewBlock(BlockHeader {
                        number: head.number,
                        base_fee_per_gas: head.base_fee_per_gas.unwrap_or_default() as u128,
                        timestamp: head.timestamp,
                    })];
                    match provider.get_block_by_hash(head.hash).await {
                        Ok(Some(block)) => events.push(ChainEvent::Included(block.transactions.hashes().collect())),
                        Ok(None) => debug!("Block {} not found for inclusion check", head.hash),
                        Err(e) => debug!("Block {} fetch failed: {}", head.hash, e),
                    }
                    stream::iter(events)
                }
            })
            .flatten()
            .boxed();

        let filter = Filter::new()
            .address(self.pools.clone())
            .event_signature(pool_event_topics());
        let logs = self
            .provider
            .subscribe_logs(&filter)
            .await
            .context("logs subscription failed")?
            .into_stream()
            .filter_map(|log| async move { decode_pool_log(&log).map(ChainEvent::PoolLog) })
            .boxed();

        let mut streams = vec![blocks, logs];

        if !self.routers.is_empty() {
            let routers = self.routers.clone();
            let pending = self
                .provider
                .subscribe_full_pending_transactions()
                .await
                .context("pending transaction subscription failed")?
                .into_stream()
                .filter_map(move |tx| {
                    let event = tx.to().filter(|to| routers.contains(to)).map(|to| {
                        ChainEvent::PendingTx(PendingTx {
                            hash: tx.tx_hash(),
                            to: Some(to),
                            input: tx.input().clone(),
                            max_priority_fee: tx.max_priority_fee_per_gas(),
                            seen_at: Instant::now(),
                        })
                    });
                    async move { event }
                })
                .boxed();
            streams.push(pending);
        }

        info!(
            "Subscribed: newHeads, logs for {} pools{}",
            self.pools.len(),
            if self.routers.is_empty() {
                String::new()
            } else {
                format!(", pending txs to {} routers", self.routers.len())
            }
        );
        Ok(Box::pin(stream::select_all(streams)))
    }
}

/// Events pushed by the caller, for replay and tests. The stream can be
/// taken once.
pub struct ChannelEventSource {
    receiver: Mutex<Option<mpsc::Receiver<ChainEvent>>>,
}

impl ChannelEventSource {
    pub fn new(receiver: mpsc::Receiver<ChainEvent>) -> Self {
        Self {
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn events(&self) -> Result<EventStream<'_>> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| anyhow!("event source lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("event stream already taken"))?;
        Ok(Box::pin(ReceiverStream::new(receiver)))
    }
}
