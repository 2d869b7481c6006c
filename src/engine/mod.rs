//! Engine
//!
//! Event-driven orchestration in the Collector → Strategy → Executor shape:
//! an `EventSource` produces `ChainEvent`s, the engine applies them to
//! canonical state or the predictor, runs the matching detection cycle, and
//! dispatches ranked opportunities to executor tasks.
//!
//! Shutdown is a `watch` flag. The event loop stops reading on the flag (or
//! when the source ends) and then awaits every in-flight executor task.
//!
//! Created: 2026-01-28
//! Modified: 2026-02-06 - Single event loop over blocks, pool logs and pending txs

pub mod collector;

use alloy::primitives::TxHash;
use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::arbitrage::{rank, ArbitrageDetector, CanonicalView, Executor, GasPricing, SpeculativeView};
use crate::config::EngineConfig;
use crate::error::ArbError;
use crate::mempool::{MempoolPredictor, PendingTx, ShadowOverlay, SkipReason};
use crate::pool::{apply_pool_event, PoolLogEvent, PoolStateManager, UpdateOutcome};
use crate::types::{BlockHeader, Opportunity};

pub use collector::{AlloyEventSource, ChannelEventSource};

/// Everything the engine reacts to
#[derive(Debug, Clone)]
pub enum ChainEvent {
    NewBlock(BlockHeader),
    PoolLog(PoolLogEvent),
    PendingTx(PendingTx),
    /// Transactions mined in the latest block
    Included(Vec<TxHash>),
}

/// A stream of events emitted by an `EventSource`
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = ChainEvent> + Send + 'a>>;

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn events(&self) -> Result<EventStream<'_>>;
}

/// Shared state handed to the engine and, through `Arc`s, to executor tasks
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub manager: PoolStateManager,
    pub predictor: Arc<MempoolPredictor>,
    pub detector: Arc<ArbitrageDetector>,
    /// `None` runs detection only
    pub executor: Option<Arc<Executor>>,
    header: watch::Sender<BlockHeader>,
}

impl EngineContext {
    /// The predictor indexes the pools already registered in `manager`, so
    /// build this after the initial sync.
    pub fn new(
        config: Arc<EngineConfig>,
        manager: PoolStateManager,
        detector: Arc<ArbitrageDetector>,
        executor: Option<Arc<Executor>>,
    ) -> Self {
        let predictor = MempoolPredictor::new(
            manager.clone(),
            ShadowOverlay::new(),
            config.router_table(),
            config.mempool.shadow_ttl(),
        );
        let (header, _) = watch::channel(BlockHeader::default());
        Self {
            config,
            manager,
            predictor: Arc::new(predictor),
            detector,
            executor,
            header,
        }
    }

    pub fn latest_header(&self) -> BlockHeader {
        *self.header.borrow()
    }

    pub fn subscribe_headers(&self) -> watch::Receiver<BlockHeader> {
        self.header.subscribe()
    }

    pub fn gas_pricing(&self) -> GasPricing {
        GasPricing {
            base_fee: self.latest_header().base_fee_per_gas,
            priority_fee: self.config.execution.priority_fee_wei as u128,
        }
    }
}

/// Event loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub blocks: u64,
    pub logs_applied: u64,
    pub logs_stale: u64,
    pub logs_rejected: u64,
    pub pending_seen: u64,
    pub predictions: u64,
    pub included: u64,
    pub confirmed_opportunities: u64,
    pub speculative_opportunities: u64,
    pub dispatched: u64,
}

pub struct Engine {
    ctx: Arc<EngineContext>,
    stats: EngineStats,
    tasks: JoinSet<()>,
}

impl Engine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            stats: EngineStats::default(),
            tasks: JoinSet::new(),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Consume `source` until it ends or `shutdown` flips to true
    pub async fn run(mut self, source: &dyn EventSource, mut shutdown: watch::Receiver<bool>) -> Result<EngineStats> {
        let mut events = source.events().await?;
        let stats_every = Duration::from_secs(self.ctx.config.network.stats_interval_secs.max(1));
        let mut stats_tick = tokio::time::interval_at(tokio::time::Instant::now() + stats_every, stats_every);

        info!(
            "Engine running: {} pools, {} routes, mempool {:?}, executor {}",
            self.ctx.manager.len(),
            self.ctx.detector.route_count(),
            self.ctx.config.mempool.mode,
            if self.ctx.executor.is_some() { "enabled" } else { "disabled" }
        );

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Shutdown requested, draining {} executor tasks", self.tasks.len());
                            break;
                        }
                    }
                    event = events.next() => match event {
                        Some(event) => self.handle(event),
                        None => {
                            warn!("Event stream ended");
                            break;
                        }
                    },
                    Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                        if let Err(e) = joined {
                            error!("Executor task failed: {}", e);
                        }
                    }
                    _ = stats_tick.tick() => self.log_stats(),
                }
            }
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("Executor task failed: {}", e);
            }
        }
        self.log_stats();
        Ok(self.stats)
    }

    /// Apply one event. Detection is synchronous; only executor tasks await.
    pub fn handle(&mut self, event: ChainEvent) {
        match event {
            ChainEvent::NewBlock(header) => self.on_block(header),
            ChainEvent::PoolLog(log) => self.on_pool_log(&log),
            ChainEvent::PendingTx(tx) => self.on_pending(&tx),
            ChainEvent::Included(hashes) => {
                let removed = self.ctx.predictor.on_included(&hashes);
                self.stats.included += removed as u64;
                if removed > 0 {
                    debug!("{} shadow entries confirmed on-chain", removed);
                }
            }
        }
    }

    fn on_block(&mut self, header: BlockHeader) {
        self.ctx.header.send_replace(header);
        self.stats.blocks += 1;

        let swept = self.ctx.predictor.sweep();
        if swept > 0 {
            trace!("Block {}: swept {} expired shadow entries", header.number, swept);
        }
        if let Some(executor) = &self.ctx.executor {
            executor.on_block(header.number);
            if executor.has_orphaned_nonces() {
                let executor = Arc::clone(executor);
                self.tasks.spawn(async move {
                    executor.refresh_nonces().await;
                });
            }
        }

        let view = CanonicalView::new(&self.ctx.manager);
        let mut opportunities = self.ctx.detector.detect(&view, self.ctx.gas_pricing());
        rank(&mut opportunities);
        self.stats.confirmed_opportunities += opportunities.len() as u64;
        self.dispatch(opportunities);
    }

    fn on_pool_log(&mut self, log: &PoolLogEvent) {
        match apply_pool_event(&self.ctx.manager, log) {
            UpdateOutcome::Applied => self.stats.logs_applied += 1,
            UpdateOutcome::Stale => {
                self.stats.logs_stale += 1;
                trace!("{} at {}", ArbError::StaleUpdate(log.pool), log.version);
            }
            UpdateOutcome::UnknownPool => trace!("{}", ArbError::UnknownPool(log.pool)),
            outcome => {
                self.stats.logs_rejected += 1;
                debug!("Pool log {:?} for {} at {} not applied", outcome, log.pool, log.version);
            }
        }
    }

    fn on_pending(&mut self, tx: &PendingTx) {
        let mode = self.ctx.config.mempool.mode;
        if !mode.is_active() {
            return;
        }
        self.stats.pending_seen += 1;

        let prediction = match self.ctx.predictor.on_pending(tx) {
            Ok(prediction) => prediction,
            Err(SkipReason::NotRouter) => return,
            Err(reason) => {
                trace!("Pending {} skipped: {:?}", tx.hash, reason);
                return;
            }
        };
        self.stats.predictions += 1;

        let view = SpeculativeView::new(&self.ctx.manager, self.ctx.predictor.overlay());
        let mut opportunities =
            self.ctx
                .detector
                .detect_touching(&view, self.ctx.gas_pricing(), &[prediction.pool]);
        rank(&mut opportunities);
        self.stats.speculative_opportunities += opportunities.len() as u64;

        if mode.dispatches() {
            self.dispatch(opportunities);
        } else if !opportunities.is_empty() {
            debug!(
                "Observe mode: {} speculative opportunities from {} not dispatched",
                opportunities.len(),
                tx.hash
            );
        }
    }

    /// One task per opportunity, in rank order. The executor's route guard
    /// turns duplicates into no-ops.
    fn dispatch(&mut self, opportunities: Vec<Opportunity>) {
        let Some(executor) = &self.ctx.executor else {
            return;
        };
        let header = self.ctx.latest_header();
        for opportunity in opportunities {
            let executor = Arc::clone(executor);
            self.stats.dispatched += 1;
            self.tasks.spawn(async move {
                executor.execute(opportunity, header).await;
            });
        }
    }

    fn log_stats(&self) {
        let store = self.ctx.manager.stats();
        let predictor = self.ctx.predictor.counts();
        let in_flight = self.ctx.executor.as_ref().map(|e| e.in_flight()).unwrap_or(0);
        info!(
            "📊 block {} | pools {} (blocks {}..{}) | logs {} applied {} stale | pending {} seen, {} predicted, {} decode failures | shadow {} | opps {} confirmed {} speculative | dispatched {} ({} in flight)",
            self.ctx.latest_header().number,
            store.pools,
            store.oldest_block,
            store.newest_block,
            self.stats.logs_applied,
            self.stats.logs_stale,
            predictor.seen,
            predictor.predicted,
            predictor.decode_failures,
            self.ctx.predictor.overlay().len(),
            self.stats.confirmed_opportunities,
            self.stats.speculative_opportunities,
            self.stats.dispatched,
            in_flight
        );
    }
}
