//! DEX Arbitrage Engine
//!
//! Main entry point. Loads the TOML config and the pool whitelist, syncs
//! every whitelisted pool at one pinned block, then runs the event loop over
//! newHeads, pool logs and (when enabled) pending router transactions until
//! SIGINT/SIGTERM.
//!
//! Without PRIVATE_KEY the engine runs detection only.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-06 - Event-driven engine, log-driven state, speculative execution

use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use clap::Parser;
use dexarb_engine::arbitrage::{ArbitrageDetector, Executor, ExecutorConfig, RpcTransport};
use dexarb_engine::config::{load_private_key, EngineConfig};
use dexarb_engine::engine::{AlloyEventSource, Engine, EngineContext};
use dexarb_engine::error::ArbError;
use dexarb_engine::filters::WhitelistFilter;
use dexarb_engine::pool::{PoolStateManager, PoolSyncer};
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// DEX Arbitrage Engine
#[derive(Parser)]
#[command(name = "dexarb-engine")]
struct Args {
    /// Engine configuration (TOML)
    #[arg(short, long, env = "ENGINE_CONFIG", default_value = "config/engine.toml")]
    config: PathBuf,

    /// Pool whitelist (JSON)
    #[arg(short, long, env = "POOL_WHITELIST", default_value = "config/pools_whitelist.json")]
    whitelist: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Dry-run every route but never broadcast
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }

    info!("===========================================");
    info!("   DEX Arbitrage Engine");
    info!("===========================================");

    dotenv::dotenv().ok();
    let mut config = EngineConfig::load(&args.config)?;
    config.apply_env_overrides();
    if args.dry_run {
        config.execution.dry_run = true;
    }
    info!(
        "Configuration loaded from {} (chain_id: {}, mempool: {:?}, max_hops: {})",
        args.config.display(),
        config.network.chain_id,
        config.mempool.mode,
        config.detection.max_hops
    );

    let whitelist = WhitelistFilter::load(&args.whitelist)?;
    info!(
        "Whitelist loaded: {} active pools from {}",
        whitelist.active_pool_count(),
        args.whitelist.display()
    );

    info!("Connecting to {}...", &config.network.rpc_url[..40.min(config.network.rpc_url.len())]);
    let provider = Arc::new(
        ProviderBuilder::new()
            .connect(&config.network.rpc_url)
            .await
            .context("Failed to connect to node")?,
    );
    let node_chain = provider.get_chain_id().await.context("Failed to read chain id")?;
    if node_chain != config.network.chain_id {
        return Err(ArbError::ChainIdMismatch {
            expected: config.network.chain_id,
            actual: Some(node_chain),
        }
        .into());
    }

    // Initial sync: pinned block, one version for every pool
    let manager = PoolStateManager::new();
    let syncer = PoolSyncer::new(Arc::clone(&provider), config.network.bitmap_radius);
    let report = syncer.sync_into(&manager, whitelist.into_pools()).await?;
    if report.synced == 0 {
        anyhow::bail!("No pools synced at block {}", report.block);
    }

    let detector = Arc::new(ArbitrageDetector::new(
        &config.detection,
        config.network.wrapped_native,
        &config.quote_tokens,
        &manager.pools(),
    )?);

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let executor = match load_private_key() {
        Ok(key) => {
            let signer: PrivateKeySigner = key.trim().parse().context("Invalid PRIVATE_KEY")?;
            let transport = Arc::new(RpcTransport::new(Arc::clone(&provider)));
            let executor = Executor::new(
                ExecutorConfig::from_engine(&config),
                transport,
                signer,
                Arc::clone(&detector),
                outcome_tx,
            )
            .await?;
            Some(Arc::new(executor))
        }
        Err(_) => {
            warn!("PRIVATE_KEY not set - detection only, nothing is executed");
            None
        }
    };

    // Outcome stream: tally terminal statuses
    let tally = tokio::spawn(async move {
        let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
        while let Some(attempt) = outcome_rx.recv().await {
            *counts.entry(attempt.status.name()).or_default() += 1;
        }
        counts
    });

    let config = Arc::new(config);
    let pool_addresses: Vec<_> = manager.pools().iter().map(|p| p.address).collect();
    let routers: HashSet<_> = if config.mempool.mode.is_active() {
        config.routers.iter().map(|r| r.address).collect()
    } else {
        HashSet::new()
    };
    let source = AlloyEventSource::new(Arc::clone(&provider), pool_addresses, routers);

    let ctx = Arc::new(EngineContext::new(Arc::clone(&config), manager, detector, executor));

    // SIGINT/SIGTERM → shutdown flag
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();
    tokio::spawn(async move {
        if let Some(sig) = signals.next().await {
            info!("Received signal {} - shutting down", sig);
            shutdown_tx.send_replace(true);
        }
    });

    let stats = Engine::new(Arc::clone(&ctx)).run(&source, shutdown_rx).await?;
    signals_handle.close();
    drop(ctx);

    let outcomes = tally.await.unwrap_or_default();
    info!(
        "Engine stopped: {} blocks, {} confirmed + {} speculative opportunities, {} dispatched | outcomes {:?}",
        stats.blocks,
        stats.confirmed_opportunities,
        stats.speculative_opportunities,
        stats.dispatched,
        outcomes
    );
    Ok(())
}
