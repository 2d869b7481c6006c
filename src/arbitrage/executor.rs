//! Trade Executor
//!
//! Turns an `Opportunity` into one signed EIP-1559 transaction against the
//! route executor contract and follows it to a terminal status. Reverts and
//! drops are ordinary outcomes: they end the attempt, feed the route
//! cooldown and are published on the outcome channel.
//!
//! Strategy per opportunity:
//!     Direct:            build, sign, dry-run, submit if the dry-run clears the threshold
//!     ConfirmThenSubmit: wait for the speculative trigger to be mined, then Direct
//!     SkipSimulation:    submit immediately under a capped gas limit
//!
//! Created: 2026-01-28
//! Modified: 2026-02-05 - Single-transaction route execution, attempt state machine, nonce manager

use alloy::consensus::{SignableTransaction, Transaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Bytes, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol_types::{decode_revert_reason, SolCall, SolError};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::attempt::{AttemptStatus, BlockPosition, ExecutionAttempt, RevertReason};
use super::cooldown::RouteCooldown;
use super::detector::ArbitrageDetector;
use super::nonce::NonceManager;
use super::transport::{CallOutcome, Transport};
use crate::config::EngineConfig;
use crate::contracts::IArbExecutor;
use crate::error::ArbError;
use crate::types::{to_decimal, BlockHeader, DexVariant, Opportunity, OpportunitySource};

/// How speculative opportunities are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpeculativeMode {
    #[default]
    ConfirmThenSubmit,
    Direct,
    SkipSimulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Direct,
    ConfirmThenSubmit,
    SkipSimulation,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionStrategy::Direct => write!(f, "direct"),
            ExecutionStrategy::ConfirmThenSubmit => write!(f, "confirm-then-submit"),
            ExecutionStrategy::SkipSimulation => write!(f, "skip-sim"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyPolicy {
    pub speculative_mode: SpeculativeMode,
}

impl StrategyPolicy {
    pub fn choose(&self, opportunity: &Opportunity) -> ExecutionStrategy {
        match opportunity.source {
            OpportunitySource::Confirmed => ExecutionStrategy::Direct,
            OpportunitySource::Speculative => match self.speculative_mode {
                SpeculativeMode::ConfirmThenSubmit => ExecutionStrategy::ConfirmThenSubmit,
                SpeculativeMode::Direct => ExecutionStrategy::Direct,
                SpeculativeMode::SkipSimulation => ExecutionStrategy::SkipSimulation,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub chain_id: u64,
    pub contract: alloy::primitives::Address,
    pub priority_fee: u128,
    pub gas_limit: u64,
    pub skip_sim_gas_ceiling: u64,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    pub dry_run: bool,
    pub speculative_mode: SpeculativeMode,
    pub cooldown_initial_blocks: u64,
    pub cooldown_max_blocks: u64,
    pub cooldown_max_strikes: u32,
}

impl ExecutorConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        let exec = &config.execution;
        Self {
            chain_id: config.network.chain_id,
            contract: config.network.executor_contract,
            priority_fee: exec.priority_fee_wei as u128,
            gas_limit: exec.gas_limit,
            skip_sim_gas_ceiling: exec.skip_sim_gas_ceiling,
            receipt_timeout: Duration::from_secs(exec.receipt_timeout_secs),
            poll_interval: Duration::from_millis(exec.receipt_poll_ms),
            dry_run: exec.dry_run,
            speculative_mode: exec.speculative_mode,
            cooldown_initial_blocks: exec.cooldown_initial_blocks,
            cooldown_max_blocks: exec.cooldown_max_blocks,
            cooldown_max_strikes: exec.cooldown_max_strikes,
        }
    }
}

/// EIP-1559 fee cap: room for two base-fee doublings plus the tip
pub fn max_fee_per_gas(base_fee: u128, priority_fee: u128) -> u128 {
    base_fee.saturating_mul(2).saturating_add(priority_fee)
}

pub struct Executor {
    config: ExecutorConfig,
    transport: Arc<dyn Transport>,
    signer: PrivateKeySigner,
    nonces: NonceManager,
    cooldown: Mutex<RouteCooldown>,
    policy: StrategyPolicy,
    detector: Arc<ArbitrageDetector>,
    outcomes: mpsc::UnboundedSender<ExecutionAttempt>,
    next_id: AtomicU64,
}

impl Executor {
    /// Check the node's chain id, bind the signer to it and seed the nonce
    /// manager from the account's pending nonce.
    pub async fn new(
        config: ExecutorConfig,
        transport: Arc<dyn Transport>,
        signer: PrivateKeySigner,
        detector: Arc<ArbitrageDetector>,
        outcomes: mpsc::UnboundedSender<ExecutionAttempt>,
    ) -> Result<Self, ArbError> {
        let node_chain = transport.chain_id().await?;
        if node_chain != config.chain_id {
            error!("❌ Node chain id {} != configured {}", node_chain, config.chain_id);
            return Err(ArbError::ChainIdMismatch {
                expected: config.chain_id,
                actual: Some(node_chain),
            });
        }
        if let Some(bound) = signer.chain_id() {
            if bound != config.chain_id {
                error!("❌ Signer bound to chain {} != configured {}", bound, config.chain_id);
                return Err(ArbError::ChainIdMismatch {
                    expected: config.chain_id,
                    actual: Some(bound),
                });
            }
        }
        let signer = signer.with_chain_id(Some(config.chain_id));
        let start_nonce = transport.nonce(signer.address()).await?;

        if config.dry_run {
            info!("Executor in DRY RUN mode - routes are simulated, never broadcast");
        } else {
            warn!("⚠️ Executor in LIVE mode - trades will be executed!");
        }
        info!(
            "Executor: chain {} | wallet {} | nonce {} | contract {} | speculative={:?}",
            config.chain_id,
            signer.address(),
            start_nonce,
            config.contract,
            config.speculative_mode
        );

        Ok(Self {
            policy: StrategyPolicy {
                speculative_mode: config.speculative_mode,
            },
            cooldown: Mutex::new(RouteCooldown::new(
                config.cooldown_initial_blocks,
                config.cooldown_max_blocks,
                config.cooldown_max_strikes,
            )),
            nonces: NonceManager::new(start_nonce),
            config,
            transport,
            signer,
            detector,
            outcomes,
            next_id: AtomicU64::new(1),
        })
    }

    fn cooldown(&self) -> MutexGuard<'_, RouteCooldown> {
        self.cooldown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    pub fn policy(&self) -> StrategyPolicy {
        self.policy
    }

    /// Drop expired cooldown entries; call once per block
    pub fn on_block(&self, block: u64) {
        self.cooldown().cleanup(block);
    }

    /// Nonces left behind by timed-out submissions that the node still knew
    pub fn has_orphaned_nonces(&self) -> bool {
        self.nonces.orphan_count() > 0
    }

    /// Reconcile orphaned nonces with the account's chain nonce
    pub async fn refresh_nonces(&self) {
        match self.nonces.reconcile(self.signer.address(), self.transport.as_ref()).await {
            Ok(0) => {}
            Ok(released) => info!("{} orphaned nonces back in circulation", released),
            Err(e) => warn!("Nonce refresh failed: {}", e),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.cooldown().in_flight_count()
    }

    /// Run one opportunity to a terminal status. `None` when the route is
    /// in flight, cooling down or blacklisted: no attempt is created.
    pub async fn execute(&self, opportunity: Opportunity, header: BlockHeader) -> Option<ExecutionAttempt> {
        let key = opportunity.route_key();
        if let Err(block) = self.cooldown().try_begin(&key, header.number) {
            debug!("Route {} skipped: {:?}", key, block);
            return None;
        }

        let strategy = self.policy.choose(&opportunity);
        let mut attempt = ExecutionAttempt::new(self.next_id.fetch_add(1, Ordering::Relaxed), key.clone(), strategy);
        attempt.quote_token = opportunity.quote_token;
        attempt.amount_in = opportunity.amount_in;
        attempt.expected_profit = opportunity.net_profit;
        attempt.trigger_hash = opportunity.trigger.as_ref().map(|t| t.tx_hash);

        self.run(&mut attempt, &opportunity, header).await;

        {
            let mut cooldown = self.cooldown();
            match &attempt.status {
                AttemptStatus::ConfirmedSuccess => cooldown.record_success(&key),
                AttemptStatus::ConfirmedRevert(_) | AttemptStatus::Dropped => {
                    cooldown.record_failure(&key, header.number)
                }
                AttemptStatus::Abandoned(ArbError::InsufficientProfit(_)) => {
                    cooldown.record_failure(&key, header.number)
                }
                _ => cooldown.release(&key),
            }
        }

        self.report(&attempt);
        if self.outcomes.send(attempt.clone()).is_err() {
            debug!("Outcome receiver dropped; attempt #{} not published", attempt.id);
        }
        Some(attempt)
    }

    async fn run(&self, attempt: &mut ExecutionAttempt, opp: &Opportunity, header: BlockHeader) {
        if attempt.strategy == ExecutionStrategy::ConfirmThenSubmit {
            if let Err(e) = self.wait_for_trigger(attempt, opp).await {
                attempt.abandon(e);
                return;
            }
        } else if opp.is_expired_at(Instant::now()) {
            attempt.abandon(ArbError::Expired("shadow entry expired before build".into()));
            return;
        }

        // Build
        let nonce = self.nonces.reserve();
        attempt.nonce = Some(nonce);
        attempt.priority_fee = self.config.priority_fee;
        attempt.max_fee = max_fee_per_gas(header.base_fee_per_gas, self.config.priority_fee);
        attempt.gas_limit = match attempt.strategy {
            ExecutionStrategy::SkipSimulation => self.config.skip_sim_gas_ceiling,
            _ => self.config.gas_limit,
        };
        let min_profit = self
            .detector
            .min_profit_raw(opp.quote_token, opp.source)
            .unwrap_or(U256::ZERO);
        let tx = TxEip1559 {
            chain_id: self.config.chain_id,
            nonce,
            gas_limit: attempt.gas_limit,
            max_fee_per_gas: attempt.max_fee,
            max_priority_fee_per_gas: attempt.priority_fee,
            to: TxKind::Call(self.config.contract),
            value: U256::ZERO,
            access_list: Default::default(),
            input: route_calldata(opp, opp.min_amount_out(min_profit)),
        };

        // Sign
        let envelope = match self.sign(tx) {
            Ok(envelope) => envelope,
            Err(e) => {
                if e.is_invariant_violation() {
                    error!("❌ Attempt #{} aborted: {}", attempt.id, e);
                }
                attempt.abandon(e);
                self.release_nonce(nonce, None).await;
                return;
            }
        };
        let hash = *envelope.tx_hash();
        attempt.tx_hash = Some(hash);
        if let Err(e) = attempt.transition(AttemptStatus::Signed) {
            error!("Attempt #{}: {}", attempt.id, e);
            return;
        }

        let request = TransactionRequest::from_transaction_with_sender(envelope.clone(), self.signer.address());

        // Dry-run
        if attempt.strategy == ExecutionStrategy::SkipSimulation {
            let worst_case = U256::from(attempt.gas_limit) * U256::from(attempt.max_fee);
            warn!(
                "🎲 SKIP-SIM gamble #{} {} | worst case {} native (gas ceiling {} × max fee {} wei)",
                attempt.id,
                attempt.route,
                to_decimal(worst_case, 18),
                attempt.gas_limit,
                attempt.max_fee
            );
        } else if let Err(e) = self.dry_run(&request, opp).await {
            debug!("Attempt #{} dry-run rejected: {}", attempt.id, e);
            attempt.abandon(e);
            self.release_nonce(nonce, Some(hash)).await;
            return;
        }

        if self.config.dry_run {
            attempt.abandon(ArbError::DryRun);
            self.release_nonce(nonce, Some(hash)).await;
            return;
        }

        // Submit
        match self.transport.send_raw(&envelope.encoded_2718()).await {
            Ok(accepted) => {
                if accepted != hash {
                    warn!("Node returned {} for signed {}", accepted, hash);
                }
                if let Err(e) = attempt.transition(AttemptStatus::Submitted) {
                    error!("Attempt #{}: {}", attempt.id, e);
                    return;
                }
                info!(
                    "🚀 Submitted #{} {} | {} | nonce {} | tip {} max {}",
                    attempt.id, attempt.route, hash, nonce, attempt.priority_fee, attempt.max_fee
                );
            }
            Err(e) => {
                warn!("Submission of {} failed: {}", hash, e);
                attempt.abandon(e);
                self.release_nonce(nonce, Some(hash)).await;
                return;
            }
        }

        self.await_receipt(attempt, &request).await;
    }

    /// Sign with the chain id bound on both the transaction and the signer,
    /// then verify the envelope carries it.
    fn sign(&self, mut tx: TxEip1559) -> Result<TxEnvelope, ArbError> {
        let expected = self.config.chain_id;
        if tx.chain_id != expected {
            return Err(ArbError::ChainIdMismatch {
                expected,
                actual: Some(tx.chain_id),
            });
        }
        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx).map_err(|e| match e {
            alloy::signers::Error::TransactionChainIdMismatch { signer, .. } => ArbError::ChainIdMismatch {
                expected,
                actual: Some(signer),
            },
            other => ArbError::Signing(other.to_string()),
        })?;
        let envelope: TxEnvelope = tx.into_signed(sig).into();
        match envelope.chain_id() {
            Some(id) if id == expected => Ok(envelope),
            actual => Err(ArbError::ChainIdMismatch { expected, actual }),
        }
    }

    /// eth_call the signed request; the returned output must still clear
    /// the threshold after gas.
    async fn dry_run(&self, request: &TransactionRequest, opp: &Opportunity) -> Result<(), ArbError> {
        match self.transport.call(request, None).await? {
            CallOutcome::Success(output) => {
                let amount_out = IArbExecutor::executeRouteCall::abi_decode_returns(&output)
                    .map_err(|e| ArbError::InsufficientProfit(format!("undecodable dry-run output: {}", e)))?;
                let net = amount_out
                    .saturating_sub(opp.amount_in)
                    .saturating_sub(opp.gas_cost_quote);
                if self.detector.clears_threshold(opp.quote_token, opp.source, opp.amount_in, net) {
                    Ok(())
                } else {
                    Err(ArbError::InsufficientProfit(format!(
                        "dry-run out {} on {} in, net {}",
                        amount_out, opp.amount_in, net
                    )))
                }
            }
            CallOutcome::Revert { data, message } => Err(ArbError::InsufficientProfit(format!(
                "dry-run reverted: {}",
                decode_revert(&data, &message)
            ))),
        }
    }

    /// Poll the trigger's receipt until it is mined or the opportunity expires
    async fn wait_for_trigger(&self, attempt: &mut ExecutionAttempt, opp: &Opportunity) -> Result<(), ArbError> {
        let Some(trigger) = &opp.trigger else {
            return Ok(());
        };
        loop {
            match self.transport.receipt(trigger.tx_hash).await {
                Ok(Some(receipt)) => {
                    let position = BlockPosition {
                        block_number: receipt.block_number,
                        transaction_index: receipt.transaction_index,
                    };
                    debug!("Trigger {} mined at {}", trigger.tx_hash, position);
                    attempt.trigger_position = Some(position);
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => debug!("Trigger receipt poll failed: {}", e),
            }
            if Instant::now() + self.config.poll_interval >= trigger.expires_at {
                return Err(ArbError::Expired(format!("trigger {} not mined in time", trigger.tx_hash)));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn await_receipt(&self, attempt: &mut ExecutionAttempt, request: &TransactionRequest) {
        let (Some(hash), Some(nonce)) = (attempt.tx_hash, attempt.nonce) else {
            return;
        };
        let deadline = Instant::now() + self.config.receipt_timeout;

        let receipt = loop {
            match self.transport.receipt(hash).await {
                Ok(Some(receipt)) => break Some(receipt),
                Ok(None) => {}
                Err(e) => debug!("Receipt poll for {} failed: {}", hash, e),
            }
            if Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        };

        let next = match receipt {
            Some(receipt) => {
                self.nonces.consume(nonce);
                attempt.gas_used = Some(receipt.gas_used);
                attempt.inclusion = Some(BlockPosition {
                    block_number: receipt.block_number,
                    transaction_index: receipt.transaction_index,
                });
                if receipt.success {
                    AttemptStatus::ConfirmedSuccess
                } else {
                    let reason = self.replay_revert(request, receipt.block_number).await;
                    AttemptStatus::ConfirmedRevert(RevertReason::classify(reason))
                }
            }
            None => {
                if !self.nonces.reclaim(nonce, Some(hash), self.transport.as_ref()).await {
                    debug!("Nonce {} stays reserved: {} known to the node", nonce, hash);
                }
                AttemptStatus::Dropped
            }
        };
        if let Err(e) = attempt.transition(next) {
            error!("Attempt #{}: {}", attempt.id, e);
        }
    }

    /// Re-run the transaction at its inclusion block to recover the reason
    async fn replay_revert(&self, request: &TransactionRequest, block: u64) -> String {
        match self.transport.call(request, Some(block)).await {
            Ok(CallOutcome::Revert { data, message }) => decode_revert(&data, &message),
            Ok(CallOutcome::Success(_)) => "reverted on-chain, replay succeeded".to_string(),
            Err(e) => format!("reverted on-chain, replay failed: {}", e),
        }
    }

    async fn release_nonce(&self, nonce: u64, hash: Option<alloy::primitives::TxHash>) {
        self.nonces.reclaim(nonce, hash, self.transport.as_ref()).await;
    }

    fn report(&self, attempt: &ExecutionAttempt) {
        let decimals = self.detector.quote_decimals(&attempt.quote_token);
        let symbol = self.detector.quote_symbol(&attempt.quote_token);
        let profit = to_decimal(attempt.expected_profit, decimals);
        let trigger = match attempt.trigger_position {
            Some(pos) => format!(" | trigger @{}", pos),
            None => String::new(),
        };
        let inclusion = match attempt.inclusion {
            Some(pos) => format!(" @{}", pos),
            None => String::new(),
        };
        match &attempt.status {
            AttemptStatus::ConfirmedSuccess => info!(
                "✅ #{} {} [{}] confirmed{}{} | expected +{} {}",
                attempt.id, attempt.route, attempt.strategy, inclusion, trigger, profit, symbol
            ),
            AttemptStatus::Abandoned(e) if e.is_invariant_violation() => {
                error!("❌ #{} {} [{}] {}", attempt.id, attempt.route, attempt.strategy, attempt.status)
            }
            AttemptStatus::Abandoned(_) => debug!(
                "#{} {} [{}] {} | expected +{} {}",
                attempt.id, attempt.route, attempt.strategy, attempt.status, profit, symbol
            ),
            status => warn!(
                "#{} {} [{}] {}{}{} | expected +{} {}",
                attempt.id, attempt.route, attempt.strategy, status, inclusion, trigger, profit, symbol
            ),
        }
    }
}

fn route_calldata(opp: &Opportunity, min_amount_out: U256) -> Bytes {
    let hops = opp
        .hops
        .iter()
        .map(|hop| IArbExecutor::RouteHop {
            pool: hop.pool,
            tokenIn: hop.token_in,
            tokenOut: hop.token_out,
            concentrated: hop.variant == DexVariant::ConcentratedLiquidity,
        })
        .collect();
    IArbExecutor::executeRouteCall {
        hops,
        amountIn: opp.amount_in,
        minAmountOut: min_amount_out,
    }
    .abi_encode()
    .into()
}

/// Custom error, then Error(string)/Panic, then the node's message
pub fn decode_revert(data: &[u8], message: &str) -> String {
    if let Ok(err) = IArbExecutor::InsufficientOutput::abi_decode(data) {
        return format!("InsufficientOutput({}, {})", err.amountOut, err.minAmountOut);
    }
    if let Some(reason) = decode_revert_reason(data) {
        if !reason.is_empty() {
            return reason;
        }
    }
    if message.is_empty() {
        "unknown revert".to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::detector::ProfitThreshold;
    use crate::arbitrage::transport::mock::MockTransport;
    use crate::arbitrage::transport::ReceiptInfo;
    use crate::config::{DetectionConfig, QuoteTokenConfig};
    use crate::types::{Hop, TriggerInfo};
    use alloy::primitives::{address, b256, Address, TxHash};
    use alloy::sol_types::SolValue;
    use rust_decimal_macros::dec;

    const USDC: Address = address!("2791bca1f2de4661ed88a30c99a7a9449aa84174");
    const WETH: Address = address!("7ceb23fd6bc0add59e62ac25578270cff1b9f619");
    const POOL_A: Address = address!("45dda9cb7c25131df268515131f647d726f50608");
    const POOL_B: Address = address!("853ee4b2a13f8a742d64c8f088be7ba2131f670d");
    const TRIGGER: TxHash = b256!("4444444444444444444444444444444444444444444444444444444444444444");
    // Well-known anvil dev key #0
    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn detector() -> Arc<ArbitrageDetector> {
        let config = DetectionConfig {
            max_hops: 2,
            gas_per_swap: 150_000,
            gas_overhead: 60_000,
            base_latency_ms: 40,
            per_hop_latency_ms: 5,
            confirmed: ProfitThreshold {
                min_profit_bps: 10,
                min_profit_abs: dec!(1),
            },
            speculative: ProfitThreshold {
                min_profit_bps: 20,
                min_profit_abs: dec!(1),
            },
        };
        let quotes = vec![QuoteTokenConfig {
            symbol: "USDC".into(),
            address: USDC,
            decimals: 6,
            trade_sizes: vec![dec!(1000)],
            native_price: None,
        }];
        Arc::new(ArbitrageDetector::new(&config, Address::ZERO, &quotes, &[]).unwrap())
    }

    fn config(speculative_mode: SpeculativeMode) -> ExecutorConfig {
        ExecutorConfig {
            chain_id: 137,
            contract: address!("1111111111111111111111111111111111111111"),
            priority_fee: 30_000_000_000,
            gas_limit: 600_000,
            skip_sim_gas_ceiling: 400_000,
            receipt_timeout: Duration::from_millis(60),
            poll_interval: Duration::from_millis(5),
            dry_run: false,
            speculative_mode,
            cooldown_initial_blocks: 10,
            cooldown_max_blocks: 1800,
            cooldown_max_strikes: 3,
        }
    }

    fn signer() -> PrivateKeySigner {
        KEY.parse().unwrap()
    }

    fn opportunity(source: OpportunitySource) -> Opportunity {
        let trigger = match source {
            OpportunitySource::Confirmed => None,
            OpportunitySource::Speculative => Some(TriggerInfo {
                tx_hash: TRIGGER,
                pool: POOL_B,
                expires_at: Instant::now() + Duration::from_millis(100),
            }),
        };
        Opportunity {
            hops: vec![
                Hop {
                    pool: POOL_A,
                    variant: DexVariant::ConcentratedLiquidity,
                    token_in: USDC,
                    token_out: WETH,
                },
                Hop {
                    pool: POOL_B,
                    variant: DexVariant::ConstantProduct,
                    token_in: WETH,
                    token_out: USDC,
                },
            ],
            quote_token: USDC,
            amount_in: U256::from(1_000_000_000u64),
            expected_out: U256::from(1_025_000_000u64),
            gross_spread_bps: 250,
            gas_cost_quote: U256::from(10_000u64),
            net_profit: U256::from(24_990_000u64),
            estimated_latency: Duration::from_millis(50),
            source,
            trigger,
            detected_at: Instant::now(),
        }
    }

    fn header() -> BlockHeader {
        BlockHeader {
            number: 1_000,
            base_fee_per_gas: 50_000_000_000,
            timestamp: 0,
        }
    }

    fn success_receipt(success: bool) -> ReceiptInfo {
        ReceiptInfo {
            block_number: 1_001,
            transaction_index: 3,
            success,
            gas_used: 310_000,
            effective_gas_price: 80_000_000_000,
        }
    }

    fn dry_run_out(amount: u64) -> CallOutcome {
        CallOutcome::Success(U256::from(amount).abi_encode().into())
    }

    async fn executor(
        mock: &Arc<MockTransport>,
        mode: SpeculativeMode,
    ) -> (Executor, mpsc::UnboundedReceiver<ExecutionAttempt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn Transport> = mock.clone();
        let executor = Executor::new(config(mode), transport, signer(), detector(), tx)
            .await
            .unwrap();
        (executor, rx)
    }

    #[tokio::test]
    async fn test_no_submission_below_threshold() {
        let mock = Arc::new(MockTransport::new(137));
        // Dry-run returns just 0.5 USDC over input: below the 1 USDC floor
        mock.push_call(dry_run_out(1_000_500_000));
        let (executor, mut rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        assert!(matches!(attempt.status, AttemptStatus::Abandoned(ArbError::InsufficientProfit(_))));
        assert_eq!(mock.sent_count(), 0);
        // Nonce back in circulation
        assert_eq!(executor.nonces().live_count(), 0);
        assert_eq!(executor.nonces().released_count(), 1);
        assert_eq!(rx.recv().await.unwrap().id, attempt.id);
    }

    #[tokio::test]
    async fn test_direct_success_signs_for_chain() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        mock.state.lock().unwrap().auto_receipt = Some(success_receipt(true));
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        assert_eq!(attempt.status, AttemptStatus::ConfirmedSuccess);
        assert_eq!(attempt.strategy, ExecutionStrategy::Direct);
        assert_eq!(attempt.max_fee, 130_000_000_000);
        assert_eq!(attempt.inclusion.unwrap().block_number, 1_001);
        assert!(attempt.submitted_at.is_some());

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chain_id(), Some(137));
        assert_eq!(sent[0].gas_limit(), 600_000);
        assert_eq!(executor.nonces().live_count(), 0);
        assert_eq!(executor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_revert_maps_to_slippage_and_cools_route() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        mock.push_call(CallOutcome::Revert {
            data: IArbExecutor::InsufficientOutput {
                amountOut: U256::from(990u64),
                minAmountOut: U256::from(1_001u64),
            }
            .abi_encode()
            .into(),
            message: "execution reverted".into(),
        });
        mock.state.lock().unwrap().auto_receipt = Some(success_receipt(false));
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        assert!(matches!(attempt.status, AttemptStatus::ConfirmedRevert(RevertReason::Slippage(_))));
        assert!(matches!(attempt.failure(), Some(ArbError::SlippageExceeded(_))));
        // Replay ran at the inclusion block
        assert_eq!(mock.state.lock().unwrap().calls.last().unwrap().1, Some(1_001));

        // Route suppressed for the next block
        let mut next = header();
        next.number += 1;
        assert!(executor.execute(opportunity(OpportunitySource::Confirmed), next).await.is_none());
    }

    #[tokio::test]
    async fn test_no_receipt_is_dropped_and_nonce_kept() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        assert_eq!(attempt.status, AttemptStatus::Dropped);
        assert!(matches!(attempt.failure(), Some(ArbError::SubmissionTimeout(_))));
        // The node knows the hash: the nonce may still be used
        assert_eq!(executor.nonces().live_count(), 1);
        assert!(executor.has_orphaned_nonces());
    }

    #[tokio::test]
    async fn test_timed_out_nonce_retired_once_chain_moves_past() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        assert_eq!(attempt.status, AttemptStatus::Dropped);
        let stuck = attempt.nonce.unwrap();

        // Pending and unmined: refresh keeps it out of circulation
        executor.refresh_nonces().await;
        assert_eq!(executor.nonces().live_count(), 1);

        // Mined after the timeout
        mock.state.lock().unwrap().nonce = stuck + 1;
        executor.refresh_nonces().await;
        assert_eq!(executor.nonces().live_count(), 0);
        assert!(!executor.has_orphaned_nonces());
        assert_eq!(executor.nonces().reserve(), stuck + 1);
    }

    #[tokio::test]
    async fn test_evicted_nonce_released_on_refresh() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        let stuck = attempt.nonce.unwrap();

        mock.state.lock().unwrap().known.clear();
        executor.refresh_nonces().await;
        assert!(!executor.has_orphaned_nonces());
        assert_eq!(executor.nonces().released_count(), 1);
        assert_eq!(executor.nonces().reserve(), stuck);
    }

    #[tokio::test]
    async fn test_rejected_submission_releases_nonce() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        mock.state.lock().unwrap().reject_send = Some("nonce too low".into());
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        assert!(matches!(attempt.status, AttemptStatus::Abandoned(ArbError::Transport(_))));
        assert_eq!(executor.nonces().released_count(), 1);
    }

    #[tokio::test]
    async fn test_skip_simulation_caps_gas_and_skips_dry_run() {
        let mock = Arc::new(MockTransport::new(137));
        mock.state.lock().unwrap().auto_receipt = Some(success_receipt(true));
        let (executor, _rx) = executor(&mock, SpeculativeMode::SkipSimulation).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Speculative), header())
            .await
            .unwrap();
        assert_eq!(attempt.strategy, ExecutionStrategy::SkipSimulation);
        assert_eq!(attempt.status, AttemptStatus::ConfirmedSuccess);
        assert_eq!(attempt.gas_limit, 400_000);
        assert!(mock.state.lock().unwrap().calls.is_empty());
        assert_eq!(mock.sent()[0].gas_limit(), 400_000);
    }

    #[tokio::test]
    async fn test_confirm_then_submit_records_trigger_position() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        mock.state.lock().unwrap().auto_receipt = Some(success_receipt(true));
        mock.set_receipt(
            TRIGGER,
            ReceiptInfo {
                block_number: 1_000,
                transaction_index: 7,
                success: true,
                gas_used: 120_000,
                effective_gas_price: 0,
            },
        );
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Speculative), header())
            .await
            .unwrap();
        assert_eq!(attempt.strategy, ExecutionStrategy::ConfirmThenSubmit);
        assert_eq!(
            attempt.trigger_position,
            Some(BlockPosition {
                block_number: 1_000,
                transaction_index: 7
            })
        );
        assert_eq!(attempt.status, AttemptStatus::ConfirmedSuccess);
    }

    #[tokio::test]
    async fn test_unmined_trigger_expires_without_nonce() {
        let mock = Arc::new(MockTransport::new(137));
        let (executor, _rx) = executor(&mock, SpeculativeMode::ConfirmThenSubmit).await;

        let attempt = executor
            .execute(opportunity(OpportunitySource::Speculative), header())
            .await
            .unwrap();
        assert!(matches!(attempt.status, AttemptStatus::Abandoned(ArbError::Expired(_))));
        assert!(attempt.nonce.is_none());
        assert_eq!(mock.sent_count(), 0);
        // Expiry teaches nothing about the route
        assert!(executor
            .execute(opportunity(OpportunitySource::Speculative), header())
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_dry_run_mode_never_broadcasts() {
        let mock = Arc::new(MockTransport::new(137));
        mock.push_call(dry_run_out(1_020_000_000));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut cfg = config(SpeculativeMode::ConfirmThenSubmit);
        cfg.dry_run = true;
        let executor = Executor::new(cfg, mock.clone(), signer(), detector(), tx).await.unwrap();

        let attempt = executor
            .execute(opportunity(OpportunitySource::Confirmed), header())
            .await
            .unwrap();
        assert_eq!(attempt.status, AttemptStatus::Abandoned(ArbError::DryRun));
        assert_eq!(mock.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_chain_id_mismatch_is_fatal() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let wrong_node = Arc::new(MockTransport::new(1));
        let err = Executor::new(config(SpeculativeMode::Direct), wrong_node, signer(), detector(), tx.clone())
            .await
            .err()
            .unwrap();
        assert_eq!(
            err,
            ArbError::ChainIdMismatch {
                expected: 137,
                actual: Some(1)
            }
        );
        assert!(err.is_invariant_violation());

        let mock = Arc::new(MockTransport::new(137));
        let wrong_signer = signer().with_chain_id(Some(1));
        assert!(matches!(
            Executor::new(config(SpeculativeMode::Direct), mock.clone(), wrong_signer, detector(), tx.clone()).await,
            Err(ArbError::ChainIdMismatch { .. })
        ));

        // A transaction built for another chain never gets signed
        let executor = Executor::new(config(SpeculativeMode::Direct), mock, signer(), detector(), tx)
            .await
            .unwrap();
        let tx = TxEip1559 {
            chain_id: 1,
            ..Default::default()
        };
        assert!(matches!(executor.sign(tx), Err(ArbError::ChainIdMismatch { .. })));
    }

    #[test]
    fn test_strategy_policy() {
        let policy = StrategyPolicy {
            speculative_mode: SpeculativeMode::SkipSimulation,
        };
        assert_eq!(policy.choose(&opportunity(OpportunitySource::Confirmed)), ExecutionStrategy::Direct);
        assert_eq!(
            policy.choose(&opportunity(OpportunitySource::Speculative)),
            ExecutionStrategy::SkipSimulation
        );
    }

    #[test]
    fn test_decode_revert_reasons() {
        let custom = IArbExecutor::InsufficientOutput {
            amountOut: U256::from(1u8),
            minAmountOut: U256::from(2u8),
        }
        .abi_encode();
        assert_eq!(decode_revert(&custom, ""), "InsufficientOutput(1, 2)");

        let string_err = alloy::sol_types::Revert::from("Too little received").abi_encode();
        assert_eq!(decode_revert(&string_err, "execution reverted"), "Too little received");
        assert_eq!(decode_revert(&[], "execution reverted"), "execution reverted");
        assert_eq!(decode_revert(&[], ""), "unknown revert");
    }

    #[test]
    fn test_max_fee() {
        assert_eq!(max_fee_per_gas(50, 30), 130);
        assert_eq!(max_fee_per_gas(u128::MAX, 1), u128::MAX);
    }
}
