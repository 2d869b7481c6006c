//! Outbound Transport
//!
//! The executor's only view of the node: nonce, eth_call, raw submission,
//! receipts and "does the node know this hash". `RpcTransport` serves it from
//! an alloy provider; tests substitute an in-memory transport.
//!
//! Created: 2026-02-05

use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ArbError;

/// Result of an eth_call that reached the EVM
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success(Bytes),
    /// Revert data (possibly empty) and the node's message
    Revert { data: Bytes, message: String },
}

/// The parts of a receipt the executor acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    pub block_number: u64,
    pub transaction_index: u64,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ArbError>;

    /// Pending-state nonce for `address`
    async fn nonce(&self, address: Address) -> Result<u64, ArbError>;

    /// eth_call at `block` (latest when `None`)
    async fn call(&self, request: &TransactionRequest, block: Option<u64>) -> Result<CallOutcome, ArbError>;

    async fn send_raw(&self, raw: &[u8]) -> Result<TxHash, ArbError>;

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptInfo>, ArbError>;

    /// Whether the node has seen `hash` (pending or mined)
    async fn transaction_known(&self, hash: TxHash) -> Result<bool, ArbError>;
}

pub struct RpcTransport<P> {
    provider: Arc<P>,
}

impl<P: Provider> RpcTransport<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

fn transport_err(e: impl std::fmt::Display) -> ArbError {
    ArbError::Transport(e.to_string())
}

#[async_trait]
impl<P: Provider + 'static> Transport for RpcTransport<P> {
    async fn chain_id(&self) -> Result<u64, ArbError> {
        self.provider.get_chain_id().await.map_err(transport_err)
    }

    async fn nonce(&self, address: Address) -> Result<u64, ArbError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(transport_err)
    }

    async fn call(&self, request: &TransactionRequest, block: Option<u64>) -> Result<CallOutcome, ArbError> {
        let block = block.map(BlockId::number).unwrap_or_else(BlockId::latest);
        match self.provider.call(request.clone()).block(block).await {
            Ok(output) => Ok(CallOutcome::Success(output)),
            Err(e) => match e.as_error_resp() {
                // Execution reverted: the node answered with an error payload
                Some(payload) => Ok(CallOutcome::Revert {
                    data: payload.as_revert_data().unwrap_or_default(),
                    message: payload.message.to_string(),
                }),
                None => Err(transport_err(e)),
            },
        }
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<TxHash, ArbError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(transport_err)?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptInfo>, ArbError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(transport_err)?;
        Ok(receipt.and_then(|r| {
            Some(ReceiptInfo {
                block_number: r.block_number?,
                transaction_index: r.transaction_index?,
                success: r.status(),
                gas_used: r.gas_used,
                effective_gas_price: r.effective_gas_price,
            })
        }))
    }

    async fn transaction_known(&self, hash: TxHash) -> Result<bool, ArbError> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(transport_err)?;
        Ok(tx.is_some())
    }
}
