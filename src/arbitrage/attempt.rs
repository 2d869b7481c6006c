//! Execution Attempts
//!
//! One attempt per dispatched opportunity, owned by the executor task that
//! runs it. Status moves forward only:
//!
//! ```text
//! Built → Signed → Submitted → ConfirmedSuccess | ConfirmedRevert | Dropped
//! Built | Signed → Abandoned
//! ```
//!
//! Created: 2026-02-05

use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use std::fmt;

use super::executor::ExecutionStrategy;
use crate::error::ArbError;
use crate::types::{OpportunitySource, RouteKey};

/// Where a transaction landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPosition {
    pub block_number: u64,
    pub transaction_index: u64,
}

impl fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.block_number, self.transaction_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// Output fell below the minimum the transaction demanded
    Slippage(String),
    Other(String),
}

impl RevertReason {
    /// Classify a decoded revert message
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let slippage = ["insufficientoutput", "insufficient_output", "too little received", "slippage", "below minimum"]
            .iter()
            .any(|needle| lower.contains(needle));
        if slippage {
            Self::Slippage(message)
        } else {
            Self::Other(message)
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Slippage(m) | Self::Other(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    Built,
    Signed,
    Submitted,
    ConfirmedSuccess,
    ConfirmedRevert(RevertReason),
    Dropped,
    Abandoned(ArbError),
}

impl AttemptStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Built => "Built",
            Self::Signed => "Signed",
            Self::Submitted => "Submitted",
            Self::ConfirmedSuccess => "ConfirmedSuccess",
            Self::ConfirmedRevert(_) => "ConfirmedRevert",
            Self::Dropped => "Dropped",
            Self::Abandoned(_) => "Abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConfirmedSuccess | Self::ConfirmedRevert(_) | Self::Dropped | Self::Abandoned(_)
        )
    }

    fn can_become(&self, next: &AttemptStatus) -> bool {
        use AttemptStatus::*;
        matches!(
            (self, next),
            (Built, Signed)
                | (Built, Abandoned(_))
                | (Signed, Submitted)
                | (Signed, Abandoned(_))
                | (Submitted, ConfirmedSuccess)
                | (Submitted, ConfirmedRevert(_))
                | (Submitted, Dropped)
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConfirmedRevert(reason) => write!(f, "ConfirmedRevert({})", reason.message()),
            Self::Abandoned(err) => write!(f, "Abandoned({})", err),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionAttempt {
    pub id: u64,
    pub route: RouteKey,
    pub strategy: ExecutionStrategy,
    pub quote_token: Address,
    pub amount_in: U256,
    pub expected_profit: U256,
    pub nonce: Option<u64>,
    pub priority_fee: u128,
    pub max_fee: u128,
    pub gas_limit: u64,
    pub tx_hash: Option<TxHash>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub inclusion: Option<BlockPosition>,
    pub trigger_hash: Option<TxHash>,
    pub trigger_position: Option<BlockPosition>,
    pub gas_used: Option<u64>,
}

impl ExecutionAttempt {
    pub fn new(id: u64, route: RouteKey, strategy: ExecutionStrategy) -> Self {
        Self {
            id,
            route,
            strategy,
            quote_token: Address::ZERO,
            amount_in: U256::ZERO,
            expected_profit: U256::ZERO,
            nonce: None,
            priority_fee: 0,
            max_fee: 0,
            gas_limit: 0,
            tx_hash: None,
            submitted_at: None,
            status: AttemptStatus::Built,
            inclusion: None,
            trigger_hash: None,
            trigger_position: None,
            gas_used: None,
        }
    }

    pub fn source(&self) -> OpportunitySource {
        self.route.source
    }

    pub fn transition(&mut self, next: AttemptStatus) -> Result<(), ArbError> {
        if !self.status.can_become(&next) {
            return Err(ArbError::IllegalTransition {
                from: self.status.name().to_string(),
                to: next.name().to_string(),
            });
        }
        if next == AttemptStatus::Submitted {
            self.submitted_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }

    /// Pre-submit exit. No-op once the attempt is terminal.
    pub fn abandon(&mut self, reason: ArbError) {
        if self.status.is_terminal() {
            return;
        }
        if self.transition(AttemptStatus::Abandoned(reason)).is_err() {
            // Submitted attempts can't be abandoned: they end as Dropped
            self.status = AttemptStatus::Dropped;
        }
    }

    /// The typed failure behind a terminal status, if any
    pub fn failure(&self) -> Option<ArbError> {
        match &self.status {
            AttemptStatus::ConfirmedRevert(RevertReason::Slippage(m)) => Some(ArbError::SlippageExceeded(m.clone())),
            AttemptStatus::ConfirmedRevert(RevertReason::Other(m)) => {
                Some(ArbError::InsufficientProfit(format!("reverted: {}", m)))
            }
            AttemptStatus::Dropped => self.tx_hash.map(ArbError::SubmissionTimeout),
            AttemptStatus::Abandoned(err) => Some(err.clone()),
            _ => None,
        }
    }
}
