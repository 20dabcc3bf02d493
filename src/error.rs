//! Error types for the chainswap orchestrator

use ethers::types::{Address, H256};
use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error on chain {chain_id}: {message}")]
    Network { chain_id: u64, message: String },

    #[error("RPC error on chain {chain_id}: {message}")]
    Rpc {
        chain_id: u64,
        code: Option<i64>,
        message: String,
    },

    #[error("Insufficient funds on chain {chain_id}: have {have}, need {need}")]
    InsufficientFunds {
        chain_id: u64,
        have: String,
        need: String,
    },

    #[error("Allowance error for token {token:?}: {message}")]
    Allowance { token: Address, message: String },

    #[error("Approval of token {token:?} reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    ApprovalReverted {
        token: Address,
        tx_hash: Option<H256>,
        reason: Option<String>,
    },

    #[error("Execution reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Revert {
        tx_hash: Option<H256>,
        code: Option<i64>,
        reason: Option<String>,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout {
        operation: String,
        tx_hash: Option<H256>,
    },

    #[error("Event {event} missing from receipt of {tx_hash:?}")]
    MissingEvent { event: &'static str, tx_hash: H256 },

    #[error("Cancelled while {operation}")]
    Cancelled { operation: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Wallet error: {0}")]
    Wallet(String),
}

impl OrchestratorError {
    /// Whether a caller may retry with a fresh request.
    ///
    /// Nothing is retried internally; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Network { .. } | OrchestratorError::Timeout { .. }
        )
    }

    /// Stable error kind name shown to CLI users
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "ValidationError",
            OrchestratorError::Config(_) => "ConfigError",
            OrchestratorError::Network { .. } => "NetworkError",
            OrchestratorError::Rpc { .. } => "RpcError",
            OrchestratorError::InsufficientFunds { .. } => "InsufficientFundsError",
            OrchestratorError::Allowance { .. } => "AllowanceError",
            OrchestratorError::ApprovalReverted { .. } => "ApprovalRevertedError",
            OrchestratorError::Revert { .. } => "RevertError",
            OrchestratorError::Timeout { .. } => "TimeoutError",
            OrchestratorError::MissingEvent { .. } => "MissingEventError",
            OrchestratorError::Cancelled { .. } => "CancelledError",
            OrchestratorError::InvalidParameter(_) => "InvalidParameterError",
            OrchestratorError::InvalidStateTransition { .. } => "InvalidStateTransitionError",
            OrchestratorError::Wallet(_) => "WalletError",
        }
    }

    /// Numeric JSON-RPC error code, when the node supplied one
    pub fn code(&self) -> Option<i64> {
        match self {
            OrchestratorError::Rpc { code, .. } | OrchestratorError::Revert { code, .. } => *code,
            _ => None,
        }
    }

    /// Contract-supplied revert reason, when available
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            OrchestratorError::Revert { reason, .. }
            | OrchestratorError::ApprovalReverted { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
