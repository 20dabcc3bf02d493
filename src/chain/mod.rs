//! Chain module - the client seam between orchestration and a JSON-RPC node
//!
//! This module provides:
//! - The [`ChainClient`] trait every component talks to
//! - An ethers-backed implementation with multi-RPC failover
//! - Human-readable ABI bindings for the router, tokens and bridge

pub mod contracts;
pub mod provider;

pub use provider::EthersChainClient;

use crate::error::OrchestratorResult;
use crate::tx::GasPolicy;

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, Log, H256, U256};

/// A contract call ready to be signed and submitted
#[derive(Debug, Clone, PartialEq)]
pub struct TxCall {
    /// Short name used in logs and timeout messages
    pub label: &'static str,
    pub to: Address,
    pub data: Bytes,
    /// Native value attached to the call (non-zero only for wraps)
    pub value: U256,
}

impl TxCall {
    pub fn new(label: &'static str, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            label,
            to,
            data: data.into(),
            value: U256::zero(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Receipt of a mined transaction
#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: H256,
    pub block_hash: H256,
    pub block_number: u64,
    pub gas_used: U256,
    pub status: ReceiptStatus,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub hash: H256,
    /// Unix seconds
    pub timestamp: u64,
}

/// Capabilities the orchestrator needs from one chain.
///
/// Implementations hold no mutable state besides the endpoint connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain ID reported by the endpoint at connect time
    fn chain_id(&self) -> u64;

    /// Sign `call` with `signer` and submit it once; returns the pending tx hash
    async fn submit(
        &self,
        call: &TxCall,
        signer: &LocalWallet,
        gas: &GasPolicy,
    ) -> OrchestratorResult<H256>;

    /// Receipt for a mined transaction, `None` while pending
    async fn get_receipt(&self, tx_hash: H256) -> OrchestratorResult<Option<Receipt>>;

    async fn get_block(&self, block_number: u64) -> OrchestratorResult<BlockInfo>;

    /// Read-only contract call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes>;

    async fn get_balance(&self, address: Address) -> OrchestratorResult<U256>;

    /// Replay a reverted call at its inclusion block to recover the revert string
    async fn revert_reason(&self, _call: &TxCall, _from: Address, _block: u64) -> Option<String> {
        None
    }
}
