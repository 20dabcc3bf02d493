//! Normalized record of a confirmed transaction

use crate::chain::{ChainClient, Receipt, ReceiptStatus};
use crate::error::OrchestratorResult;

use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Success,
    Reverted,
}

impl From<ReceiptStatus> for OutcomeStatus {
    fn from(status: ReceiptStatus) -> Self {
        match status {
            ReceiptStatus::Success => OutcomeStatus::Success,
            ReceiptStatus::Reverted => OutcomeStatus::Reverted,
        }
    }
}

/// Produced only after inclusion has been observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutcome {
    pub chain_id: u64,
    pub label: &'static str,
    pub hash: H256,
    pub block_hash: H256,
    pub block_number: u64,
    pub gas_used: U256,
    /// Unix seconds of the including block
    pub timestamp: u64,
    pub status: OutcomeStatus,
}

impl TransactionOutcome {
    /// Assemble an outcome, taking the timestamp from the block named in the receipt
    pub async fn resolve(
        client: &dyn ChainClient,
        label: &'static str,
        receipt: &Receipt,
    ) -> OrchestratorResult<Self> {
        let block = client.get_block(receipt.block_number).await?;
        if !receipt.block_hash.is_zero() && receipt.block_hash != block.hash {
            // the receipt's block was reorged out between the two reads
            warn!(
                "Block {} hash changed from {:?} to {:?}",
                block.number, receipt.block_hash, block.hash
            );
        }

        Ok(Self {
            chain_id: client.chain_id(),
            label,
            hash: receipt.tx_hash,
            block_hash: receipt.block_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            timestamp: block.timestamp,
            status: receipt.status.into(),
        })
    }

    /// Block time for display only
    pub fn block_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.timestamp).ok()?, 0)
    }
}
