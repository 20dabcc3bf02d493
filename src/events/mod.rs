//! Contract event extraction from confirmed receipts

use crate::chain::contracts::TransferInitiatedFilter;
use crate::chain::Receipt;
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::types::{Address, U256};
use tracing::debug;

/// Decoded `TransferInitiated` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInitiated {
    pub transfer_id: U256,
    pub token: Address,
    pub amount: U256,
    pub destination_chain_id: U256,
}

/// Find the initiation event emitted by `bridge` in `receipt`.
///
/// Its absence means the deployed bridge speaks a different protocol version;
/// that is reported as [`OrchestratorError::MissingEvent`] and never retried.
pub fn transfer_initiated(
    receipt: &Receipt,
    bridge: Address,
) -> OrchestratorResult<TransferInitiated> {
    let signature = TransferInitiatedFilter::signature();

    receipt
        .logs
        .iter()
        .filter(|log| log.address == bridge)
        .filter(|log| log.topics.first() == Some(&signature))
        .find_map(|log| {
            let raw = RawLog::from(log.clone());
            match TransferInitiatedFilter::decode_log(&raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!("Skipping undecodable TransferInitiated log: {}", e);
                    None
                }
            }
        })
        .map(|event| TransferInitiated {
            transfer_id: event.transfer_id,
            token: event.token,
            amount: event.amount,
            destination_chain_id: event.destination_chain_id,
        })
        .ok_or(OrchestratorError::MissingEvent {
            event: "TransferInitiated",
            tx_hash: receipt.tx_hash,
        })
}
