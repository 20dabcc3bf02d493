//! Confirmation waiter: submit once, then poll for inclusion
//!
//! A polling timeout never triggers a resubmission. If the first transaction is
//! merely slow, a second one would execute twice; the caller decides whether a
//! fresh request with different gas is warranted.

use super::GasPolicy;
use crate::chain::{ChainClient, Receipt, ReceiptStatus, TxCall};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::metrics;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::H256;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded receipt poller shared by every executor
#[derive(Debug, Clone)]
pub struct ConfirmationWaiter {
    poll_interval: Duration,
    max_attempts: u32,
}

impl ConfirmationWaiter {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Submit `call` and block until it is mined.
    ///
    /// A reverted receipt is returned as [`OrchestratorError::Revert`].
    pub async fn submit_and_confirm(
        &self,
        client: &dyn ChainClient,
        call: &TxCall,
        signer: &LocalWallet,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<Receipt> {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled {
                operation: format!("preparing {}", call.label),
            });
        }

        let tx_hash = client.submit(call, signer, gas).await?;
        metrics::record_tx_submitted(client.chain_id(), call.label);

        let started = Instant::now();
        let receipt = self.wait(client, tx_hash, call.label, cancel).await?;
        metrics::record_tx_latency(client.chain_id(), started.elapsed().as_secs_f64());

        if receipt.status == ReceiptStatus::Reverted {
            metrics::record_tx_reverted(client.chain_id(), call.label);
            let reason = client
                .revert_reason(call, signer.address(), receipt.block_number)
                .await;
            warn!(
                "{} {:?} reverted in block {}: {}",
                call.label,
                tx_hash,
                receipt.block_number,
                reason.as_deref().unwrap_or("no reason given")
            );
            return Err(OrchestratorError::Revert {
                tx_hash: Some(tx_hash),
                code: None,
                reason,
            });
        }

        metrics::record_tx_confirmed(client.chain_id(), call.label);
        info!(
            "{} {:?} confirmed in block {} (gas used {})",
            call.label, tx_hash, receipt.block_number, receipt.gas_used
        );
        Ok(receipt)
    }

    /// Poll for the receipt of an already submitted transaction
    pub async fn wait(
        &self,
        client: &dyn ChainClient,
        tx_hash: H256,
        label: &str,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<Receipt> {
        let cancelled = || OrchestratorError::Cancelled {
            operation: format!("waiting for {} {:?}", label, tx_hash),
        };

        for attempt in 1..=self.max_attempts {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                polled = client.get_receipt(tx_hash) => polled?,
            };
            if let Some(receipt) = polled {
                return Ok(receipt);
            }

            debug!(
                "{} {:?} pending (poll {}/{})",
                label, tx_hash, attempt, self.max_attempts
            );

            if attempt == self.max_attempts {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        Err(OrchestratorError::Timeout {
            operation: format!("{} confirmation", label),
            tx_hash: Some(tx_hash),
        })
    }
}
