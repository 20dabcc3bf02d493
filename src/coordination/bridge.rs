//! Cross-chain swap driven through the bridge contracts
//!
//! Phases run strictly in order: approve the source bridge, initiate the
//! transfer, wait until the destination bridge reports it ready, claim it,
//! then swap the released token on the destination router. Nothing is rolled
//! back on failure. A transfer that fails after initiation leaves funds locked
//! on the source chain, and the returned [`BridgeFailure`] carries the
//! transfer ID so the remaining phases can be resumed.

use super::transfer::{ResumePoint, TransferPhase, TransferRecord};
use crate::actions::{ActionExecutor, ActionRequest, SwapParams};
use crate::chain::contracts::{ClaimTransferCall, InitiateTransferCall, IsTransferReadyCall};
use crate::chain::{ChainClient, TxCall};
use crate::config::BridgeConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events;
use crate::metrics;
use crate::tx::{ensure_allowance, ConfirmationWaiter, GasPolicy, TransactionOutcome};

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, U256};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Successful cross-chain swap
#[derive(Debug, Clone, Serialize)]
pub struct BridgeReport {
    pub record: TransferRecord,
    /// Every confirmed transaction on both chains, in submission order
    pub outcomes: Vec<TransactionOutcome>,
}

/// A cross-chain swap that stopped before `Complete`
#[derive(Debug, Error)]
#[error(
    "cross-chain swap failed during {}",
    .record.failed_at().map(TransferPhase::name).unwrap_or("Init")
)]
pub struct BridgeFailure {
    /// Phase is `Failed`; `transfer_id` is kept when it was obtained
    pub record: TransferRecord,
    /// Transactions confirmed before the failure
    pub outcomes: Vec<TransactionOutcome>,
    #[source]
    pub cause: OrchestratorError,
}

pub struct BridgeOrchestrator {
    source: Arc<dyn ChainClient>,
    destination: ActionExecutor,
    signer: LocalWallet,
    waiter: ConfirmationWaiter,
    source_bridge: Address,
    destination_bridge: Address,
    config: BridgeConfig,
}

impl BridgeOrchestrator {
    pub fn new(
        source: Arc<dyn ChainClient>,
        destination: ActionExecutor,
        signer: LocalWallet,
        waiter: ConfirmationWaiter,
        source_bridge: Address,
        destination_bridge: Address,
        config: BridgeConfig,
    ) -> Self {
        Self {
            source,
            destination,
            signer,
            waiter,
            source_bridge,
            destination_bridge,
            config,
        }
    }

    /// Run a cross-chain swap from the beginning
    pub async fn run(
        &self,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> Result<BridgeReport, BridgeFailure> {
        let record = TransferRecord::new(
            self.source.chain_id(),
            request.destination().map(|leg| leg.chain_id).unwrap_or_default(),
            request.token_in(),
            request.amount_in(),
        );
        self.drive(record, request, cancel).await
    }

    /// Continue a transfer initiated by an earlier run.
    ///
    /// Only the phases after `from` run: resuming at [`ResumePoint::Claimed`]
    /// skips the readiness poll and the claim.
    pub async fn resume(
        &self,
        request: &ActionRequest,
        transfer_id: U256,
        from: ResumePoint,
        cancel: &CancellationToken,
    ) -> Result<BridgeReport, BridgeFailure> {
        info!(
            "Resuming transfer {} from {} on chain {}",
            transfer_id,
            from.name(),
            self.destination.client().chain_id()
        );
        let record = TransferRecord::resumed(
            transfer_id,
            from,
            self.source.chain_id(),
            request.destination().map(|leg| leg.chain_id).unwrap_or_default(),
            request.token_in(),
            request.amount_in(),
        );
        self.drive(record, request, cancel).await
    }

    async fn drive(
        &self,
        mut record: TransferRecord,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> Result<BridgeReport, BridgeFailure> {
        let mut outcomes = Vec::new();

        match self
            .step_through(&mut record, &mut outcomes, request, cancel)
            .await
        {
            Ok(()) => {
                info!(
                    "Cross-chain swap complete: transfer {:?}, {} transactions",
                    record.transfer_id,
                    outcomes.len()
                );
                Ok(BridgeReport { record, outcomes })
            }
            Err(cause) => {
                record.fail(&cause);
                metrics::record_bridge_phase(&record.phase);
                error!(
                    "Cross-chain swap {}: transfer {:?}: {}",
                    record.phase, record.transfer_id, cause
                );
                Err(BridgeFailure {
                    record,
                    outcomes,
                    cause,
                })
            }
        }
    }

    async fn step_through(
        &self,
        record: &mut TransferRecord,
        outcomes: &mut Vec<TransactionOutcome>,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<()> {
        let leg = request.destination().ok_or_else(|| {
            OrchestratorError::InvalidParameter(
                "cross-chain swap requires a destination chain".to_string(),
            )
        })?;
        let destination_chain = self.destination.client().chain_id();
        if leg.chain_id != destination_chain {
            return Err(OrchestratorError::Validation(format!(
                "destination chain id {} does not match endpoint chain id {}",
                leg.chain_id, destination_chain
            )));
        }
        let gas = request.gas();

        if record.phase == TransferPhase::Init {
            outcomes.extend(
                ensure_allowance(
                    self.source.as_ref(),
                    &self.waiter,
                    &self.signer,
                    record.token,
                    self.source_bridge,
                    record.amount,
                    gas,
                    cancel,
                )
                .await?,
            );
            self.advance(record, TransferPhase::SourceApproved)?;
        }

        if record.phase == TransferPhase::SourceApproved {
            self.initiate(record, outcomes, gas, cancel).await?;
            self.advance(record, TransferPhase::TransferInitiated)?;
        }

        let transfer_id = record.transfer_id.ok_or_else(|| {
            OrchestratorError::InvalidParameter("transfer id is unknown".to_string())
        })?;

        if record.phase == TransferPhase::TransferInitiated {
            self.advance(record, TransferPhase::AwaitingDestinationReady)?;
        }

        if record.phase == TransferPhase::AwaitingDestinationReady {
            self.wait_until_ready(transfer_id, cancel).await?;
            outcomes.push(self.claim(transfer_id, gas, cancel).await?);
            self.advance(record, TransferPhase::Claimed)?;
        }

        if record.phase == TransferPhase::Claimed {
            let params = SwapParams {
                token_in: leg.bridged_token,
                token_out: request.require_token_out()?,
                amount_in: record.amount,
                amount_out_min: request.guards().amount_out_min,
                recipient: request.recipient(),
            };
            let report = self.destination.swap(&params, gas, cancel).await?;
            outcomes.extend(report.approvals);
            outcomes.push(report.outcome);
            self.advance(record, TransferPhase::DestinationSwapped)?;
        }

        self.advance(record, TransferPhase::Complete)
    }

    fn advance(&self, record: &mut TransferRecord, next: TransferPhase) -> OrchestratorResult<()> {
        record.advance(next)?;
        metrics::record_bridge_phase(&record.phase);
        debug!("Transfer {:?} reached {}", record.transfer_id, record.phase);
        Ok(())
    }

    /// Submit `initiateTransfer` and take the transfer ID from its event
    async fn initiate(
        &self,
        record: &mut TransferRecord,
        outcomes: &mut Vec<TransactionOutcome>,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<()> {
        let call = TxCall::new(
            "initiate-transfer",
            self.source_bridge,
            InitiateTransferCall {
                token: record.token,
                amount: record.amount,
                destination_chain_id: U256::from(record.destination_chain),
            }
            .encode(),
        );

        let receipt = self
            .waiter
            .submit_and_confirm(self.source.as_ref(), &call, &self.signer, gas, cancel)
            .await?;
        outcomes.push(TransactionOutcome::resolve(self.source.as_ref(), call.label, &receipt).await?);

        let event = events::transfer_initiated(&receipt, self.source_bridge)?;
        if event.token != record.token {
            warn!(
                "Bridge reported token {:?} for transfer {}, requested {:?}",
                event.token, event.transfer_id, record.token
            );
        }
        if event.amount != record.amount {
            warn!(
                "Bridge reported amount {} for transfer {}, requested {}",
                event.amount, event.transfer_id, record.amount
            );
            record.amount = event.amount;
        }
        record.transfer_id = Some(event.transfer_id);
        info!(
            "Transfer {} initiated on chain {} for chain {}",
            event.transfer_id, record.source_chain, event.destination_chain_id
        );
        Ok(())
    }

    /// Poll `isTransferReady` on a fixed interval until true, the maximum
    /// wait elapses, or `cancel` fires
    async fn wait_until_ready(
        &self,
        transfer_id: U256,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<()> {
        let client = self.destination.client();
        let interval = self.config.readiness_poll_interval();
        let deadline = Instant::now() + self.config.readiness_max_wait();
        let data: Bytes = IsTransferReadyCall { transfer_id }.encode().into();
        let mut polls = 0u32;
        let cancelled = || OrchestratorError::Cancelled {
            operation: format!("waiting for transfer {} readiness", transfer_id),
        };

        loop {
            polls += 1;
            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                raw = client.call(self.destination_bridge, data.clone()) => raw?,
            };
            let ready = bool::decode(&raw).map_err(|e| OrchestratorError::Rpc {
                chain_id: client.chain_id(),
                code: None,
                message: format!("undecodable isTransferReady response: {}", e),
            })?;

            if ready {
                info!("Transfer {} ready after {} polls", transfer_id, polls);
                return Ok(());
            }

            if Instant::now() + interval > deadline {
                return Err(OrchestratorError::Timeout {
                    operation: format!("transfer {} readiness", transfer_id),
                    tx_hash: None,
                });
            }

            debug!("Transfer {} not ready (poll {})", transfer_id, polls);

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn claim(
        &self,
        transfer_id: U256,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<TransactionOutcome> {
        let client = self.destination.client();
        let call = TxCall::new(
            "claim-transfer",
            self.destination_bridge,
            ClaimTransferCall { transfer_id }.encode(),
        );

        let receipt = self
            .waiter
            .submit_and_confirm(client, &call, &self.signer, gas, cancel)
            .await?;
        TransactionOutcome::resolve(client, call.label, &receipt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionKind, DestinationLeg, SlippageGuards};
    use crate::testing::{test_wallet, FakeChain};
    use std::time::Duration;

    const SOURCE_ID: u64 = 11155111;
    const DEST_ID: u64 = 84532;
    const SOURCE_BRIDGE: Address = Address::repeat_byte(0x9a);
    const DEST_BRIDGE: Address = Address::repeat_byte(0x9b);
    const DEST_ROUTER: Address = Address::repeat_byte(0x58);
    const TOKEN: Address = Address::repeat_byte(0xa1);
    const BRIDGED: Address = Address::repeat_byte(0xd1);
    const TOKEN_OUT: Address = Address::repeat_byte(0xb2);
    const RECIPIENT: Address = Address::repeat_byte(0xcc);

    struct Fixture {
        source: Arc<FakeChain>,
        destination: Arc<FakeChain>,
        bridge: BridgeOrchestrator,
    }

    fn fixture() -> Fixture {
        let source = Arc::new(FakeChain::new(SOURCE_ID));
        let destination = Arc::new(FakeChain::new(DEST_ID));
        let waiter = ConfirmationWaiter::new(Duration::from_millis(1), 5);
        let executor = ActionExecutor::new(
            destination.clone(),
            test_wallet(),
            waiter.clone(),
            Some(DEST_ROUTER),
            Duration::from_secs(1200),
        );
        let bridge = BridgeOrchestrator::new(
            source.clone(),
            executor,
            test_wallet(),
            waiter,
            SOURCE_BRIDGE,
            DEST_BRIDGE,
            BridgeConfig {
                readiness_poll_interval_secs: 15,
                readiness_max_wait_secs: 60,
            },
        );
        Fixture {
            source,
            destination,
            bridge,
        }
    }

    fn request(destination_chain: u64) -> ActionRequest {
        let gas = GasPolicy::new(U256::from(1_000_000_000u64), U256::from(300_000)).unwrap();
        ActionRequest::builder(ActionKind::CrossChainSwap, TOKEN, U256::from(100), gas, RECIPIENT)
            .token_out(TOKEN_OUT)
            .guards(SlippageGuards {
                amount_out_min: U256::from(95),
                ..Default::default()
            })
            .destination(DestinationLeg {
                chain_id: destination_chain,
                bridged_token: BRIDGED,
            })
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_only_after_ready() {
        let f = fixture();
        f.destination.set_ready_after_polls(3);

        let report = f
            .bridge
            .run(&request(DEST_ID), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(f.destination.ready_polls(), 4);
        assert_eq!(f.source.submission_labels(), vec!["approve", "initiate-transfer"]);
        assert_eq!(
            f.destination.submission_labels(),
            vec!["claim-transfer", "approve", "swap"]
        );
        assert_eq!(report.record.phase, TransferPhase::Complete);
        assert_eq!(report.record.transfer_id, Some(U256::from(7)));
        assert_eq!(report.outcomes.len(), 5);

        let initiate =
            InitiateTransferCall::decode(&f.source.submissions()[1].call.data).unwrap();
        assert_eq!(initiate.destination_chain_id, U256::from(DEST_ID));
        assert_eq!(initiate.amount, U256::from(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_event_fails_without_destination_activity() {
        let f = fixture();
        f.source.omit_transfer_event();

        let failure = f
            .bridge
            .run(&request(DEST_ID), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.cause.kind(), "MissingEventError");
        assert_eq!(failure.record.failed_at(), Some(&TransferPhase::SourceApproved));
        assert!(failure.record.transfer_id.is_none());
        assert_eq!(failure.outcomes.len(), 2);
        assert!(f.destination.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_keeps_transfer_id() {
        let f = fixture();
        f.destination.set_ready_after_polls(u32::MAX);

        let failure = f
            .bridge
            .run(&request(DEST_ID), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.cause.kind(), "TimeoutError");
        assert!(failure.cause.is_retryable());
        assert_eq!(failure.record.transfer_id, Some(U256::from(7)));
        assert_eq!(
            failure.record.failed_at(),
            Some(&TransferPhase::AwaitingDestinationReady)
        );
        // 0s, 15s, 30s, 45s, 60s
        assert_eq!(f.destination.ready_polls(), 5);
        assert!(f.destination.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_readiness_stops_submissions() {
        let f = fixture();
        f.destination.set_ready_after_polls(u32::MAX);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            trigger.cancel();
        });

        let failure = f.bridge.run(&request(DEST_ID), &cancel).await.unwrap_err();

        assert_eq!(failure.cause.kind(), "CancelledError");
        assert_eq!(failure.record.transfer_id, Some(U256::from(7)));
        assert!(f.destination.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_stalled_readiness_read() {
        let f = fixture();
        f.destination.stall_rpc();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            trigger.cancel();
        });

        let failure = f.bridge.run(&request(DEST_ID), &cancel).await.unwrap_err();

        assert_eq!(failure.cause.kind(), "CancelledError");
        assert_eq!(
            failure.record.failed_at(),
            Some(&TransferPhase::AwaitingDestinationReady)
        );
        assert_eq!(f.destination.ready_polls(), 0);
        assert!(f.destination.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_swap_revert_is_partial_completion() {
        let f = fixture();
        f.destination.revert_label("swap");

        let failure = f
            .bridge
            .run(&request(DEST_ID), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.cause.kind(), "RevertError");
        assert_eq!(failure.record.failed_at(), Some(&TransferPhase::Claimed));
        assert_eq!(failure.record.transfer_id, Some(U256::from(7)));
        assert_eq!(failure.to_string(), "cross-chain swap failed during Claimed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_source_chain() {
        let f = fixture();

        let report = f
            .bridge
            .resume(
                &request(DEST_ID),
                U256::from(42),
                ResumePoint::Readiness,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(f.source.submissions().is_empty());
        assert_eq!(
            f.destination.submission_labels(),
            vec!["claim-transfer", "approve", "swap"]
        );
        let claim =
            ClaimTransferCall::decode(&f.destination.submissions()[0].call.data).unwrap();
        assert_eq!(claim.transfer_id, U256::from(42));
        assert_eq!(report.record.phase, TransferPhase::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_claim_does_not_claim_again() {
        let f = fixture();
        f.destination.revert_label("swap");

        let failure = f
            .bridge
            .run(&request(DEST_ID), &CancellationToken::new())
            .await
            .unwrap_err();
        let failed_at = failure.record.failed_at().unwrap();
        let from = ResumePoint::after_failure_in(failed_at).unwrap();
        assert_eq!(from, ResumePoint::Claimed);
        let polls = f.destination.ready_polls();

        f.destination.clear_reverts();
        let report = f
            .bridge
            .resume(
                &request(DEST_ID),
                failure.record.transfer_id.unwrap(),
                from,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.record.phase, TransferPhase::Complete);
        assert_eq!(f.destination.ready_polls(), polls);
        let labels = f.destination.submission_labels();
        assert_eq!(labels.iter().filter(|l| **l == "claim-transfer").count(), 1);
        assert_eq!(labels.last(), Some(&"swap"));
        assert_eq!(report.outcomes.last().unwrap().label, "swap");
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_chain_mismatch_is_rejected() {
        let f = fixture();

        let failure = f
            .bridge
            .run(&request(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.cause.kind(), "ValidationError");
        assert!(f.source.submissions().is_empty());
    }
}
