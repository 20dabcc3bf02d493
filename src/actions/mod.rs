//! Action executors for router and wrapped-native actions
//!
//! A single [`ActionExecutor`] owns one chain session and one signer. Each
//! action resolves its approvals, builds a deadline-guarded call, waits for
//! confirmation and assembles a [`TransactionOutcome`].

mod liquidity;
mod request;
mod swap;
mod wrap;

pub use liquidity::{AddLiquidityParams, RemoveLiquidityParams};
pub use request::{ActionKind, ActionRequest, DestinationLeg, SlippageGuards};
pub use swap::SwapParams;

use crate::chain::{ChainClient, TxCall};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tx::{ConfirmationWaiter, GasPolicy, TransactionOutcome};

use chrono::Utc;
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything one action produced on chain
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    /// Approvals submitted before the action, in submission order
    pub approvals: Vec<TransactionOutcome>,
    pub outcome: TransactionOutcome,
    /// Signer's native balance re-read after an unwrap
    pub native_balance: Option<U256>,
}

/// Executes router and wrapped-native actions on one chain
pub struct ActionExecutor {
    client: Arc<dyn ChainClient>,
    signer: LocalWallet,
    waiter: ConfirmationWaiter,
    router: Option<Address>,
    deadline_window: Duration,
}

impl ActionExecutor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        signer: LocalWallet,
        waiter: ConfirmationWaiter,
        router: Option<Address>,
        deadline_window: Duration,
    ) -> Self {
        Self {
            client,
            signer,
            waiter,
            router,
            deadline_window,
        }
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    /// Run a single-chain request
    pub async fn execute(
        &self,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<ActionReport> {
        let gas = request.gas();
        let guards = request.guards();

        match request.kind() {
            ActionKind::Swap => {
                let params = SwapParams {
                    token_in: request.token_in(),
                    token_out: request.require_token_out()?,
                    amount_in: request.amount_in(),
                    amount_out_min: guards.amount_out_min,
                    recipient: request.recipient(),
                };
                self.swap(&params, gas, cancel).await
            }
            ActionKind::AddLiquidity => {
                let params = AddLiquidityParams {
                    token_a: request.token_in(),
                    token_b: request.require_token_out()?,
                    amount_a: request.amount_in(),
                    amount_b: request.amount_out().ok_or_else(|| {
                        OrchestratorError::InvalidParameter(
                            "add-liquidity requires a second token amount".to_string(),
                        )
                    })?,
                    amount_a_min: guards.amount_a_min,
                    amount_b_min: guards.amount_b_min,
                    recipient: request.recipient(),
                };
                self.add_liquidity(&params, gas, cancel).await
            }
            ActionKind::RemoveLiquidity => {
                let params = RemoveLiquidityParams {
                    token_a: request.token_in(),
                    token_b: request.require_token_out()?,
                    liquidity: request.amount_in(),
                    amount_a_min: guards.amount_a_min,
                    amount_b_min: guards.amount_b_min,
                    recipient: request.recipient(),
                };
                self.remove_liquidity(&params, gas, cancel).await
            }
            ActionKind::Wrap => self.wrap(request.token_in(), request.amount_in(), gas, cancel).await,
            ActionKind::Unwrap => {
                self.unwrap_native(request.token_in(), request.amount_in(), gas, cancel)
                    .await
            }
            ActionKind::CrossChainSwap => Err(OrchestratorError::InvalidParameter(
                "cross-chain swaps are driven by the bridge orchestrator".to_string(),
            )),
        }
    }

    fn router(&self) -> OrchestratorResult<Address> {
        self.router.ok_or_else(|| {
            OrchestratorError::Config(format!(
                "no router configured for chain {}",
                self.client.chain_id()
            ))
        })
    }

    /// Submission time plus the deadline window, in unix seconds
    fn deadline(&self) -> U256 {
        let now = Utc::now().timestamp().max(0) as u64;
        U256::from(now + self.deadline_window.as_secs())
    }

    /// Submit the primary call of an action and build its outcome
    async fn confirm(
        &self,
        call: &TxCall,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<TransactionOutcome> {
        let receipt = self
            .waiter
            .submit_and_confirm(self.client(), call, &self.signer, gas, cancel)
            .await?;
        let outcome = TransactionOutcome::resolve(self.client(), call.label, &receipt).await?;
        info!(
            "{} complete: tx {:?} block {} at {}",
            call.label,
            outcome.hash,
            outcome.block_number,
            outcome
                .block_time()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| outcome.timestamp.to_string())
        );
        Ok(outcome)
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<Option<TransactionOutcome>> {
        crate::tx::ensure_allowance(
            self.client(),
            &self.waiter,
            &self.signer,
            token,
            spender,
            amount,
            gas,
            cancel,
        )
        .await
    }
}

fn require_positive(name: &str, amount: U256) -> OrchestratorResult<()> {
    if amount.is_zero() {
        return Err(OrchestratorError::InvalidParameter(format!(
            "{} must be greater than zero",
            name
        )));
    }
    Ok(())
}

fn require_distinct(token_a: Address, token_b: Address) -> OrchestratorResult<()> {
    if token_a == token_b {
        return Err(OrchestratorError::InvalidParameter(
            "the two tokens must differ".to_string(),
        ));
    }
    Ok(())
}
