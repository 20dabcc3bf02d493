//! Exact-input token swap through the router

use super::{require_distinct, require_positive, ActionExecutor, ActionReport};
use crate::chain::contracts::SwapExactTokensForTokensCall;
use crate::chain::TxCall;
use crate::error::OrchestratorResult;
use crate::tx::GasPolicy;

use ethers::abi::AbiEncode;
use ethers::types::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exact-input swap along the direct `[token_in, token_out]` path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapParams {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub recipient: Address,
}

impl ActionExecutor {
    pub async fn swap(
        &self,
        params: &SwapParams,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<ActionReport> {
        require_positive("swap amount", params.amount_in)?;
        require_distinct(params.token_in, params.token_out)?;
        let router = self.router()?;

        if params.amount_out_min.is_zero() {
            warn!(
                "Swap of {} {:?} has no minimum output; the trade is unprotected against slippage",
                params.amount_in, params.token_in
            );
        }

        let approvals: Vec<_> = self
            .approve(params.token_in, router, params.amount_in, gas, cancel)
            .await?
            .into_iter()
            .collect();

        info!(
            "Swapping {} of {:?} for {:?} on chain {}",
            params.amount_in,
            params.token_in,
            params.token_out,
            self.client().chain_id()
        );

        let call = TxCall::new(
            "swap",
            router,
            SwapExactTokensForTokensCall {
                amount_in: params.amount_in,
                amount_out_min: params.amount_out_min,
                path: vec![params.token_in, params.token_out],
                to: params.recipient,
                deadline: self.deadline(),
            }
            .encode(),
        );
        let outcome = self.confirm(&call, gas, cancel).await?;

        Ok(ActionReport {
            approvals,
            outcome,
            native_balance: None,
        })
    }
}
