//! Wrapped-native deposit and withdrawal

use super::{require_positive, ActionExecutor, ActionReport};
use crate::chain::contracts::{DepositCall, WithdrawCall};
use crate::chain::TxCall;
use crate::error::OrchestratorResult;
use crate::tx::GasPolicy;

use ethers::abi::AbiEncode;
use ethers::signers::Signer;
use ethers::types::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::info;

impl ActionExecutor {
    /// Deposit `amount` of the native asset into the wrapped-native contract.
    ///
    /// No approval is involved; the amount travels as transaction value.
    pub async fn wrap(
        &self,
        wrapped: Address,
        amount: U256,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<ActionReport> {
        require_positive("wrap amount", amount)?;
        info!("Wrapping {} wei into {:?}", amount, wrapped);

        let call = TxCall::new("wrap", wrapped, DepositCall.encode()).with_value(amount);
        let outcome = self.confirm(&call, gas, cancel).await?;

        Ok(ActionReport {
            approvals: Vec::new(),
            outcome,
            native_balance: None,
        })
    }

    /// Withdraw `amount` from the wrapped-native contract and re-read the
    /// signer's native balance afterwards
    pub async fn unwrap_native(
        &self,
        wrapped: Address,
        amount: U256,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<ActionReport> {
        require_positive("unwrap amount", amount)?;
        info!("Unwrapping {} wei from {:?}", amount, wrapped);

        let call = TxCall::new("unwrap", wrapped, WithdrawCall { wad: amount }.encode());
        let outcome = self.confirm(&call, gas, cancel).await?;
        let balance = self.client().get_balance(self.signer.address()).await?;

        Ok(ActionReport {
            approvals: Vec::new(),
            outcome,
            native_balance: Some(balance),
        })
    }
}
