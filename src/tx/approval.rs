//! Token approval step
//!
//! Reads the live allowance before every dependent action and approves exactly
//! the required amount when it falls short. Allowances are never cached.

use super::{ConfirmationWaiter, GasPolicy, TransactionOutcome};
use crate::chain::contracts::{AllowanceCall, ApproveCall};
use crate::chain::{ChainClient, TxCall};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::metrics;

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Current on-chain allowance of `spender` over `owner`'s `token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allowance {
    pub owner: Address,
    pub spender: Address,
    pub token: Address,
    pub current_amount: U256,
}

impl Allowance {
    pub fn covers(&self, required: U256) -> bool {
        self.current_amount >= required
    }
}

/// Read the allowance from chain
pub async fn read_allowance(
    client: &dyn ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> OrchestratorResult<Allowance> {
    let data = AllowanceCall { owner, spender }.encode();
    let raw = client.call(token, data.into()).await?;
    let current_amount = U256::decode(&raw).map_err(|e| OrchestratorError::Allowance {
        token,
        message: format!("undecodable allowance response: {}", e),
    })?;

    Ok(Allowance {
        owner,
        spender,
        token,
        current_amount,
    })
}

/// Ensure `spender` may transfer `required` of `token` from the signer.
///
/// Returns `None` when the allowance already covers `required` (no transaction
/// is sent); otherwise the confirmed approval outcome.
#[allow(clippy::too_many_arguments)]
pub async fn ensure_allowance(
    client: &dyn ChainClient,
    waiter: &ConfirmationWaiter,
    signer: &LocalWallet,
    token: Address,
    spender: Address,
    required: U256,
    gas: &GasPolicy,
    cancel: &CancellationToken,
) -> OrchestratorResult<Option<TransactionOutcome>> {
    let owner = signer.address();
    let allowance = read_allowance(client, token, owner, spender).await?;

    if allowance.covers(required) {
        debug!(
            "Allowance of {:?} for {:?} already {} >= {}, skipping approval",
            token, spender, allowance.current_amount, required
        );
        metrics::record_approval_skipped(client.chain_id());
        return Ok(None);
    }

    let balance = client.get_balance(owner).await?;
    let need = gas.max_cost();
    if balance < need {
        return Err(OrchestratorError::InsufficientFunds {
            chain_id: client.chain_id(),
            have: balance.to_string(),
            need: need.to_string(),
        });
    }

    info!(
        "Approving {:?} to spend {} of {:?} (current allowance {})",
        spender, required, token, allowance.current_amount
    );

    let call = TxCall::new(
        "approve",
        token,
        ApproveCall {
            spender,
            amount: required,
        }
        .encode(),
    );

    let receipt = match waiter
        .submit_and_confirm(client, &call, signer, gas, cancel)
        .await
    {
        Ok(receipt) => receipt,
        Err(OrchestratorError::Revert { tx_hash, reason, .. }) => {
            return Err(OrchestratorError::ApprovalReverted {
                token,
                tx_hash,
                reason,
            })
        }
        Err(e) => return Err(e),
    };

    metrics::record_approval_submitted(client.chain_id());
    let outcome = TransactionOutcome::resolve(client, "approve", &receipt).await?;
    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_wallet, FakeChain};
    use std::time::Duration;

    const TOKEN: Address = Address::repeat_byte(0xa1);
    const ROUTER: Address = Address::repeat_byte(0xbb);

    fn waiter() -> ConfirmationWaiter {
        ConfirmationWaiter::new(Duration::from_millis(1), 5)
    }

    fn gas() -> GasPolicy {
        GasPolicy::new(U256::from(1_000_000_000u64), U256::from(300_000)).unwrap()
    }

    #[tokio::test]
    async fn test_sufficient_allowance_submits_nothing() {
        let chain = FakeChain::new(1);
        let wallet = test_wallet();
        chain.set_allowance(TOKEN, wallet.address(), ROUTER, U256::from(500));

        let outcome = ensure_allowance(
            &chain,
            &waiter(),
            &wallet,
            TOKEN,
            ROUTER,
            U256::from(100),
            &gas(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.is_none());
        assert!(chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_allowance_approves_exact_amount() {
        let chain = FakeChain::new(1);
        let wallet = test_wallet();
        chain.set_allowance(TOKEN, wallet.address(), ROUTER, U256::from(40));

        let outcome = ensure_allowance(
            &chain,
            &waiter(),
            &wallet,
            TOKEN,
            ROUTER,
            U256::from(100),
            &gas(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .expect("approval outcome");

        let submissions = chain.submissions();
        assert_eq!(submissions.len(), 1);
        let approve = ApproveCall::decode(&submissions[0].call.data).unwrap();
        assert_eq!(approve.spender, ROUTER);
        assert_eq!(approve.amount, U256::from(100));
        assert_eq!(outcome.label, "approve");
        assert_eq!(
            chain.allowance(TOKEN, wallet.address(), ROUTER),
            U256::from(100)
        );
    }

    #[tokio::test]
    async fn test_reverted_approval_is_approval_error() {
        let chain = FakeChain::new(1);
        chain.revert_label("approve");

        let err = ensure_allowance(
            &chain,
            &waiter(),
            &test_wallet(),
            TOKEN,
            ROUTER,
            U256::from(100),
            &gas(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "ApprovalRevertedError");
    }

    #[tokio::test]
    async fn test_gas_shortfall_is_insufficient_funds() {
        let chain = FakeChain::new(1);
        let wallet = test_wallet();
        chain.set_balance(wallet.address(), U256::from(1_000));

        let err = ensure_allowance(
            &chain,
            &waiter(),
            &wallet,
            TOKEN,
            ROUTER,
            U256::from(100),
            &gas(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "InsufficientFundsError");
        assert!(chain.submissions().is_empty());
    }
}
