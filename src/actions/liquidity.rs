//! Router liquidity provision and removal
//!
//! Removal approves the pair's LP token, which is looked up through the
//! router's factory.

use super::{require_distinct, require_positive, ActionExecutor, ActionReport};
use crate::chain::contracts::{AddLiquidityCall, FactoryCall, GetPairCall, RemoveLiquidityCall};
use crate::chain::TxCall;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tx::GasPolicy;

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddLiquidityParams {
    pub token_a: Address,
    pub token_b: Address,
    pub amount_a: U256,
    pub amount_b: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub recipient: Address,
}

/// Burn `liquidity` pool shares of the `token_a`/`token_b` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveLiquidityParams {
    pub token_a: Address,
    pub token_b: Address,
    pub liquidity: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub recipient: Address,
}

impl ActionExecutor {
    /// Approve both tokens as needed, then add liquidity
    pub async fn add_liquidity(
        &self,
        params: &AddLiquidityParams,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<ActionReport> {
        require_positive("token A amount", params.amount_a)?;
        require_positive("token B amount", params.amount_b)?;
        require_distinct(params.token_a, params.token_b)?;
        let router = self.router()?;
        warn_unguarded("add liquidity", params.amount_a_min, params.amount_b_min);

        // Both approvals are confirmed before the router call goes out
        let mut approvals = Vec::with_capacity(2);
        approvals.extend(
            self.approve(params.token_a, router, params.amount_a, gas, cancel)
                .await?,
        );
        approvals.extend(
            self.approve(params.token_b, router, params.amount_b, gas, cancel)
                .await?,
        );

        info!(
            "Adding liquidity {} {:?} + {} {:?}",
            params.amount_a, params.token_a, params.amount_b, params.token_b
        );

        let call = TxCall::new(
            "add-liquidity",
            router,
            AddLiquidityCall {
                token_a: params.token_a,
                token_b: params.token_b,
                amount_a_desired: params.amount_a,
                amount_b_desired: params.amount_b,
                amount_a_min: params.amount_a_min,
                amount_b_min: params.amount_b_min,
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

    /// Approve the pair's pool token to the router, then remove liquidity
    pub async fn remove_liquidity(
        &self,
        params: &RemoveLiquidityParams,
        gas: &GasPolicy,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<ActionReport> {
        require_positive("liquidity", params.liquidity)?;
        require_distinct(params.token_a, params.token_b)?;
        let router = self.router()?;
        warn_unguarded("remove liquidity", params.amount_a_min, params.amount_b_min);

        let pair = self.pair_for(router, params.token_a, params.token_b).await?;
        let approvals: Vec<_> = self
            .approve(pair, router, params.liquidity, gas, cancel)
            .await?
            .into_iter()
            .collect();

        info!(
            "Removing {} liquidity from pair {:?} ({:?}/{:?})",
            params.liquidity, pair, params.token_a, params.token_b
        );

        let call = TxCall::new(
            "remove-liquidity",
            router,
            RemoveLiquidityCall {
                token_a: params.token_a,
                token_b: params.token_b,
                liquidity: params.liquidity,
                amount_a_min: params.amount_a_min,
                amount_b_min: params.amount_b_min,
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

    /// Resolve the pool token through the router's factory
    async fn pair_for(
        &self,
        router: Address,
        token_a: Address,
        token_b: Address,
    ) -> OrchestratorResult<Address> {
        let raw = self
            .client()
            .call(router, FactoryCall.encode().into())
            .await?;
        let factory = Address::decode(&raw).map_err(|e| {
            OrchestratorError::InvalidParameter(format!("router returned no factory: {}", e))
        })?;

        let raw = self
            .client()
            .call(factory, GetPairCall { token_a, token_b }.encode().into())
            .await?;
        let pair = Address::decode(&raw).map_err(|e| {
            OrchestratorError::InvalidParameter(format!("undecodable pair address: {}", e))
        })?;

        if pair.is_zero() {
            return Err(OrchestratorError::InvalidParameter(format!(
                "no pair exists for {:?} and {:?}",
                token_a, token_b
            )));
        }

        debug!("Pair for {:?}/{:?} is {:?}", token_a, token_b, pair);
        Ok(pair)
    }
}

fn warn_unguarded(action: &str, amount_a_min: U256, amount_b_min: U256) {
    if amount_a_min.is_zero() || amount_b_min.is_zero() {
        warn!(
            "{} has a zero minimum amount (A min {}, B min {}); the position is unprotected against slippage",
            action, amount_a_min, amount_b_min
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::testing::{test_wallet, FakeChain};
    use crate::tx::approval::read_allowance;
    use ethers::signers::Signer;
    use std::sync::Arc;

    const PAIR: Address = Address::repeat_byte(0x99);

    fn add_params() -> AddLiquidityParams {
        AddLiquidityParams {
            token_a: TOKEN_A,
            token_b: TOKEN_B,
            amount_a: U256::from(100),
            amount_b: U256::from(250),
            amount_a_min: U256::from(95),
            amount_b_min: U256::from(240),
            recipient: RECIPIENT,
        }
    }

    fn remove_params() -> RemoveLiquidityParams {
        RemoveLiquidityParams {
            token_a: TOKEN_A,
            token_b: TOKEN_B,
            liquidity: U256::from(40),
            amount_a_min: U256::zero(),
            amount_b_min: U256::zero(),
            recipient: RECIPIENT,
        }
    }

    #[tokio::test]
    async fn test_add_liquidity_approves_only_uncovered_token() {
        let chain = Arc::new(FakeChain::new(1));
        let owner = test_wallet().address();
        chain.set_allowance(TOKEN_A, owner, ROUTER, U256::from(100));

        let report = executor(&chain)
            .add_liquidity(&add_params(), &gas(), &CancellationToken::new())
            .await
            .unwrap();

        let submissions = chain.submissions();
        assert_eq!(chain.submission_labels(), vec!["approve", "add-liquidity"]);
        assert_eq!(submissions[0].call.to, TOKEN_B);
        assert_eq!(report.approvals.len(), 1);

        let add = AddLiquidityCall::decode(&submissions[1].call.data).unwrap();
        assert_eq!(add.amount_a_desired, U256::from(100));
        assert_eq!(add.amount_b_desired, U256::from(250));
        assert_eq!(add.amount_a_min, U256::from(95));
        assert_eq!(add.amount_b_min, U256::from(240));
    }

    #[tokio::test]
    async fn test_add_liquidity_approves_both_before_router_call() {
        let chain = Arc::new(FakeChain::new(1));

        let report = executor(&chain)
            .add_liquidity(&add_params(), &gas(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            chain.submission_labels(),
            vec!["approve", "approve", "add-liquidity"]
        );
        let router_submit = chain.submissions()[2].block_at_submit;
        assert!(report
            .approvals
            .iter()
            .all(|a| a.block_number <= router_submit));

        let owner = test_wallet().address();
        let allowance_b = read_allowance(chain.as_ref(), TOKEN_B, owner, ROUTER)
            .await
            .unwrap();
        assert!(allowance_b.covers(U256::from(250)));
    }

    #[tokio::test]
    async fn test_remove_liquidity_approves_pair_token() {
        let chain = Arc::new(FakeChain::new(1));
        chain.set_pair(TOKEN_A, TOKEN_B, PAIR);

        executor(&chain)
            .remove_liquidity(&remove_params(), &gas(), &CancellationToken::new())
            .await
            .unwrap();

        let submissions = chain.submissions();
        assert_eq!(
            chain.submission_labels(),
            vec!["approve", "remove-liquidity"]
        );
        assert_eq!(submissions[0].call.to, PAIR);

        let remove = RemoveLiquidityCall::decode(&submissions[1].call.data).unwrap();
        assert_eq!(remove.liquidity, U256::from(40));
        assert_eq!(remove.to, RECIPIENT);
    }

    #[tokio::test]
    async fn test_remove_liquidity_without_pair_is_invalid() {
        let chain = Arc::new(FakeChain::new(1));

        let err = executor(&chain)
            .remove_liquidity(&remove_params(), &gas(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "InvalidParameterError");
        assert!(chain.submissions().is_empty());
    }
}
