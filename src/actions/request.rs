//! Validated description of one requested action

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tx::GasPolicy;

use ethers::types::{Address, U256};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Wrap,
    Unwrap,
    CrossChainSwap,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Swap => "swap",
            ActionKind::AddLiquidity => "liquidity",
            ActionKind::RemoveLiquidity => "remove-liquidity",
            ActionKind::Wrap => "wrap",
            ActionKind::Unwrap => "unwrap",
            ActionKind::CrossChainSwap => "cross-chain-swap",
        }
    }

    /// Parse a CLI action name; `deposit` is accepted as an alias for `wrap`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "swap" => Some(ActionKind::Swap),
            "liquidity" | "add-liquidity" => Some(ActionKind::AddLiquidity),
            "remove-liquidity" => Some(ActionKind::RemoveLiquidity),
            "wrap" | "deposit" => Some(ActionKind::Wrap),
            "unwrap" | "withdraw" => Some(ActionKind::Unwrap),
            "cross-chain-swap" => Some(ActionKind::CrossChainSwap),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Minimum amounts accepted from the router.
///
/// Zero means no slippage protection; executors log a warning in that case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlippageGuards {
    pub amount_out_min: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
}

/// Destination side of a cross-chain swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DestinationLeg {
    pub chain_id: u64,
    /// Token released by the destination bridge and swapped there
    pub bridged_token: Address,
}

/// Validated, immutable description of one user action
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest {
    kind: ActionKind,
    token_in: Address,
    token_out: Option<Address>,
    amount_in: U256,
    amount_out: Option<U256>,
    guards: SlippageGuards,
    gas: GasPolicy,
    recipient: Address,
    destination: Option<DestinationLeg>,
}

impl ActionRequest {
    pub fn builder(
        kind: ActionKind,
        token_in: Address,
        amount_in: U256,
        gas: GasPolicy,
        recipient: Address,
    ) -> ActionRequestBuilder {
        ActionRequestBuilder {
            request: ActionRequest {
                kind,
                token_in,
                token_out: None,
                amount_in,
                amount_out: None,
                guards: SlippageGuards::default(),
                gas,
                recipient,
                destination: None,
            },
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn token_in(&self) -> Address {
        self.token_in
    }

    pub fn token_out(&self) -> Option<Address> {
        self.token_out
    }

    pub fn require_token_out(&self) -> OrchestratorResult<Address> {
        self.token_out.ok_or_else(|| {
            OrchestratorError::InvalidParameter(format!("{} requires a second token", self.kind))
        })
    }

    pub fn amount_in(&self) -> U256 {
        self.amount_in
    }

    pub fn amount_out(&self) -> Option<U256> {
        self.amount_out
    }

    pub fn guards(&self) -> SlippageGuards {
        self.guards
    }

    pub fn gas(&self) -> &GasPolicy {
        &self.gas
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn destination(&self) -> Option<DestinationLeg> {
        self.destination
    }
}

pub struct ActionRequestBuilder {
    request: ActionRequest,
}

impl ActionRequestBuilder {
    pub fn token_out(mut self, token: Address) -> Self {
        self.request.token_out = Some(token);
        self
    }

    pub fn amount_out(mut self, amount: U256) -> Self {
        self.request.amount_out = Some(amount);
        self
    }

    pub fn guards(mut self, guards: SlippageGuards) -> Self {
        self.request.guards = guards;
        self
    }

    pub fn destination(mut self, leg: DestinationLeg) -> Self {
        self.request.destination = Some(leg);
        self
    }

    /// Check the request and freeze it
    pub fn build(self) -> OrchestratorResult<ActionRequest> {
        let request = self.request;
        let kind = request.kind;

        require_address("token", request.token_in)?;
        require_address("recipient", request.recipient)?;
        if request.amount_in.is_zero() {
            return Err(invalid("amount must be greater than zero"));
        }

        let needs_pair = matches!(
            kind,
            ActionKind::Swap
                | ActionKind::AddLiquidity
                | ActionKind::RemoveLiquidity
                | ActionKind::CrossChainSwap
        );
        if needs_pair {
            let token_out = request
                .token_out
                .ok_or_else(|| invalid(&format!("{} requires a second token", kind)))?;
            require_address("second token", token_out)?;
            if token_out == request.token_in && kind != ActionKind::CrossChainSwap {
                return Err(invalid("the two tokens must differ"));
            }
        }

        if kind == ActionKind::AddLiquidity {
            match request.amount_out {
                Some(amount) if !amount.is_zero() => {}
                _ => return Err(invalid("second token amount must be greater than zero")),
            }
        }

        if kind == ActionKind::CrossChainSwap {
            let leg = request
                .destination
                .ok_or_else(|| invalid("cross-chain-swap requires a destination chain"))?;
            if leg.chain_id == 0 {
                return Err(invalid("destination chain id must be greater than zero"));
            }
            require_address("destination token", leg.bridged_token)?;
            if Some(leg.bridged_token) == request.token_out {
                return Err(invalid("destination tokens must differ"));
            }
        }

        Ok(request)
    }
}

fn invalid(message: &str) -> OrchestratorError {
    OrchestratorError::Validation(message.to_string())
}

fn require_address(name: &str, address: Address) -> OrchestratorResult<()> {
    if address.is_zero() {
        return Err(invalid(&format!("{} address must not be zero", name)));
    }
    Ok(())
}
