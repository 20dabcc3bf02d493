//! Command-line surface
//!
//! Arguments are parsed by clap and then validated in a fixed order; the first
//! failure is reported on its own. Nothing here touches the network.

use crate::actions::{ActionKind, ActionRequest, DestinationLeg, SlippageGuards};
use crate::coordination::{Endpoints, ResumePoint};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tx::GasPolicy;

use clap::Parser;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;

lazy_static! {
    static ref ADDRESS_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
    static ref PRIVATE_KEY_RE: Regex = Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").unwrap();
}

#[derive(Parser, Debug)]
#[command(
    name = "chainswap",
    version,
    about = "Drive DEX router actions and cross-chain bridge swaps",
    after_help = "Actions and their extra arguments:\n  \
        swap              <token-out> [amount-out-min]\n  \
        liquidity         <token-b> <amount-b> [amount-a-min amount-b-min]\n  \
        remove-liquidity  <token-b> [amount-a-min amount-b-min]\n  \
        wrap | deposit    (amount in native units)\n  \
        unwrap            (amount in native units)\n  \
        cross-chain-swap  <dest-chain-id> <dest-rpc-url> <dest-token-in> <dest-token-out> [amount-out-min]"
)]
pub struct Cli {
    #[arg(value_name = "RPC_URL", help = "JSON-RPC endpoint of the source chain")]
    pub rpc_url: String,

    #[arg(value_name = "TOKEN", help = "Primary token (or wrapped-native contract)")]
    pub token: String,

    #[arg(
        value_name = "AMOUNT",
        allow_hyphen_values = true,
        help = "Base units for tokens and LP shares, native units for wrap/unwrap"
    )]
    pub amount: String,

    #[arg(value_name = "ACTION")]
    pub action: String,

    #[arg(value_name = "PRIVATE_KEY", help = "32-byte hex signing key")]
    pub private_key: String,

    #[arg(value_name = "FROM", help = "Address of the signing key")]
    pub from: String,

    #[arg(value_name = "TO", help = "Recipient of the action's output")]
    pub to: String,

    #[arg(value_name = "GAS_GWEI", help = "Gas price in Gwei")]
    pub gas_gwei: String,

    #[arg(value_name = "EXTRA", help = "Action-dependent arguments")]
    pub extra: Vec<String>,

    #[arg(long, value_name = "FILE", help = "Configuration file (default config/default.toml)")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "GAS", help = "Gas limit per transaction")]
    pub gas_limit: Option<u64>,

    #[arg(long, help = "Print the outcome as JSON on stdout")]
    pub json: bool,

    #[arg(
        long,
        value_name = "TRANSFER_ID",
        help = "Resume an initiated cross-chain swap instead of starting a new one"
    )]
    pub resume_transfer: Option<String>,

    #[arg(
        long,
        value_name = "PHASE",
        help = "Where --resume-transfer picks up: readiness (default) or claimed"
    )]
    pub resume_from: Option<String>,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

/// Fully validated invocation, ready for the orchestrator
#[derive(Debug)]
pub struct Invocation {
    pub request: ActionRequest,
    pub signer: LocalWallet,
    pub endpoints: Endpoints,
    pub resume: Option<(U256, ResumePoint)>,
}

impl Cli {
    /// Validate every argument, stopping at the first failure
    pub fn validate(&self, default_gas_limit: u64) -> OrchestratorResult<Invocation> {
        let kind = ActionKind::from_name(&self.action).ok_or_else(|| {
            invalid(format!(
                "unknown action '{}' (expected swap, liquidity, remove-liquidity, wrap, deposit, unwrap or cross-chain-swap)",
                self.action
            ))
        })?;

        require_rpc_url("RPC URL", &self.rpc_url)?;
        let token = parse_address("token", &self.token)?;
        let amount = match kind {
            ActionKind::Wrap | ActionKind::Unwrap => parse_native_amount("amount", &self.amount)?,
            _ => parse_amount("amount", &self.amount)?,
        };
        let signer = parse_private_key(&self.private_key)?;
        let from = parse_address("from", &self.from)?;
        if signer.address() != from {
            return Err(invalid(format!(
                "private key belongs to {:?}, not {:?}",
                signer.address(),
                from
            )));
        }
        let recipient = parse_address("to", &self.to)?;
        let gas = GasPolicy::from_gwei(&self.gas_gwei, self.gas_limit.unwrap_or(default_gas_limit))?;

        let mut extra = Extras::new(kind, &self.extra);
        let mut builder = ActionRequest::builder(kind, token, amount, gas, recipient);
        let mut destination_rpc_url = None;

        match kind {
            ActionKind::Swap => {
                builder = builder.token_out(parse_address("token-out", extra.required("token-out")?)?);
                let amount_out_min = extra.optional_guard("amount-out-min")?;
                builder = builder.guards(SlippageGuards {
                    amount_out_min,
                    ..Default::default()
                });
            }
            ActionKind::AddLiquidity => {
                builder = builder
                    .token_out(parse_address("token-b", extra.required("token-b")?)?)
                    .amount_out(parse_amount("amount-b", extra.required("amount-b")?)?);
                builder = builder.guards(extra.optional_pair_guards()?);
            }
            ActionKind::RemoveLiquidity => {
                builder = builder.token_out(parse_address("token-b", extra.required("token-b")?)?);
                builder = builder.guards(extra.optional_pair_guards()?);
            }
            ActionKind::Wrap | ActionKind::Unwrap => {}
            ActionKind::CrossChainSwap => {
                let chain_id = parse_chain_id(extra.required("dest-chain-id")?)?;
                let rpc_url = extra.required("dest-rpc-url")?;
                require_rpc_url("destination RPC URL", rpc_url)?;
                destination_rpc_url = Some(rpc_url.to_string());
                let bridged_token = parse_address("dest-token-in", extra.required("dest-token-in")?)?;
                builder = builder
                    .token_out(parse_address("dest-token-out", extra.required("dest-token-out")?)?)
                    .destination(DestinationLeg {
                        chain_id,
                        bridged_token,
                    });
                let amount_out_min = extra.optional_guard("amount-out-min")?;
                builder = builder.guards(SlippageGuards {
                    amount_out_min,
                    ..Default::default()
                });
            }
        }
        extra.finish()?;

        let resume = match (&self.resume_transfer, &self.resume_from) {
            (None, None) => None,
            (None, Some(_)) => {
                return Err(invalid(
                    "--resume-from requires --resume-transfer".to_string(),
                ))
            }
            (Some(_), _) if kind != ActionKind::CrossChainSwap => {
                return Err(invalid(
                    "--resume-transfer only applies to cross-chain-swap".to_string(),
                ))
            }
            (Some(id), point) => {
                let transfer_id = U256::from_dec_str(id)
                    .map_err(|_| invalid(format!("invalid transfer id '{}'", id)))?;
                let point = match point {
                    Some(name) => ResumePoint::from_name(name).ok_or_else(|| {
                        invalid(format!(
                            "--resume-from must be readiness or claimed, got '{}'",
                            name
                        ))
                    })?,
                    None => ResumePoint::default(),
                };
                Some((transfer_id, point))
            }
        };

        Ok(Invocation {
            request: builder.build()?,
            signer,
            endpoints: Endpoints {
                rpc_url: self.rpc_url.clone(),
                destination_rpc_url,
            },
            resume,
        })
    }
}

/// Cursor over the action-dependent trailing arguments
struct Extras<'a> {
    kind: ActionKind,
    values: &'a [String],
    next: usize,
}

impl<'a> Extras<'a> {
    fn new(kind: ActionKind, values: &'a [String]) -> Self {
        Self {
            kind,
            values,
            next: 0,
        }
    }

    fn required(&mut self, name: &str) -> OrchestratorResult<&'a str> {
        let values = self.values;
        let value = values
            .get(self.next)
            .ok_or_else(|| invalid(format!("{} requires <{}>", self.kind, name)))?;
        self.next += 1;
        Ok(value.as_str())
    }

    fn optional(&mut self) -> Option<&'a str> {
        let values = self.values;
        let value = values.get(self.next)?;
        self.next += 1;
        Some(value.as_str())
    }

    fn optional_guard(&mut self, name: &str) -> OrchestratorResult<U256> {
        self.optional()
            .map(|v| parse_guard(name, v))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Liquidity guards come as a pair or not at all
    fn optional_pair_guards(&mut self) -> OrchestratorResult<SlippageGuards> {
        match (self.optional(), self.optional()) {
            (None, None) => Ok(SlippageGuards::default()),
            (Some(a), Some(b)) => Ok(SlippageGuards {
                amount_a_min: parse_guard("amount-a-min", a)?,
                amount_b_min: parse_guard("amount-b-min", b)?,
                ..Default::default()
            }),
            _ => Err(invalid(format!(
                "{} takes both <amount-a-min> and <amount-b-min>",
                self.kind
            ))),
        }
    }

    fn finish(&self) -> OrchestratorResult<()> {
        match self.values.get(self.next) {
            Some(unexpected) => Err(invalid(format!(
                "unexpected argument '{}' for {}",
                unexpected, self.kind
            ))),
            None => Ok(()),
        }
    }
}

fn invalid(message: String) -> OrchestratorError {
    OrchestratorError::Validation(message)
}

fn require_rpc_url(name: &str, url: &str) -> OrchestratorResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(invalid(format!("{} must be an http(s) URL, got '{}'", name, url)))
    }
}

fn parse_address(name: &str, value: &str) -> OrchestratorResult<Address> {
    if !ADDRESS_RE.is_match(value) {
        return Err(invalid(format!(
            "{} must be a 0x-prefixed 20-byte hex address, got '{}'",
            name, value
        )));
    }
    let address: Address = value
        .parse()
        .map_err(|e| invalid(format!("{} address '{}': {}", name, value, e)))?;
    if address.is_zero() {
        return Err(invalid(format!("{} address must not be zero", name)));
    }
    Ok(address)
}

/// Positive integer amount in base units
fn parse_amount(name: &str, value: &str) -> OrchestratorResult<U256> {
    let amount = parse_guard(name, value)?;
    if amount.is_zero() {
        return Err(invalid(format!("{} must be greater than zero", name)));
    }
    Ok(amount)
}

/// Non-negative integer; zero disables the guard
fn parse_guard(name: &str, value: &str) -> OrchestratorResult<U256> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!(
            "{} must be a non-negative integer, got '{}'",
            name, value
        )));
    }
    U256::from_dec_str(value).map_err(|e| invalid(format!("{} '{}': {}", name, value, e)))
}

/// Positive decimal amount of the native asset, converted to wei
fn parse_native_amount(name: &str, value: &str) -> OrchestratorResult<U256> {
    if value.trim_start().starts_with('-') {
        return Err(invalid(format!("{} must be positive, got '{}'", name, value)));
    }
    let amount =
        parse_ether(value).map_err(|e| invalid(format!("{} '{}': {}", name, value, e)))?;
    if amount.is_zero() {
        return Err(invalid(format!("{} must be greater than zero", name)));
    }
    Ok(amount)
}

fn parse_private_key(value: &str) -> OrchestratorResult<LocalWallet> {
    if !PRIVATE_KEY_RE.is_match(value) {
        return Err(invalid(
            "private key must be 32 bytes of hex (64 characters, optional 0x prefix)".to_string(),
        ));
    }
    value
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| invalid(format!("invalid private key: {}", e)))
}

fn parse_chain_id(value: &str) -> OrchestratorResult<u64> {
    match value.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(invalid(format!(
            "dest-chain-id must be a positive integer, got '{}'",
            value
        ))),
    }
}
