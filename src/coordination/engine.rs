//! Orchestrator root: wires chain clients to executors and dispatches requests

use super::bridge::{BridgeOrchestrator, BridgeReport};
use super::transfer::ResumePoint;
use crate::actions::{ActionExecutor, ActionKind, ActionReport, ActionRequest};
use crate::chain::{ChainClient, EthersChainClient};
use crate::config::Settings;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tx::ConfirmationWaiter;

use anyhow::Result;
use ethers::signers::LocalWallet;
use ethers::types::U256;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// In-flight bound for endpoints without chain configuration
const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// RPC endpoints named on the command line
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub rpc_url: String,
    pub destination_rpc_url: Option<String>,
}

/// What a finished request produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationReport {
    Action(ActionReport),
    CrossChain(BridgeReport),
}

pub struct Orchestrator {
    executor: ActionExecutor,
    bridge: Option<BridgeOrchestrator>,
}

impl Orchestrator {
    pub fn new(executor: ActionExecutor) -> Self {
        Self {
            executor,
            bridge: None,
        }
    }

    pub fn with_bridge(mut self, bridge: BridgeOrchestrator) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Connect the endpoints `request` needs and assemble its executors
    pub async fn connect(
        settings: &Settings,
        request: &ActionRequest,
        endpoints: &Endpoints,
        signer: LocalWallet,
    ) -> OrchestratorResult<Self> {
        let waiter = ConfirmationWaiter::new(
            settings.orchestrator.confirmation_poll_interval(),
            settings.orchestrator.confirmation_max_attempts,
        );
        let deadline = settings.orchestrator.deadline_window();

        let source = connect_client(settings, &endpoints.rpc_url, None).await?;
        let source_chain = source.chain_id();

        match request.kind() {
            ActionKind::Wrap | ActionKind::Unwrap => Ok(Self::new(ActionExecutor::new(
                source, signer, waiter, None, deadline,
            ))),
            ActionKind::Swap | ActionKind::AddLiquidity | ActionKind::RemoveLiquidity => {
                let router = settings.require_chain(source_chain)?.router()?;
                Ok(Self::new(ActionExecutor::new(
                    source,
                    signer,
                    waiter,
                    Some(router),
                    deadline,
                )))
            }
            ActionKind::CrossChainSwap => {
                let leg = request.destination().ok_or_else(|| {
                    OrchestratorError::Validation(
                        "cross-chain-swap requires a destination chain".to_string(),
                    )
                })?;
                let destination_url = endpoints.destination_rpc_url.as_deref().ok_or_else(|| {
                    OrchestratorError::Validation(
                        "cross-chain-swap requires a destination RPC endpoint".to_string(),
                    )
                })?;
                let destination =
                    connect_client(settings, destination_url, Some(leg.chain_id)).await?;

                let source_config = settings.require_chain(source_chain)?;
                let destination_config = settings.require_chain(leg.chain_id)?;

                let destination_executor = ActionExecutor::new(
                    destination,
                    signer.clone(),
                    waiter.clone(),
                    Some(destination_config.router()?),
                    deadline,
                );
                let bridge = BridgeOrchestrator::new(
                    source.clone(),
                    destination_executor,
                    signer.clone(),
                    waiter.clone(),
                    source_config.bridge()?,
                    destination_config.bridge()?,
                    settings.bridge.clone(),
                );
                let executor = ActionExecutor::new(
                    source,
                    signer,
                    waiter,
                    source_config.router().ok(),
                    deadline,
                );

                Ok(Self::new(executor).with_bridge(bridge))
            }
        }
    }

    /// Execute `request` to completion.
    ///
    /// Errors are [`OrchestratorError`] for single-chain actions and
    /// [`super::BridgeFailure`] for cross-chain swaps.
    pub async fn run(
        &self,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationReport> {
        info!(
            "Running {} of {} {:?} on chain {}",
            request.kind(),
            request.amount_in(),
            request.token_in(),
            self.executor.client().chain_id()
        );

        match request.kind() {
            ActionKind::CrossChainSwap => {
                let report = self.bridge()?.run(request, cancel).await?;
                Ok(OrchestrationReport::CrossChain(report))
            }
            _ => {
                let report = self.executor.execute(request, cancel).await?;
                Ok(OrchestrationReport::Action(report))
            }
        }
    }

    /// Resume a cross-chain swap whose transfer was already initiated
    pub async fn resume(
        &self,
        request: &ActionRequest,
        transfer_id: U256,
        from: ResumePoint,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationReport> {
        if request.kind() != ActionKind::CrossChainSwap {
            return Err(OrchestratorError::Validation(format!(
                "only cross-chain-swap can be resumed, not {}",
                request.kind()
            ))
            .into());
        }

        let report = self.bridge()?.resume(request, transfer_id, from, cancel).await?;
        Ok(OrchestrationReport::CrossChain(report))
    }

    fn bridge(&self) -> OrchestratorResult<&BridgeOrchestrator> {
        self.bridge.as_ref().ok_or_else(|| {
            OrchestratorError::Config("no bridge configured for this request".to_string())
        })
    }
}

async fn connect_client(
    settings: &Settings,
    url: &str,
    expected_chain: Option<u64>,
) -> OrchestratorResult<Arc<dyn ChainClient>> {
    let client = EthersChainClient::connect(url, DEFAULT_MAX_IN_FLIGHT).await?;
    let chain_id = client.chain_id();

    if let Some(expected) = expected_chain {
        if expected != chain_id {
            return Err(OrchestratorError::Validation(format!(
                "endpoint {} serves chain {}, expected {}",
                url, chain_id, expected
            )));
        }
    }

    let client = match settings.get_chain_by_id(chain_id) {
        Some(chain) => {
            debug!(
                "Using {} fallback endpoints for {}",
                chain.fallback_rpc_urls.len(),
                chain.name
            );
            client.with_fallbacks(&chain.fallback_rpc_urls, chain.max_in_flight_requests)
        }
        None => client,
    };

    Ok(Arc::new(client))
}
