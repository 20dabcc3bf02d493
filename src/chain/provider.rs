//! Chain client with multi-RPC support and automatic failover

use super::{BlockInfo, ChainClient, Receipt, ReceiptStatus, TxCall};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tx::GasPolicy;

use async_trait::async_trait;
use ethers::abi::AbiDecode;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

/// Selector of the standard `Error(string)` revert payload
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Multi-provider wrapper with automatic failover
pub struct EthersChainClient {
    /// Chain ID reported by the endpoint
    chain_id: u64,
    /// HTTP providers (primary first, then fallbacks)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Bounds concurrent requests against the endpoint
    in_flight: Semaphore,
}

impl EthersChainClient {
    /// Connect to `primary` and read the endpoint's chain ID.
    ///
    /// Fallbacks depend on the chain, so they are added afterwards with
    /// [`Self::with_fallbacks`].
    pub async fn connect(primary: &str, max_in_flight: usize) -> OrchestratorResult<Self> {
        let http_providers = build_providers(std::iter::once(primary));

        if http_providers.is_empty() {
            return Err(OrchestratorError::Validation(format!(
                "invalid RPC endpoint: {}",
                primary
            )));
        }

        let chain_id = http_providers[0]
            .get_chainid()
            .await
            .map_err(|e| classify(0, e))?
            .as_u64();

        info!("Connected to chain {} via {}", chain_id, primary);

        Ok(Self {
            chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
            in_flight: Semaphore::new(max_in_flight.max(1)),
        })
    }

    /// Append configured fallback endpoints and apply the configured
    /// in-flight bound, once the chain ID is known
    pub fn with_fallbacks(mut self, fallbacks: &[String], max_in_flight: usize) -> Self {
        self.http_providers
            .extend(build_providers(fallbacks.iter().map(String::as_str)));
        self.in_flight = Semaphore::new(max_in_flight.max(1));
        self
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    async fn permit(&self) -> OrchestratorResult<SemaphorePermit<'_>> {
        self.in_flight
            .acquire()
            .await
            .map_err(|e| OrchestratorError::Network {
                chain_id: self.chain_id,
                message: e.to_string(),
            })
    }

    fn read_request(to: Address, data: Bytes) -> TypedTransaction {
        TransactionRequest::new().to(to).data(data).into()
    }
}

fn build_providers<'a>(urls: impl Iterator<Item = &'a str>) -> Vec<Provider<Http>> {
    let mut http_providers = Vec::new();

    for url in urls {
        match Provider::<Http>::try_from(url) {
            Ok(provider) => {
                http_providers.push(provider.interval(Duration::from_millis(100)));
                debug!("Added HTTP provider: {}", url);
            }
            Err(e) => {
                warn!("Failed to create provider for {}: {}", url, e);
            }
        }
    }

    http_providers
}

#[async_trait]
impl ChainClient for EthersChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn submit(
        &self,
        call: &TxCall,
        signer: &LocalWallet,
        gas: &GasPolicy,
    ) -> OrchestratorResult<H256> {
        let _permit = self.permit().await?;
        let from = signer.address();

        let nonce = self
            .http()
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| classify(self.chain_id, e))?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .nonce(nonce)
            .gas(gas.gas_limit)
            .gas_price(gas.gas_price)
            .chain_id(self.chain_id)
            .into();

        let wallet = signer.clone().with_chain_id(self.chain_id);
        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| OrchestratorError::Wallet(e.to_string()))?;

        // Submitted exactly once: a failed send is reported, never re-sent
        let pending = self
            .http()
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(|e| classify(self.chain_id, e))?;

        let tx_hash = pending.tx_hash();
        info!(
            "{} sent on chain {}: {:?} (nonce {})",
            call.label, self.chain_id, tx_hash, nonce
        );
        Ok(tx_hash)
    }

    async fn get_receipt(&self, tx_hash: H256) -> OrchestratorResult<Option<Receipt>> {
        let _permit = self.permit().await?;
        let receipt = self
            .http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| classify(self.chain_id, e))?;

        // A receipt without a block number is still pending
        Ok(receipt.and_then(|r| {
            let block_number = r.block_number?.as_u64();
            Some(Receipt {
                tx_hash: r.transaction_hash,
                block_hash: r.block_hash.unwrap_or_default(),
                block_number,
                gas_used: r.gas_used.unwrap_or_default(),
                status: if r.status == Some(1.into()) {
                    ReceiptStatus::Success
                } else {
                    ReceiptStatus::Reverted
                },
                logs: r.logs,
            })
        }))
    }

    async fn get_block(&self, block_number: u64) -> OrchestratorResult<BlockInfo> {
        let _permit = self.permit().await?;
        let block = self
            .http()
            .get_block(block_number)
            .await
            .map_err(|e| classify(self.chain_id, e))?
            .ok_or_else(|| OrchestratorError::Rpc {
                chain_id: self.chain_id,
                code: None,
                message: format!("block {} not found", block_number),
            })?;

        Ok(BlockInfo {
            number: block_number,
            hash: block.hash.unwrap_or_default(),
            timestamp: block.timestamp.as_u64(),
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes> {
        let _permit = self.permit().await?;
        let tx = Self::read_request(to, data);

        for _ in 0..self.http_providers.len() {
            match self.http().call(&tx, None).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    let err = classify(self.chain_id, e);
                    if !matches!(err, OrchestratorError::Network { .. }) {
                        return Err(err);
                    }
                    warn!("eth_call failed on chain {}: {}", self.chain_id, err);
                    self.failover();
                }
            }
        }

        Err(OrchestratorError::Network {
            chain_id: self.chain_id,
            message: "All providers failed eth_call".to_string(),
        })
    }

    async fn get_balance(&self, address: Address) -> OrchestratorResult<U256> {
        let _permit = self.permit().await?;
        self.http()
            .get_balance(address, None)
            .await
            .map_err(|e| classify(self.chain_id, e))
    }

    async fn revert_reason(&self, call: &TxCall, from: Address, block: u64) -> Option<String> {
        let _permit = self.permit().await.ok()?;
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .into();

        match self.http().call(&tx, Some(BlockId::Number(block.into()))).await {
            Ok(_) => None,
            Err(e) => classify(self.chain_id, e).revert_reason().map(str::to_string),
        }
    }
}

/// Map a provider error onto the orchestrator taxonomy
fn classify(chain_id: u64, err: ProviderError) -> OrchestratorError {
    let Some(resp) = RpcError::as_error_response(&err) else {
        return OrchestratorError::Network {
            chain_id,
            message: err.to_string(),
        };
    };

    let message = resp.message.to_lowercase();
    if message.contains("insufficient funds") {
        return OrchestratorError::InsufficientFunds {
            chain_id,
            have: "unknown".to_string(),
            need: "unknown".to_string(),
        };
    }

    if let Some(data) = resp.as_revert_data() {
        return OrchestratorError::Revert {
            tx_hash: None,
            code: Some(resp.code),
            reason: Some(decode_revert_reason(&data).unwrap_or_else(|| {
                if data.is_empty() {
                    resp.message.clone()
                } else {
                    format!("custom error 0x{}", hex::encode(&data))
                }
            })),
        };
    }

    if message.contains("execution reverted") {
        return OrchestratorError::Revert {
            tx_hash: None,
            code: Some(resp.code),
            reason: Some(resp.message.clone()),
        };
    }

    OrchestratorError::Rpc {
        chain_id,
        code: Some(resp.code),
        message: resp.message.clone(),
    }
}

/// Decode a standard `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    String::decode(&data[4..]).ok()
}
