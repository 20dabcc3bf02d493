//! In-memory chain used by the unit tests
//!
//! Mines each submitted transaction after a configurable number of receipt
//! polls and applies the effects the orchestrator depends on (allowances,
//! wrapped balances, bridge transfer events).

use crate::chain::contracts::{
    AllowanceCall, ApproveCall, FactoryCall, GetPairCall, InitiateTransferCall,
    IsTransferReadyCall, TransferInitiatedFilter, WithdrawCall,
};
use crate::chain::{BlockInfo, ChainClient, Receipt, ReceiptStatus, TxCall};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tx::GasPolicy;

use async_trait::async_trait;
use ethers::abi::{self, AbiDecode, AbiEncode, Token};
use ethers::contract::EthEvent;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Log, H256, U256};
use ethers::utils::parse_ether;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME_SECS: u64 = 12;
pub const GAS_USED: u64 = 52_000;

/// First anvil development key
pub fn test_wallet() -> LocalWallet {
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        .parse()
        .unwrap()
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub call: TxCall,
    pub from: Address,
    pub tx_hash: H256,
    /// Chain height when the transaction was submitted
    pub block_at_submit: u64,
}

struct PendingTx {
    index: usize,
    remaining_polls: u32,
}

#[derive(Default)]
struct FakeState {
    height: u64,
    allowances: HashMap<(Address, Address, Address), U256>,
    balances: HashMap<Address, U256>,
    submissions: Vec<Submission>,
    pending: HashMap<H256, PendingTx>,
    receipts: HashMap<H256, Receipt>,
    pending_polls: u32,
    reverted_labels: HashSet<&'static str>,
    factory: Address,
    pairs: HashMap<(Address, Address), Address>,
    ready_after_polls: u32,
    ready_polls: u32,
    next_transfer_id: u64,
    omit_transfer_event: bool,
    stall_rpc: bool,
}

pub struct FakeChain {
    chain_id: u64,
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(FakeState {
                height: 1,
                factory: Address::repeat_byte(0xfa),
                next_transfer_id: 7,
                ..Default::default()
            }),
        }
    }

    pub fn block_hash(number: u64) -> H256 {
        H256::from_low_u64_be(0xb10c_0000 + number)
    }

    pub fn advance_blocks(&self, count: u64) {
        self.state.lock().unwrap().height += count;
    }

    /// Receipt polls answered with "pending" before a transaction is mined
    pub fn set_pending_polls(&self, polls: u32) {
        self.state.lock().unwrap().pending_polls = polls;
    }

    pub fn revert_label(&self, label: &'static str) {
        self.state.lock().unwrap().reverted_labels.insert(label);
    }

    /// Receipt lookups and contract reads never answer
    pub fn stall_rpc(&self) {
        self.state.lock().unwrap().stall_rpc = true;
    }

    async fn stall_if_configured(&self) {
        let stalled = self.state.lock().unwrap().stall_rpc;
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    pub fn clear_reverts(&self) {
        self.state.lock().unwrap().reverted_labels.clear();
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((token, owner, spender), amount);
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_balance(&self, address: Address, amount: U256) {
        self.state.lock().unwrap().balances.insert(address, amount);
    }

    pub fn set_pair(&self, token_a: Address, token_b: Address, pair: Address) {
        let mut state = self.state.lock().unwrap();
        state.pairs.insert((token_a, token_b), pair);
        state.pairs.insert((token_b, token_a), pair);
    }

    /// `isTransferReady` answers false this many times, then true
    pub fn set_ready_after_polls(&self, polls: u32) {
        self.state.lock().unwrap().ready_after_polls = polls;
    }

    pub fn ready_polls(&self) -> u32 {
        self.state.lock().unwrap().ready_polls
    }

    pub fn omit_transfer_event(&self) {
        self.state.lock().unwrap().omit_transfer_event = true;
    }

    pub fn next_transfer_id(&self) -> U256 {
        U256::from(self.state.lock().unwrap().next_transfer_id)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submission_labels(&self) -> Vec<&'static str> {
        self.submissions().iter().map(|s| s.call.label).collect()
    }

    fn balance_of(state: &FakeState, address: Address) -> U256 {
        state
            .balances
            .get(&address)
            .copied()
            .unwrap_or_else(|| parse_ether(100).unwrap())
    }

    fn mine(&self, state: &mut FakeState, tx_hash: H256, index: usize) -> Receipt {
        state.height += 1;
        let submission = state.submissions[index].clone();
        let reverted = state.reverted_labels.contains(submission.call.label);
        let mut logs = Vec::new();

        if !reverted {
            self.apply(state, &submission, &mut logs);
        }

        let receipt = Receipt {
            tx_hash,
            block_hash: Self::block_hash(state.height),
            block_number: state.height,
            gas_used: U256::from(GAS_USED),
            status: if reverted {
                ReceiptStatus::Reverted
            } else {
                ReceiptStatus::Success
            },
            logs,
        };
        state.receipts.insert(tx_hash, receipt.clone());
        receipt
    }

    fn apply(&self, state: &mut FakeState, submission: &Submission, logs: &mut Vec<Log>) {
        let call = &submission.call;
        let from = submission.from;

        if let Ok(approve) = ApproveCall::decode(&call.data) {
            state
                .allowances
                .insert((call.to, from, approve.spender), approve.amount);
        } else if let Ok(withdraw) = WithdrawCall::decode(&call.data) {
            let balance = Self::balance_of(state, from);
            state.balances.insert(from, balance + withdraw.wad);
        } else if let Ok(initiate) = InitiateTransferCall::decode(&call.data) {
            let transfer_id = U256::from(state.next_transfer_id);
            state.next_transfer_id += 1;
            if !state.omit_transfer_event {
                let mut id_topic = [0u8; 32];
                transfer_id.to_big_endian(&mut id_topic);
                logs.push(Log {
                    address: call.to,
                    topics: vec![
                        TransferInitiatedFilter::signature(),
                        H256(id_topic),
                        H256::from(initiate.token),
                    ],
                    data: abi::encode(&[
                        Token::Uint(initiate.amount),
                        Token::Uint(initiate.destination_chain_id),
                    ])
                    .into(),
                    ..Default::default()
                });
            }
        }

        if !call.value.is_zero() {
            let balance = Self::balance_of(state, from);
            state.balances.insert(from, balance.saturating_sub(call.value));
        }
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn submit(
        &self,
        call: &TxCall,
        signer: &LocalWallet,
        _gas: &GasPolicy,
    ) -> OrchestratorResult<H256> {
        let mut state = self.state.lock().unwrap();
        let index = state.submissions.len();
        let tx_hash = H256::from_low_u64_be((self.chain_id << 32) | (index as u64 + 1));

        let block_at_submit = state.height;
        state.submissions.push(Submission {
            call: call.clone(),
            from: signer.address(),
            tx_hash,
            block_at_submit,
        });
        let remaining_polls = state.pending_polls;
        state.pending.insert(
            tx_hash,
            PendingTx {
                index,
                remaining_polls,
            },
        );
        Ok(tx_hash)
    }

    async fn get_receipt(&self, tx_hash: H256) -> OrchestratorResult<Option<Receipt>> {
        self.stall_if_configured().await;
        let mut state = self.state.lock().unwrap();
        if let Some(receipt) = state.receipts.get(&tx_hash) {
            return Ok(Some(receipt.clone()));
        }

        let Some(pending) = state.pending.get_mut(&tx_hash) else {
            return Ok(None);
        };
        if pending.remaining_polls > 0 {
            pending.remaining_polls -= 1;
            return Ok(None);
        }

        let index = pending.index;
        state.pending.remove(&tx_hash);
        Ok(Some(self.mine(&mut state, tx_hash, index)))
    }

    async fn get_block(&self, block_number: u64) -> OrchestratorResult<BlockInfo> {
        let state = self.state.lock().unwrap();
        if block_number > state.height {
            return Err(OrchestratorError::Rpc {
                chain_id: self.chain_id,
                code: None,
                message: format!("block {} not found", block_number),
            });
        }
        Ok(BlockInfo {
            number: block_number,
            hash: Self::block_hash(block_number),
            timestamp: GENESIS_TIMESTAMP + block_number * BLOCK_TIME_SECS,
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes> {
        self.stall_if_configured().await;
        let mut state = self.state.lock().unwrap();

        let encoded = if let Ok(c) = AllowanceCall::decode(&data) {
            state
                .allowances
                .get(&(to, c.owner, c.spender))
                .copied()
                .unwrap_or_default()
                .encode()
        } else if FactoryCall::decode(&data).is_ok() {
            state.factory.encode()
        } else if let Ok(c) = GetPairCall::decode(&data) {
            state
                .pairs
                .get(&(c.token_a, c.token_b))
                .copied()
                .unwrap_or_default()
                .encode()
        } else if IsTransferReadyCall::decode(&data).is_ok() {
            state.ready_polls += 1;
            (state.ready_polls > state.ready_after_polls).encode()
        } else {
            return Err(OrchestratorError::Rpc {
                chain_id: self.chain_id,
                code: Some(-32000),
                message: "execution reverted: unknown selector".to_string(),
            });
        };

        Ok(encoded.into())
    }

    async fn get_balance(&self, address: Address) -> OrchestratorResult<U256> {
        Ok(Self::balance_of(&self.state.lock().unwrap(), address))
    }

    async fn revert_reason(&self, call: &TxCall, _from: Address, _block: u64) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .reverted_labels
            .contains(call.label)
            .then(|| format!("{}: forced revert", call.label))
    }
}
