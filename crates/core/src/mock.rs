//! In-memory automining node.
//!
//! `MockNode` answers the JSON-RPC methods this crate uses the way a local
//! Hardhat node does: one block per transaction, unlocked funded accounts,
//! reverts reported as `VM Exception` errors carrying `Error(string)` data.
//! Contracts deployed with [`datalogger_bytecode`] execute the `DataLogger`
//! calls in-process.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{address, keccak256, Address, Bytes, LogData, B256, U256, U64};
use alloy_sol_types::{Revert, SolCall, SolError, SolEvent, SolInterface};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::abi::{self, data_category_topic, IDataLogger};
use crate::rpc::{
    BlockTransactions, CallRequest, EthClient, LogFilter, RpcBlock, RpcError, RpcFuture, RpcLog,
    RpcReceipt, RpcTransaction, TransactionRequest, Transport,
};

pub const MOCK_CHAIN_ID: u64 = 31337;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 12;
pub const GAS_PRICE: u64 = 1_000_000_000;
pub const BLOCK_GAS_LIMIT: u64 = 30_000_000;
const ACCOUNT_COUNT: usize = 20;
const INITIAL_BALANCE_ETH: u64 = 10_000;

/// Prefix that marks creation code as the `DataLogger` contract.
pub const DATALOGGER_MARKER: &[u8] = b"\x60\x80\x60\x40\x52DataLogger";

pub fn datalogger_bytecode() -> Bytes {
    Bytes::from_static(DATALOGGER_MARKER)
}

fn dev_accounts() -> Vec<Address> {
    let mut accounts = vec![
        address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
        address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"),
    ];
    accounts.extend(
        (accounts.len()..ACCOUNT_COUNT)
            .map(|i| Address::from_word(keccak256(format!("mock-account-{i}")))),
    );
    accounts
}

fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u64))
}

fn block_hash(epoch: u64, number: u64) -> B256 {
    keccak256(format!("mock-block-{epoch}-{number}"))
}

fn rpc_error(code: i64, message: impl Into<String>) -> RpcError {
    RpcError::Rpc {
        code,
        message: message.into(),
        data: None,
    }
}

fn revert(reason: &str) -> RpcError {
    let payload = Revert {
        reason: reason.to_string(),
    }
    .abi_encode();
    RpcError::Rpc {
        code: -32603,
        message: format!(
            "Error: VM Exception while processing transaction: reverted with reason string '{reason}'"
        ),
        data: Some(Value::String(format!("0x{}", hex::encode(payload)))),
    }
}

fn param<T: DeserializeOwned>(params: &Value, index: usize) -> Result<T, RpcError> {
    let value = params
        .get(index)
        .ok_or_else(|| RpcError::Malformed(format!("missing param {index}")))?;
    serde_json::from_value(value.clone()).map_err(RpcError::from)
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::from)
}

// =============================================================================
// DataLogger emulation
// =============================================================================

#[derive(Default)]
struct DataLoggerState {
    data: Vec<abi::DataRecord>,
    payments: Vec<abi::TransactionRecord>,
    user_data: HashMap<Address, Vec<U256>>,
    user_payments: HashMap<Address, Vec<U256>>,
}

#[derive(Default)]
struct Execution {
    logs: Vec<LogData>,
    /// Value forwarded by the contract instead of kept.
    forward: Option<(Address, U256)>,
}

fn record_index(id: U256) -> Option<usize> {
    let id: u64 = id.try_into().ok()?;
    (id as usize).checked_sub(1)
}

impl DataLoggerState {
    fn decode(input: &[u8]) -> Result<IDataLogger::IDataLoggerCalls, RpcError> {
        IDataLogger::IDataLoggerCalls::abi_decode(input, true).map_err(|_| {
            rpc_error(
                -32603,
                "Error: Transaction reverted: function selector was not recognized and there's no fallback function",
            )
        })
    }

    fn execute(
        &mut self,
        from: Address,
        input: &[u8],
        value: U256,
        timestamp: u64,
        block_number: u64,
    ) -> Result<Execution, RpcError> {
        use IDataLogger::IDataLoggerCalls as Call;

        match Self::decode(input)? {
            Call::logData(call) => {
                if !value.is_zero() {
                    return Err(rpc_error(
                        -32603,
                        format!("Error: Transaction reverted: non-payable function was called with value {value}"),
                    ));
                }
                let id = U256::from(self.data.len() + 1);
                self.data.push(abi::DataRecord {
                    id,
                    sender: from,
                    category: call.category.clone(),
                    data: call.data.clone(),
                    timestamp: U256::from(timestamp),
                    blockNumber: U256::from(block_number),
                });
                self.user_data.entry(from).or_default().push(id);
                let event = IDataLogger::DataStored {
                    recordId: id,
                    sender: from,
                    category: data_category_topic(&call.category),
                    data: call.data,
                    timestamp: U256::from(timestamp),
                };
                Ok(Execution {
                    logs: vec![event.encode_log_data()],
                    forward: None,
                })
            }
            Call::logWithPayment(call) => {
                if value.is_zero() {
                    return Err(revert("Must send ETH"));
                }
                if call.to == Address::ZERO {
                    return Err(revert("Invalid recipient"));
                }
                let id = U256::from(self.payments.len() + 1);
                self.payments.push(abi::TransactionRecord {
                    id,
                    from,
                    to: call.to,
                    amount: value,
                    memo: call.memo.clone(),
                    timestamp: U256::from(timestamp),
                    blockNumber: U256::from(block_number),
                });
                self.user_payments.entry(from).or_default().push(id);
                let event = IDataLogger::TransactionLogged {
                    recordId: id,
                    from,
                    to: call.to,
                    amount: value,
                    memo: call.memo,
                    timestamp: U256::from(timestamp),
                };
                Ok(Execution {
                    logs: vec![event.encode_log_data()],
                    forward: Some((call.to, value)),
                })
            }
            // View functions sent as transactions change nothing.
            _ => Ok(Execution::default()),
        }
    }

    fn view(&self, input: &[u8]) -> Result<Vec<u8>, RpcError> {
        use IDataLogger::IDataLoggerCalls as Call;

        let out = match Self::decode(input)? {
            Call::getUserDataRecordIds(call) => {
                let ids = self.user_data.get(&call.user).cloned().unwrap_or_default();
                IDataLogger::getUserDataRecordIdsCall::abi_encode_returns(&(ids,))
            }
            Call::getUserTransactionRecordIds(call) => {
                let ids = self.user_payments.get(&call.user).cloned().unwrap_or_default();
                IDataLogger::getUserTransactionRecordIdsCall::abi_encode_returns(&(ids,))
            }
            Call::getDataRecord(call) => {
                let record = record_index(call.id)
                    .and_then(|i| self.data.get(i))
                    .ok_or_else(|| revert("Record does not exist"))?;
                IDataLogger::getDataRecordCall::abi_encode_returns(&(record.clone(),))
            }
            Call::getTransactionRecord(call) => {
                let record = record_index(call.id)
                    .and_then(|i| self.payments.get(i))
                    .ok_or_else(|| revert("Record does not exist"))?;
                IDataLogger::getTransactionRecordCall::abi_encode_returns(&(record.clone(),))
            }
            Call::getRecordCounts(_) => IDataLogger::getRecordCountsCall::abi_encode_returns(&(
                U256::from(self.data.len()),
                U256::from(self.payments.len()),
            )),
            Call::logData(_) | Call::logWithPayment(_) => Vec::new(),
        };
        Ok(out)
    }
}

// =============================================================================
// Chain state
// =============================================================================

struct MinedTx {
    tx: RpcTransaction,
    receipt: RpcReceipt,
}

struct Chain {
    epoch: u64,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, Bytes>,
    loggers: HashMap<Address, DataLoggerState>,
    blocks: Vec<RpcBlock>,
    txs: HashMap<B256, MinedTx>,
    logs: Vec<RpcLog>,
}

/// A transaction that passed validation and is ready to be mined.
struct Included {
    from: Address,
    to: Option<Address>,
    value: U256,
    input: Bytes,
    gas_limit: u64,
    gas_used: u64,
    contract_address: Option<Address>,
    logs: Vec<LogData>,
}

impl Chain {
    fn new(epoch: u64, accounts: &[Address]) -> Self {
        let genesis = RpcBlock {
            number: 0,
            hash: block_hash(epoch, 0),
            parent_hash: B256::ZERO,
            timestamp: GENESIS_TIMESTAMP,
            miner: Address::ZERO,
            gas_limit: BLOCK_GAS_LIMIT,
            gas_used: 0,
            base_fee_per_gas: Some(U256::from(GAS_PRICE)),
            transactions: BlockTransactions::default(),
        };
        Self {
            epoch,
            balances: accounts
                .iter()
                .map(|a| (*a, ether(INITIAL_BALANCE_ETH)))
                .collect(),
            nonces: HashMap::new(),
            code: HashMap::new(),
            loggers: HashMap::new(),
            blocks: vec![genesis],
            txs: HashMap::new(),
            logs: Vec::new(),
        }
    }

    fn head(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    fn resolve_tag(&self, tag: &str) -> Result<u64, RpcError> {
        match tag {
            "latest" | "pending" | "safe" | "finalized" => Ok(self.head()),
            "earliest" => Ok(0),
            hex => u64::from_str_radix(hex.trim_start_matches("0x"), 16)
                .map_err(|_| RpcError::Malformed(format!("invalid block tag {hex}"))),
        }
    }

    fn next_block(&self) -> (u64, B256, u64) {
        let number = self.blocks.len() as u64;
        (
            number,
            block_hash(self.epoch, number),
            GENESIS_TIMESTAMP + number * BLOCK_TIME,
        )
    }

    fn push_block(&mut self, transactions: Vec<B256>, gas_used: u64) {
        let (number, hash, timestamp) = self.next_block();
        let parent_hash = self.blocks.last().map(|b| b.hash).unwrap_or_default();
        self.blocks.push(RpcBlock {
            number,
            hash,
            parent_hash,
            timestamp,
            miner: Address::ZERO,
            gas_limit: BLOCK_GAS_LIMIT,
            gas_used,
            base_fee_per_gas: Some(U256::from(GAS_PRICE)),
            transactions: BlockTransactions::Hashes(transactions),
        });
    }

    fn send_transaction(
        &mut self,
        request: TransactionRequest,
        accounts: &[Address],
    ) -> Result<B256, RpcError> {
        let from = request.from;
        if !accounts.contains(&from) {
            return Err(rpc_error(-32000, format!("unknown account {from}")));
        }
        let value = request.value.unwrap_or_default();
        let input = request.data.clone().unwrap_or_default();
        let nonce = self.nonce(from);
        let creation_gas = if request.to.is_none() { 32_000 } else { 0 };
        let gas_used = 21_000 + 16 * input.len() as u64 + creation_gas;
        let cost = value + U256::from(gas_used) * U256::from(GAS_PRICE);
        if self.balance(from) < cost {
            return Err(rpc_error(
                -32003,
                "sender doesn't have enough funds to send tx",
            ));
        }

        let (number, _, timestamp) = self.next_block();
        let mut contract_address = None;
        let mut execution = Execution::default();
        match request.to {
            None => {
                let created = from.create(nonce);
                if input.starts_with(DATALOGGER_MARKER) {
                    self.loggers.insert(created, DataLoggerState::default());
                }
                self.code.insert(created, input.clone());
                contract_address = Some(created);
            }
            Some(to) => {
                if let Some(logger) = self.loggers.get_mut(&to) {
                    execution = logger.execute(from, &input, value, timestamp, number)?;
                }
            }
        }

        let recipient = execution
            .forward
            .map(|(to, _)| to)
            .or(request.to)
            .or(contract_address);
        *self.balances.entry(from).or_default() -= cost;
        if let Some(recipient) = recipient {
            *self.balances.entry(recipient).or_default() += value;
        }

        Ok(self.include(Included {
            from,
            to: request.to,
            value,
            input,
            gas_limit: request.gas.unwrap_or(BLOCK_GAS_LIMIT),
            gas_used,
            contract_address,
            logs: execution.logs,
        }))
    }

    /// Mine a block holding exactly this transaction.
    fn include(&mut self, included: Included) -> B256 {
        let (number, block_hash, _) = self.next_block();
        let nonce = self.nonce(included.from);
        self.nonces.insert(included.from, nonce + 1);
        let hash = keccak256(format!(
            "mock-tx-{}-{}-{nonce}-{number}",
            self.epoch, included.from
        ));
        // Events are emitted by the called contract.
        let emitter = included.to.or(included.contract_address).unwrap_or_default();
        let logs: Vec<RpcLog> = included
            .logs
            .into_iter()
            .enumerate()
            .map(|(i, log)| RpcLog {
                address: emitter,
                topics: log.topics().to_vec(),
                data: log.data,
                block_number: Some(number),
                block_hash: Some(block_hash),
                transaction_hash: Some(hash),
                transaction_index: Some(0),
                log_index: Some(i as u64),
                removed: false,
            })
            .collect();

        let tx = RpcTransaction {
            hash,
            block_number: Some(number),
            block_hash: Some(block_hash),
            transaction_index: Some(0),
            from: included.from,
            to: included.to,
            value: included.value,
            gas_limit: U256::from(included.gas_limit),
            gas_price: Some(U256::from(GAS_PRICE)),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            nonce,
            input: included.input,
        };
        let receipt = RpcReceipt {
            transaction_hash: hash,
            block_number: number,
            block_hash,
            from: included.from,
            to: included.to,
            contract_address: included.contract_address,
            gas_used: included.gas_used,
            status: Some(1),
            logs: logs.clone(),
        };
        self.logs.extend(logs);
        self.txs.insert(hash, MinedTx { tx, receipt });
        self.push_block(vec![hash], included.gas_used);
        hash
    }

    fn call(&self, call: &CallRequest) -> Result<Bytes, RpcError> {
        match self.loggers.get(&call.to) {
            Some(logger) => logger.view(&call.data).map(Bytes::from),
            None => Ok(Bytes::new()),
        }
    }

    fn block(&self, number: u64, full: bool) -> Option<RpcBlock> {
        let mut block = self.blocks.get(number as usize)?.clone();
        if full {
            let txs = block
                .transactions
                .hashes()
                .iter()
                .filter_map(|h| self.txs.get(h).map(|m| m.tx.clone()))
                .collect();
            block.transactions = BlockTransactions::Full(txs);
        }
        Some(block)
    }

    fn logs_matching(&self, filter: &LogFilter) -> Vec<RpcLog> {
        self.logs
            .iter()
            .filter(|log| {
                let number = log.block_number.unwrap_or_default();
                number >= filter.from_block
                    && number <= filter.to_block
                    && filter.address.map_or(true, |a| a == log.address)
                    && filter.topics.iter().enumerate().all(|(i, alternatives)| {
                        alternatives.as_ref().map_or(true, |alts| {
                            log.topics.get(i).is_some_and(|t| alts.contains(t))
                        })
                    })
            })
            .cloned()
            .collect()
    }
}

// =============================================================================
// MockNode
// =============================================================================

struct NodeState {
    chain: Chain,
    failures: HashMap<String, usize>,
    requests: Vec<String>,
}

/// Hardhat-like in-memory node.
pub struct MockNode {
    chain_id: u64,
    accounts: Vec<Address>,
    state: Mutex<NodeState>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNode {
    pub fn new() -> Self {
        Self::with_chain_id(MOCK_CHAIN_ID)
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        let accounts = dev_accounts();
        let chain = Chain::new(0, &accounts);
        Self {
            chain_id,
            accounts,
            state: Mutex::new(NodeState {
                chain,
                failures: HashMap::new(),
                requests: Vec::new(),
            }),
        }
    }

    /// Client whose transport is this node.
    pub fn client(self: &Arc<Self>) -> EthClient {
        EthClient::new(self.clone())
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.accounts.clone()
    }

    pub fn head(&self) -> u64 {
        self.state.lock().chain.head()
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.state.lock().chain.balance(address)
    }

    /// Mine `count` empty blocks.
    pub fn mine(&self, count: u64) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.chain.push_block(Vec::new(), 0);
        }
    }

    /// Restart the chain from genesis, as a restarted local node does. Block
    /// hashes differ from the previous run.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let epoch = state.chain.epoch + 1;
        state.chain = Chain::new(epoch, &self.accounts);
    }

    /// Make the next `times` calls of `method` fail.
    pub fn fail(&self, method: &str, times: usize) {
        self.state.lock().failures.insert(method.to_string(), times);
    }

    /// Methods received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// Deploy arbitrary creation code; returns the contract address and tx hash.
    pub fn deploy_code(&self, from: Address, code: Bytes) -> Result<(Address, B256), RpcError> {
        let mut state = self.state.lock();
        let nonce = state.chain.nonce(from);
        let hash = state.chain.send_transaction(
            TransactionRequest {
                from,
                data: Some(code),
                ..Default::default()
            },
            &self.accounts,
        )?;
        Ok((from.create(nonce), hash))
    }

    pub fn deploy_datalogger(&self, from: Address) -> Result<Address, RpcError> {
        self.deploy_code(from, datalogger_bytecode()).map(|(address, _)| address)
    }

    /// Mine a transaction from the first account to `address` whose receipt
    /// carries one raw log.
    pub fn emit_raw_log(&self, address: Address, topics: Vec<B256>, data: Bytes) -> B256 {
        let mut state = self.state.lock();
        let from = self.accounts[0];
        state.chain.include(Included {
            from,
            to: Some(address),
            value: U256::ZERO,
            input: Bytes::new(),
            gas_limit: BLOCK_GAS_LIMIT,
            gas_used: 21_000,
            contract_address: None,
            logs: vec![LogData::new_unchecked(topics, data)],
        })
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let mut state = self.state.lock();
        state.requests.push(method.to_string());
        if let Some(remaining) = state.failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(rpc_error(-32000, format!("injected failure for {method}")));
            }
        }

        let chain = &mut state.chain;
        match method {
            "eth_chainId" => to_json(&U64::from(self.chain_id)),
            "net_version" => to_json(&self.chain_id.to_string()),
            "eth_blockNumber" => to_json(&U64::from(chain.head())),
            "eth_accounts" => to_json(&self.accounts),
            "eth_gasPrice" => to_json(&U256::from(GAS_PRICE)),
            "eth_getBalance" => to_json(&chain.balance(param(params, 0)?)),
            "eth_getTransactionCount" => to_json(&U64::from(chain.nonce(param(params, 0)?))),
            "eth_getCode" => {
                let address: Address = param(params, 0)?;
                to_json(&chain.code.get(&address).cloned().unwrap_or_default())
            }
            "eth_getBlockByNumber" => {
                let tag: String = param(params, 0)?;
                let full: bool = param(params, 1).unwrap_or(false);
                let number = chain.resolve_tag(&tag)?;
                to_json(&chain.block(number, full))
            }
            "eth_getTransactionByHash" => {
                let hash: B256 = param(params, 0)?;
                to_json(&chain.txs.get(&hash).map(|m| &m.tx))
            }
            "eth_getTransactionReceipt" => {
                let hash: B256 = param(params, 0)?;
                to_json(&chain.txs.get(&hash).map(|m| &m.receipt))
            }
            "eth_call" => {
                let call: CallRequest = param(params, 0)?;
                to_json(&chain.call(&call)?)
            }
            "eth_sendTransaction" => {
                let request: TransactionRequest = param(params, 0)?;
                to_json(&chain.send_transaction(request, &self.accounts)?)
            }
            "eth_getLogs" => {
                let filter: LogFilter = param(params, 0)?;
                to_json(&chain.logs_matching(&filter))
            }
            other => Err(rpc_error(
                -32601,
                format!("Method {other} is not supported"),
            )),
        }
    }
}

impl Transport for MockNode {
    fn request(&self, method: &str, params: Value) -> RpcFuture<'_, Value> {
        let result = self.handle(method, &params);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_funded_accounts() {
        let node = Arc::new(MockNode::new());
        let eth = node.client();
        let accounts = eth.accounts().await.unwrap();
        assert_eq!(accounts.len(), 20);
        assert_eq!(eth.balance(accounts[5]).await.unwrap(), ether(10_000));
        assert_eq!(eth.chain_id().await.unwrap(), MOCK_CHAIN_ID);
    }

    #[tokio::test]
    async fn test_transfer_mines_one_block() {
        let node = Arc::new(MockNode::new());
        let eth = node.client();
        let [a, b] = [node.accounts()[0], node.accounts()[1]];

        let hash = eth
            .send_transaction(&TransactionRequest {
                from: a,
                to: Some(b),
                value: Some(ether(1)),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(eth.block_number().await.unwrap(), 1);
        let receipt = eth.receipt(hash).await.unwrap().unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(eth.balance(b).await.unwrap(), ether(10_001));
        assert_eq!(eth.transaction_count(a).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_creation_address_follows_sender_nonce() {
        let node = Arc::new(MockNode::new());
        let from = node.accounts()[0];
        let (address, hash) = node.deploy_code(from, datalogger_bytecode()).unwrap();
        assert_eq!(address, from.create(0));

        let eth = node.client();
        let receipt = eth.receipt(hash).await.unwrap().unwrap();
        assert_eq!(receipt.contract_address, Some(address));
        assert!(!eth.code(address).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payment_reverts_leave_chain_untouched() {
        let node = Arc::new(MockNode::new());
        let from = node.accounts()[0];
        let contract = node.deploy_datalogger(from).unwrap();
        let head = node.head();

        let input = IDataLogger::logWithPaymentCall {
            to: node.accounts()[1],
            memo: "rent".into(),
        }
        .abi_encode();
        let err = node
            .client()
            .send_transaction(&TransactionRequest {
                from,
                to: Some(contract),
                data: Some(input.into()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.revert_reason().as_deref(), Some("Must send ETH"));
        assert_eq!(node.head(), head);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let node = Arc::new(MockNode::new());
        node.fail("eth_blockNumber", 1);
        let eth = node.client();
        assert!(eth.block_number().await.is_err());
        assert_eq!(eth.block_number().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_changes_block_hashes() {
        let node = Arc::new(MockNode::new());
        node.mine(3);
        let eth = node.client();
        let before = eth.block(2, false).await.unwrap().unwrap().hash;

        node.reset();
        assert_eq!(node.head(), 0);
        node.mine(3);
        let after = eth.block(2, false).await.unwrap().unwrap().hash;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_log_filter_by_topic() {
        let node = Arc::new(MockNode::new());
        let target = Address::repeat_byte(0x77);
        let wanted = B256::repeat_byte(1);
        node.emit_raw_log(target, vec![wanted], Bytes::new());
        node.emit_raw_log(target, vec![B256::repeat_byte(2)], Bytes::new());

        let eth = node.client();
        let logs = eth
            .logs(&LogFilter::new(0, node.head()).address(target).events([wanted]))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, Some(1));
    }
}
