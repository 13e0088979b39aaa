//! JSON-RPC transport and a typed Ethereum client.
//!
//! ## Layers
//!
//! - [`Transport`] moves one JSON-RPC request. [`HttpTransport`] is the
//!   production implementation; tests use the in-memory mock node.
//! - [`EthClient`] wraps a transport with typed methods for the handful of
//!   `eth_*` calls the rest of the crate needs, and reports every request to an
//!   optional [`RpcObserver`] (the dashboard console hooks in here).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::{Revert, SolError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed future returned by [`Transport::request`].
pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RpcError>> + Send + 'a>>;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("failed to decode RPC response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed RPC response: {0}")]
    Malformed(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl RpcError {
    /// Reason a contract call reverted, if this error is a revert.
    ///
    /// Prefers the ABI-decoded `Error(string)` payload; falls back to the first
    /// line of the node's message.
    pub fn revert_reason(&self) -> Option<String> {
        let RpcError::Rpc { message, data, .. } = self else {
            return None;
        };
        data.as_ref()
            .and_then(revert_payload)
            .and_then(|payload| Revert::abi_decode(&payload, true).ok())
            .map(|revert| revert.reason)
            .or_else(|| first_line(message))
    }

    /// Whether the node rejected the call because the contract reverted.
    pub fn is_revert(&self) -> bool {
        match self {
            RpcError::Rpc { message, data, .. } => {
                data.as_ref().and_then(revert_payload).is_some_and(|p| {
                    p.starts_with(&Revert::SELECTOR)
                }) || message.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        }
    }

    /// First line of the error message, the way the CLI reports failures.
    pub fn summary(&self) -> String {
        let text = self.to_string();
        first_line(&text).unwrap_or(text)
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Nodes put revert data either directly in `error.data` or nested one level
/// down (`error.data.data`).
fn revert_payload(data: &Value) -> Option<Vec<u8>> {
    match data {
        Value::String(s) => hex::decode(s.trim_start_matches("0x")).ok(),
        Value::Object(map) => map.get("data").and_then(revert_payload),
        _ => None,
    }
}

// =============================================================================
// Transport
// =============================================================================

/// A JSON-RPC request sink.
pub trait Transport: Send + Sync + 'static {
    /// Issue `method` with `params` and return the raw `result` value.
    fn request(&self, method: &str, params: Value) -> RpcFuture<'_, Value>;
}

/// Observer notified of every request issued through an [`EthClient`].
pub trait RpcObserver: Send + Sync + 'static {
    fn on_request(&self, method: &str, params: &Value);

    fn on_error(&self, _method: &str, _error: &RpcError) {}
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RpcError::Http)?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn request(&self, method: &str, params: Value) -> RpcFuture<'_, Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            let response: RpcResponse = response.json().await?;
            response.into_result()
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// Serde adapter for hex-encoded JSON-RPC quantities held as `u64`.
pub(crate) mod quantity {
    use alloy_primitives::U64;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        U64::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        U64::deserialize(deserializer).map(|v| v.to::<u64>())
    }

    pub mod opt {
        use alloy_primitives::U64;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.map(U64::from).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            Option::<U64>::deserialize(deserializer).map(|v| v.map(|v| v.to::<u64>()))
        }
    }
}

/// Hex block number as sent in request params.
pub fn block_tag(number: u64) -> String {
    format!("{number:#x}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    #[serde(with = "quantity")]
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    #[serde(with = "quantity")]
    pub timestamp: u64,
    #[serde(default)]
    pub miner: Address,
    #[serde(with = "quantity")]
    pub gas_limit: u64,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub transactions: BlockTransactions,
}

/// Block body: hashes only, or full transaction objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Hashes(Vec<B256>),
    Full(Vec<RpcTransaction>),
}

impl Default for BlockTransactions {
    fn default() -> Self {
        BlockTransactions::Hashes(Vec::new())
    }
}

impl BlockTransactions {
    pub fn len(&self) -> usize {
        match self {
            BlockTransactions::Hashes(h) => h.len(),
            BlockTransactions::Full(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hashes(&self) -> Vec<B256> {
        match self {
            BlockTransactions::Hashes(h) => h.clone(),
            BlockTransactions::Full(t) => t.iter().map(|tx| tx.hash).collect(),
        }
    }

    /// Full transactions, if the block was fetched with `full = true`.
    pub fn full(&self) -> Option<&[RpcTransaction]> {
        match self {
            BlockTransactions::Full(t) => Some(t),
            // An empty body deserializes as `Hashes`; it is trivially "full".
            BlockTransactions::Hashes(h) if h.is_empty() => Some(&[]),
            BlockTransactions::Hashes(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    #[serde(default, with = "quantity::opt")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default, with = "quantity::opt")]
    pub transaction_index: Option<u64>,
    pub from: Address,
    /// `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default, rename = "gas")]
    pub gas_limit: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(with = "quantity")]
    pub nonce: u64,
    #[serde(default)]
    pub input: Bytes,
}

impl RpcTransaction {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    #[serde(with = "quantity")]
    pub block_number: u64,
    pub block_hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(default, with = "quantity::opt")]
    pub status: Option<u64>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

impl RpcReceipt {
    /// Pre-Byzantium receipts carry no status; treat them as successful.
    pub fn succeeded(&self) -> bool {
        self.status.map_or(true, |s| s == 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, with = "quantity::opt")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default, with = "quantity::opt")]
    pub transaction_index: Option<u64>,
    #[serde(default, with = "quantity::opt")]
    pub log_index: Option<u64>,
    #[serde(default)]
    pub removed: bool,
}

/// Parameters of `eth_sendTransaction`. The node signs with an unlocked account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "quantity::opt")]
    pub gas: Option<u64>,
}

/// Parameters of `eth_call`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

/// Parameters of `eth_getLogs`. Each topic position is `None` (wildcard) or a
/// set of alternatives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(with = "quantity")]
    pub from_block: u64,
    #[serde(with = "quantity")]
    pub to_block: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Option<Vec<B256>>>,
}

impl LogFilter {
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
            ..Default::default()
        }
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Match any of `signatures` in topic0.
    pub fn events(mut self, signatures: impl IntoIterator<Item = B256>) -> Self {
        let alternatives: Vec<B256> = signatures.into_iter().collect();
        if self.topics.is_empty() {
            self.topics.push(Some(alternatives));
        } else {
            self.topics[0] = Some(alternatives);
        }
        self
    }
}

// =============================================================================
// EthClient
// =============================================================================

/// Typed Ethereum JSON-RPC client.
#[derive(Clone)]
pub struct EthClient {
    transport: Arc<dyn Transport>,
    observer: Option<Arc<dyn RpcObserver>>,
}

impl std::fmt::Debug for EthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthClient")
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl EthClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            observer: None,
        }
    }

    /// Client over HTTP with the default timeout.
    pub fn http(url: &str) -> Result<Self, RpcError> {
        let transport = HttpTransport::new(url, DEFAULT_HTTP_TIMEOUT)?;
        Ok(Self::new(Arc::new(transport)))
    }

    pub fn with_observer(mut self, observer: Arc<dyn RpcObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Issue a raw request and decode its result.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        if let Some(observer) = &self.observer {
            observer.on_request(method, &params);
        }
        let result = self
            .transport
            .request(method, params)
            .await
            .and_then(|value| serde_json::from_value(value).map_err(RpcError::from));
        if let (Err(e), Some(observer)) = (&result, &self.observer) {
            observer.on_error(method, e);
        }
        result
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let number: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(number.to::<u64>())
    }

    pub async fn gas_price(&self) -> Result<U256, RpcError> {
        self.request("eth_gasPrice", json!([])).await
    }

    pub async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
        self.request("eth_accounts", json!([])).await
    }

    pub async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.request("eth_getBalance", json!([address, "latest"]))
            .await
    }

    pub async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        let count: U64 = self
            .request("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        Ok(count.to::<u64>())
    }

    pub async fn block(&self, number: u64, full: bool) -> Result<Option<RpcBlock>, RpcError> {
        self.request("eth_getBlockByNumber", json!([block_tag(number), full]))
            .await
    }

    pub async fn latest_block(&self, full: bool) -> Result<Option<RpcBlock>, RpcError> {
        self.request("eth_getBlockByNumber", json!(["latest", full]))
            .await
    }

    pub async fn transaction(&self, hash: B256) -> Result<Option<RpcTransaction>, RpcError> {
        self.request("eth_getTransactionByHash", json!([hash])).await
    }

    pub async fn receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        self.request("eth_getTransactionReceipt", json!([hash])).await
    }

    pub async fn code(&self, address: Address) -> Result<Bytes, RpcError> {
        self.request("eth_getCode", json!([address, "latest"])).await
    }

    pub async fn call(&self, call: &CallRequest) -> Result<Bytes, RpcError> {
        self.request("eth_call", json!([call, "latest"])).await
    }

    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256, RpcError> {
        self.request("eth_sendTransaction", json!([tx])).await
    }

    pub async fn logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, RpcError> {
        self.request("eth_getLogs", json!([filter])).await
    }

    /// Poll for a receipt until it appears or `timeout` elapses.
    pub async fn wait_for_receipt(
        &self,
        hash: B256,
        poll: Duration,
        timeout: Duration,
    ) -> Result<RpcReceipt, RpcError> {
        let wait = async {
            loop {
                if let Some(receipt) = self.receipt(hash).await? {
                    return Ok(receipt);
                }
                tokio::time::sleep(poll).await;
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(format!("receipt of {hash}"))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use parking_lot::Mutex;

    fn rpc_server(response: Value) -> Server {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/"))
                .respond_with(json_encoded(response)),
        );
        server
    }

    #[tokio::test]
    async fn test_http_transport_decodes_result() {
        let server = rpc_server(json!({"jsonrpc": "2.0", "id": 1, "result": "0x1b4"}));
        let client = EthClient::http(&server.url_str("/")).unwrap();
        assert_eq!(client.block_number().await.unwrap(), 436);
    }

    #[tokio::test]
    async fn test_http_transport_null_result() {
        let server = rpc_server(json!({"jsonrpc": "2.0", "id": 1, "result": null}));
        let client = EthClient::http(&server.url_str("/")).unwrap();
        let tx = client.transaction(B256::repeat_byte(1)).await.unwrap();
        assert!(tx.is_none());
    }

    #[tokio::test]
    async fn test_http_transport_rpc_error_carries_revert_reason() {
        let payload = Revert {
            reason: "Must send ETH".to_string(),
        }
        .abi_encode();
        let server = rpc_server(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32603,
                "message": "Error: VM Exception while processing transaction: reverted with reason string 'Must send ETH'\n    at DataLogger.logWithPayment",
                "data": format!("0x{}", hex::encode(payload)),
            }
        }));
        let client = EthClient::http(&server.url_str("/")).unwrap();
        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -32603, .. }));
        assert_eq!(err.revert_reason().as_deref(), Some("Must send ETH"));
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/"))
                .respond_with(status_code(500)),
        );
        let client = EthClient::http(&server.url_str("/")).unwrap();
        let err = client.chain_id().await.unwrap_err();
        assert!(matches!(err, RpcError::Http(_)));
        assert!(err.revert_reason().is_none());
    }

    #[test]
    fn test_revert_reason_falls_back_to_first_line() {
        let err = RpcError::Rpc {
            code: -32000,
            message: "execution reverted: Invalid recipient\nstack trace follows".to_string(),
            data: None,
        };
        assert_eq!(
            err.revert_reason().as_deref(),
            Some("execution reverted: Invalid recipient")
        );
    }

    #[test]
    fn test_revert_reason_nested_data() {
        let payload = Revert {
            reason: "Invalid recipient".to_string(),
        }
        .abi_encode();
        let err = RpcError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(json!({"message": "revert", "data": format!("0x{}", hex::encode(payload))})),
        };
        assert_eq!(err.revert_reason().as_deref(), Some("Invalid recipient"));
    }

    #[test]
    fn test_creation_transaction_has_no_recipient() {
        let tx: RpcTransaction = serde_json::from_value(json!({
            "hash": format!("0x{}", "11".repeat(32)),
            "blockNumber": "0x1",
            "blockHash": format!("0x{}", "22".repeat(32)),
            "transactionIndex": "0x0",
            "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "to": null,
            "value": "0x0",
            "gas": "0x1c9c380",
            "gasPrice": "0x3b9aca00",
            "nonce": "0x0",
            "input": "0x6080604052"
        }))
        .unwrap();
        assert!(tx.is_contract_creation());
        assert_eq!(tx.block_number, Some(1));
        assert_eq!(tx.input.len(), 5);
    }

    #[test]
    fn test_block_with_hash_list() {
        let block: RpcBlock = serde_json::from_value(json!({
            "number": "0xa",
            "hash": format!("0x{}", "aa".repeat(32)),
            "parentHash": format!("0x{}", "bb".repeat(32)),
            "timestamp": "0x65000000",
            "miner": "0xc014ba5ec014ba5ec014ba5ec014ba5ec014ba5e",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x5208",
            "baseFeePerGas": "0x3b9aca00",
            "transactions": [format!("0x{}", "cc".repeat(32))]
        }))
        .unwrap();
        assert_eq!(block.number, 10);
        assert_eq!(block.gas_used, 21_000);
        assert_eq!(block.transactions.len(), 1);
        assert!(block.transactions.full().is_none());
    }

    #[test]
    fn test_log_filter_serializes_topic_alternatives() {
        let a = B256::repeat_byte(0xaa);
        let b = B256::repeat_byte(0xbb);
        let filter = LogFilter::new(16, 255)
            .address(Address::repeat_byte(1))
            .events([a, b]);
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["fromBlock"], "0x10");
        assert_eq!(value["toBlock"], "0xff");
        assert_eq!(value["topics"][0].as_array().unwrap().len(), 2);
    }

    #[derive(Default)]
    struct Recorder {
        methods: Mutex<Vec<String>>,
        errors: Mutex<usize>,
    }

    impl RpcObserver for Recorder {
        fn on_request(&self, method: &str, _params: &Value) {
            self.methods.lock().push(method.to_string());
        }

        fn on_error(&self, _method: &str, _error: &RpcError) {
            *self.errors.lock() += 1;
        }
    }

    #[tokio::test]
    async fn test_observer_sees_requests_and_errors() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/"))
                .times(2)
                .respond_with(httptest::cycle![
                    json_encoded(json!({"jsonrpc": "2.0", "id": 1, "result": "0x7a69"})),
                    json_encoded(json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32601, "message": "method not found"}})),
                ]),
        );
        let recorder = Arc::new(Recorder::default());
        let client = EthClient::http(&server.url_str("/"))
            .unwrap()
            .with_observer(recorder.clone());

        assert_eq!(client.chain_id().await.unwrap(), 31337);
        assert!(client.accounts().await.is_err());
        assert_eq!(
            *recorder.methods.lock(),
            vec!["eth_chainId".to_string(), "eth_accounts".to_string()]
        );
        assert_eq!(*recorder.errors.lock(), 1);
    }
}
