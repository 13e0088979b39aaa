//! Typed client for a deployed `DataLogger` contract.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use serde::{Deserialize, Serialize};

use crate::abi::{event_signatures, IDataLogger};
use crate::records::{DataRecord, RecordCounts, TransactionRecord};
use crate::rpc::{CallRequest, EthClient, LogFilter, RpcError, RpcLog, TransactionRequest};

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error(transparent)]
    Rpc(RpcError),
    #[error("failed to decode contract data: {0}")]
    Decode(#[from] alloy_sol_types::Error),
    #[error("transaction reverted: {0}")]
    Reverted(String),
}

impl From<RpcError> for ContractError {
    fn from(err: RpcError) -> Self {
        if err.is_revert() {
            let reason = err.revert_reason().unwrap_or_else(|| err.summary());
            return ContractError::Reverted(reason);
        }
        ContractError::Rpc(err)
    }
}

// =============================================================================
// Events
// =============================================================================

/// Where a log sits in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMeta {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl LogMeta {
    pub fn from_log(log: &RpcLog) -> Self {
        Self {
            block_number: log.block_number.unwrap_or_default(),
            transaction_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStoredEvent {
    #[serde(flatten)]
    pub meta: LogMeta,
    pub record_id: U256,
    pub sender: Address,
    /// `keccak256(category)`; the event does not carry the string.
    pub category_topic: B256,
    pub data: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLoggedEvent {
    #[serde(flatten)]
    pub meta: LogMeta,
    pub record_id: U256,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub memo: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DataLoggerEvent {
    DataStored(DataStoredEvent),
    TransactionLogged(TransactionLoggedEvent),
}

impl DataLoggerEvent {
    pub fn meta(&self) -> &LogMeta {
        match self {
            DataLoggerEvent::DataStored(e) => &e.meta,
            DataLoggerEvent::TransactionLogged(e) => &e.meta,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataLoggerEvent::DataStored(_) => "DataStored",
            DataLoggerEvent::TransactionLogged(_) => "TransactionLogged",
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            DataLoggerEvent::DataStored(e) => e.timestamp,
            DataLoggerEvent::TransactionLogged(e) => e.timestamp,
        }
    }
}

/// Decode a log emitted by the contract. `Ok(None)` for logs of other events.
pub fn decode_event(log: &RpcLog) -> Result<Option<DataLoggerEvent>, ContractError> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let topics = log.topics.iter().copied();
    let meta = LogMeta::from_log(log);

    if *topic0 == IDataLogger::DataStored::SIGNATURE_HASH {
        let e = IDataLogger::DataStored::decode_raw_log(topics, &log.data, true)?;
        return Ok(Some(DataLoggerEvent::DataStored(DataStoredEvent {
            meta,
            record_id: e.recordId,
            sender: e.sender,
            category_topic: e.category,
            data: e.data,
            timestamp: e.timestamp.saturating_to(),
        })));
    }
    if *topic0 == IDataLogger::TransactionLogged::SIGNATURE_HASH {
        let e = IDataLogger::TransactionLogged::decode_raw_log(topics, &log.data, true)?;
        return Ok(Some(DataLoggerEvent::TransactionLogged(
            TransactionLoggedEvent {
                meta,
                record_id: e.recordId,
                from: e.from,
                to: e.to,
                amount: e.amount,
                memo: e.memo,
                timestamp: e.timestamp.saturating_to(),
            },
        )));
    }
    Ok(None)
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct DataLoggerClient {
    eth: EthClient,
    address: Address,
}

impl DataLoggerClient {
    pub fn new(eth: EthClient, address: Address) -> Self {
        Self { eth, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn eth(&self) -> &EthClient {
        &self.eth
    }

    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, ContractError> {
        let request = CallRequest {
            to: self.address,
            data: call.abi_encode().into(),
            ..Default::default()
        };
        let output = self.eth.call(&request).await?;
        Ok(C::abi_decode_returns(&output, true)?)
    }

    pub async fn user_data_record_ids(&self, user: Address) -> Result<Vec<U256>, ContractError> {
        let ids = self
            .view(IDataLogger::getUserDataRecordIdsCall { user })
            .await?;
        Ok(ids._0)
    }

    pub async fn user_transaction_record_ids(
        &self,
        user: Address,
    ) -> Result<Vec<U256>, ContractError> {
        let ids = self
            .view(IDataLogger::getUserTransactionRecordIdsCall { user })
            .await?;
        Ok(ids._0)
    }

    pub async fn data_record(&self, id: U256) -> Result<DataRecord, ContractError> {
        let record = self.view(IDataLogger::getDataRecordCall { id }).await?;
        Ok(record._0.into())
    }

    pub async fn transaction_record(&self, id: U256) -> Result<TransactionRecord, ContractError> {
        let record = self
            .view(IDataLogger::getTransactionRecordCall { id })
            .await?;
        Ok(record._0.into())
    }

    pub async fn record_counts(&self) -> Result<RecordCounts, ContractError> {
        let counts = self.view(IDataLogger::getRecordCountsCall {}).await?;
        Ok(RecordCounts {
            data: counts.dataCount.saturating_to(),
            transactions: counts.txCount.saturating_to(),
        })
    }

    /// All data records of `user`, newest first.
    pub async fn user_data_records(&self, user: Address) -> Result<Vec<DataRecord>, ContractError> {
        let ids = self.user_data_record_ids(user).await?;
        let fetches = ids.into_iter().map(|id| self.data_record(id));
        let mut records = futures::future::try_join_all(fetches).await?;
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    /// All payment records sent by `user`, newest first.
    pub async fn user_transaction_records(
        &self,
        user: Address,
    ) -> Result<Vec<TransactionRecord>, ContractError> {
        let ids = self.user_transaction_record_ids(user).await?;
        let fetches = ids.into_iter().map(|id| self.transaction_record(id));
        let mut records = futures::future::try_join_all(fetches).await?;
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    async fn send(
        &self,
        from: Address,
        input: Vec<u8>,
        value: Option<U256>,
    ) -> Result<B256, ContractError> {
        let tx = TransactionRequest {
            from,
            to: Some(self.address),
            value,
            data: Some(Bytes::from(input)),
            gas: None,
        };
        Ok(self.eth.send_transaction(&tx).await?)
    }

    /// Submit `logData`; returns the transaction hash.
    pub async fn log_data(
        &self,
        from: Address,
        category: &str,
        data: &str,
    ) -> Result<B256, ContractError> {
        let input = IDataLogger::logDataCall {
            category: category.to_string(),
            data: data.to_string(),
        }
        .abi_encode();
        self.send(from, input, None).await
    }

    /// Submit `logWithPayment`, forwarding `amount` wei to `to`.
    pub async fn log_with_payment(
        &self,
        from: Address,
        to: Address,
        memo: &str,
        amount: U256,
    ) -> Result<B256, ContractError> {
        let input = IDataLogger::logWithPaymentCall {
            to,
            memo: memo.to_string(),
        }
        .abi_encode();
        self.send(from, input, Some(amount)).await
    }

    /// Contract events in `[from_block, to_block]`, in chain order.
    pub async fn events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DataLoggerEvent>, ContractError> {
        let filter = LogFilter::new(from_block, to_block)
            .address(self.address)
            .events(event_signatures());
        let logs = self.eth.logs(&filter).await?;
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_event(log) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        tx = ?log.transaction_hash,
                        error = %e,
                        "Skipping undecodable DataLogger log"
                    );
                }
            }
        }
        Ok(events)
    }
}
