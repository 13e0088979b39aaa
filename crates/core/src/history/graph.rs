//! Subgraph queries over GraphQL.
//!
//! BigInt fields come back as decimal strings and are kept that way.

use std::time::Duration;

use alloy_primitives::{Address, B256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_GRAPH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("GraphQL request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GraphQL endpoint returned {0}")]
    Status(reqwest::StatusCode),
    #[error("GraphQL error: {0}")]
    Query(String),
    #[error("unexpected GraphQL response: {0}")]
    Decode(#[from] serde_json::Error),
}

// =============================================================================
// Queries
// =============================================================================

const DATA_RECORDS_QUERY: &str = r#"
query GetDataRecords($first: Int!, $skip: Int!) {
  dataRecords(first: $first, skip: $skip, orderBy: blockNumber, orderDirection: desc) {
    id
    recordId
    sender
    category
    data
    timestamp
    blockNumber
  }
  _meta {
    block {
      number
    }
  }
}
"#;

const TRANSACTION_RECORDS_QUERY: &str = r#"
query GetTransactionRecords($first: Int!, $skip: Int!) {
  transactionRecords(first: $first, skip: $skip) {
    id
    recordId
    from
    to
    amount
    memo
    timestamp
    blockNumber
  }
}
"#;

const META_QUERY: &str = r#"
query GetMeta {
  _meta {
    block {
      number
      hash
    }
    hasIndexingErrors
  }
}
"#;

const RECORDS_BY_SENDER_QUERY: &str = r#"
query GetRecordsBySender($sender: String!) {
  dataRecords(where: { sender: $sender }) {
    id
    category
    data
    timestamp
    blockNumber
  }
}
"#;

const RECORDS_BY_BLOCK_RANGE_QUERY: &str = r#"
query GetRecordsByBlockRange($startBlock: BigInt!, $endBlock: BigInt!) {
  dataRecords(where: { blockNumber_gte: $startBlock, blockNumber_lte: $endBlock }) {
    id
    sender
    category
    data
    blockNumber
    timestamp
  }
}
"#;

// =============================================================================
// Entities
// =============================================================================

/// A `DataRecord` entity. Fields a query does not select are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDataRecord {
    /// `{txHash}-{logIndex}`.
    pub id: String,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub sender: Option<Address>,
    /// Topic hash of the indexed category string.
    pub category: String,
    pub data: String,
    pub timestamp: String,
    pub block_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphTransactionRecord {
    pub id: String,
    pub record_id: String,
    pub from: Address,
    pub to: Address,
    /// Wei, decimal.
    pub amount: String,
    pub memo: String,
    pub timestamp: String,
    pub block_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaBlock {
    pub number: u64,
    #[serde(default)]
    pub hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMeta {
    pub block: MetaBlock,
    #[serde(default)]
    pub has_indexing_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRecordsPage {
    pub records: Vec<GraphDataRecord>,
    /// Block the subgraph had indexed when it answered.
    pub indexed_block: Option<u64>,
}

#[derive(Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataRecordsData {
    data_records: Vec<GraphDataRecord>,
    #[serde(default, rename = "_meta")]
    meta: Option<PartialMeta>,
}

#[derive(Deserialize)]
struct PartialMeta {
    block: MetaBlock,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRecordsData {
    transaction_records: Vec<GraphTransactionRecord>,
}

#[derive(Deserialize)]
struct MetaData {
    #[serde(rename = "_meta")]
    meta: GraphMeta,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_GRAPH_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `{query, variables}` and return the `data` object.
    pub async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, GraphError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::Status(status));
        }
        let body: GraphResponse = response.json().await?;
        if let Some(errors) = body.errors {
            return Err(GraphError::Query(errors.to_string()));
        }
        Ok(serde_json::from_value(body.data.unwrap_or(Value::Null))?)
    }

    /// Newest records first.
    pub async fn data_records(&self, first: u32, skip: u32) -> Result<DataRecordsPage, GraphError> {
        let data: DataRecordsData = self
            .query(DATA_RECORDS_QUERY, json!({ "first": first, "skip": skip }))
            .await?;
        Ok(DataRecordsPage {
            records: data.data_records,
            indexed_block: data.meta.map(|m| m.block.number),
        })
    }

    pub async fn transaction_records(
        &self,
        first: u32,
        skip: u32,
    ) -> Result<Vec<GraphTransactionRecord>, GraphError> {
        let data: TransactionRecordsData = self
            .query(TRANSACTION_RECORDS_QUERY, json!({ "first": first, "skip": skip }))
            .await?;
        Ok(data.transaction_records)
    }

    pub async fn meta(&self) -> Result<GraphMeta, GraphError> {
        let data: MetaData = self.query(META_QUERY, json!({})).await?;
        Ok(data.meta)
    }

    pub async fn records_by_sender(&self, sender: Address) -> Result<Vec<GraphDataRecord>, GraphError> {
        // Subgraph Bytes compare in lowercase hex.
        let sender = format!("0x{}", hex::encode(sender));
        let data: DataRecordsData = self
            .query(RECORDS_BY_SENDER_QUERY, json!({ "sender": sender }))
            .await?;
        Ok(data.data_records)
    }

    pub async fn records_by_block_range(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<GraphDataRecord>, GraphError> {
        let variables = json!({
            "startBlock": start_block.to_string(),
            "endBlock": end_block.to_string(),
        });
        let data: DataRecordsData = self.query(RECORDS_BY_BLOCK_RANGE_QUERY, variables).await?;
        Ok(data.data_records)
    }
}
