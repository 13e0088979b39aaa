//! Client-side copies of the contract's records.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::abi;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRecord {
    pub id: U256,
    pub sender: Address,
    pub category: String,
    pub data: String,
    pub timestamp: u64,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: U256,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub memo: String,
    pub timestamp: u64,
    pub block_number: u64,
}

/// Totals reported by `getRecordCounts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCounts {
    pub data: u64,
    pub transactions: u64,
}

impl From<abi::DataRecord> for DataRecord {
    fn from(r: abi::DataRecord) -> Self {
        Self {
            id: r.id,
            sender: r.sender,
            category: r.category,
            data: r.data,
            timestamp: r.timestamp.saturating_to(),
            block_number: r.blockNumber.saturating_to(),
        }
    }
}

impl From<abi::TransactionRecord> for TransactionRecord {
    fn from(r: abi::TransactionRecord) -> Self {
        Self {
            id: r.id,
            from: r.from,
            to: r.to,
            amount: r.amount,
            memo: r.memo,
            timestamp: r.timestamp.saturating_to(),
            block_number: r.blockNumber.saturating_to(),
        }
    }
}

impl From<DataRecord> for abi::DataRecord {
    fn from(r: DataRecord) -> Self {
        Self {
            id: r.id,
            sender: r.sender,
            category: r.category,
            data: r.data,
            timestamp: U256::from(r.timestamp),
            blockNumber: U256::from(r.block_number),
        }
    }
}

impl From<TransactionRecord> for abi::TransactionRecord {
    fn from(r: TransactionRecord) -> Self {
        Self {
            id: r.id,
            from: r.from,
            to: r.to,
            amount: r.amount,
            memo: r.memo,
            timestamp: U256::from(r.timestamp),
            blockNumber: U256::from(r.block_number),
        }
    }
}
