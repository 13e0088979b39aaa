//! The three ways of putting data on chain.
//!
//! - **Event log**: `logData(category, data)`; cheapest, data lives in the log.
//! - **Contract payment**: `logWithPayment(to, memo)` with value; the contract
//!   records the payment and forwards the ether.
//! - **Native transfer**: a plain value transfer whose input field carries an
//!   optional text or hex payload.
//!
//! Requests are validated client-side before anything is sent; signing is left
//! to the node (unlocked accounts).

use std::fmt;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::abi::{normalize_hex, text_to_hex};
use crate::contract::{ContractError, DataLoggerClient};
use crate::rpc::{EthClient, RpcError, TransactionRequest};
use crate::units::{parse_positive_ether, AmountError};

pub const DEFAULT_RECEIPT_POLL: Duration = Duration::from_millis(500);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("category and data are required")]
    MissingLogFields,
    #[error("invalid Ethereum address {0:?}")]
    InvalidAddress(String),
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),
    #[error("memo is required for a contract payment")]
    MissingMemo,
    #[error("no DataLogger contract configured for this chain")]
    NoContract,
    #[error("invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error(transparent)]
    Rpc(RpcError),
    #[error("failed to decode contract data: {0}")]
    Decode(alloy_sol_types::Error),
}

impl From<ContractError> for UploadError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Reverted(reason) => UploadError::Reverted(first_line(&reason)),
            ContractError::Rpc(e) => UploadError::Rpc(e),
            ContractError::Decode(e) => UploadError::Decode(e),
        }
    }
}

impl From<RpcError> for UploadError {
    fn from(err: RpcError) -> Self {
        ContractError::from(err).into()
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

/// Payload attached to a native transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "lowercase")]
pub enum Payload {
    /// UTF-8 text, sent as its bytes.
    Text(String),
    /// Hex with or without `0x`.
    Hex(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum UploadRequest {
    EventLog {
        category: String,
        data: String,
    },
    ContractPayment {
        to: String,
        amount: String,
        memo: String,
    },
    NativeTransfer {
        to: String,
        amount: String,
        payload: Option<Payload>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadMode {
    EventLog,
    ContractPayment,
    NativeTransfer,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UploadMode::EventLog => "event-log",
            UploadMode::ContractPayment => "contract-payment",
            UploadMode::NativeTransfer => "native-transfer",
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedUpload {
    EventLog {
        contract: Address,
        category: String,
        data: String,
    },
    ContractPayment {
        contract: Address,
        to: Address,
        amount: U256,
        memo: String,
    },
    NativeTransfer {
        to: Address,
        amount: U256,
        data: Option<Bytes>,
    },
}

impl PreparedUpload {
    pub fn mode(&self) -> UploadMode {
        match self {
            PreparedUpload::EventLog { .. } => UploadMode::EventLog,
            PreparedUpload::ContractPayment { .. } => UploadMode::ContractPayment,
            PreparedUpload::NativeTransfer { .. } => UploadMode::NativeTransfer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub mode: UploadMode,
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
}

/// Accept only `0x` followed by exactly 40 hex digits.
pub fn validate_address(input: &str) -> Result<Address, UploadError> {
    let input = input.trim();
    let well_formed = input.len() == 42
        && input.starts_with("0x")
        && input[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !well_formed {
        return Err(UploadError::InvalidAddress(input.to_string()));
    }
    input
        .parse()
        .map_err(|_| UploadError::InvalidAddress(input.to_string()))
}

impl UploadRequest {
    pub fn mode(&self) -> UploadMode {
        match self {
            UploadRequest::EventLog { .. } => UploadMode::EventLog,
            UploadRequest::ContractPayment { .. } => UploadMode::ContractPayment,
            UploadRequest::NativeTransfer { .. } => UploadMode::NativeTransfer,
        }
    }

    pub fn validate(&self, contract: Option<Address>) -> Result<PreparedUpload, UploadError> {
        match self {
            UploadRequest::EventLog { category, data } => {
                if category.trim().is_empty() || data.is_empty() {
                    return Err(UploadError::MissingLogFields);
                }
                let contract = contract.ok_or(UploadError::NoContract)?;
                Ok(PreparedUpload::EventLog {
                    contract,
                    category: category.clone(),
                    data: data.clone(),
                })
            }
            UploadRequest::ContractPayment { to, amount, memo } => {
                let to = validate_address(to)?;
                let amount = parse_positive_ether(amount)?;
                if memo.trim().is_empty() {
                    return Err(UploadError::MissingMemo);
                }
                let contract = contract.ok_or(UploadError::NoContract)?;
                Ok(PreparedUpload::ContractPayment {
                    contract,
                    to,
                    amount,
                    memo: memo.clone(),
                })
            }
            UploadRequest::NativeTransfer {
                to,
                amount,
                payload,
            } => {
                let to = validate_address(to)?;
                let amount = parse_positive_ether(amount)?;
                let data = match payload {
                    None => None,
                    Some(Payload::Text(text)) if text.is_empty() => None,
                    Some(Payload::Text(text)) => Some(text_to_hex(text)),
                    Some(Payload::Hex(hex)) if hex.trim().is_empty() => None,
                    Some(Payload::Hex(hex)) => Some(normalize_hex(hex)?),
                };
                Ok(PreparedUpload::NativeTransfer { to, amount, data })
            }
        }
    }
}

/// Sends validated uploads from one unlocked account.
#[derive(Debug, Clone)]
pub struct Uploader {
    eth: EthClient,
    contract: Option<Address>,
    from: Address,
    poll: Duration,
    timeout: Duration,
}

impl Uploader {
    pub fn new(eth: EthClient, contract: Option<Address>, from: Address) -> Self {
        Self {
            eth,
            contract,
            from,
            poll: DEFAULT_RECEIPT_POLL,
            timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_receipt_wait(mut self, poll: Duration, timeout: Duration) -> Self {
        self.poll = poll;
        self.timeout = timeout;
        self
    }

    /// Validate, send and wait for the receipt.
    pub async fn submit(&self, request: &UploadRequest) -> Result<UploadOutcome, UploadError> {
        let prepared = request.validate(self.contract)?;
        let mode = prepared.mode();
        let tx_hash = self.send(prepared).await?;
        tracing::info!(%mode, tx = %tx_hash, "Upload submitted");

        let receipt = self
            .eth
            .wait_for_receipt(tx_hash, self.poll, self.timeout)
            .await?;
        let success = receipt.succeeded();
        if success {
            tracing::info!(%mode, block = receipt.block_number, "Upload confirmed");
        } else {
            tracing::warn!(%mode, tx = %tx_hash, "Upload mined but failed");
        }
        Ok(UploadOutcome {
            mode,
            tx_hash,
            block_number: receipt.block_number,
            success,
        })
    }

    async fn send(&self, prepared: PreparedUpload) -> Result<B256, UploadError> {
        match prepared {
            PreparedUpload::EventLog {
                contract,
                category,
                data,
            } => {
                let client = DataLoggerClient::new(self.eth.clone(), contract);
                Ok(client.log_data(self.from, &category, &data).await?)
            }
            PreparedUpload::ContractPayment {
                contract,
                to,
                amount,
                memo,
            } => {
                let client = DataLoggerClient::new(self.eth.clone(), contract);
                Ok(client
                    .log_with_payment(self.from, to, &memo, amount)
                    .await?)
            }
            PreparedUpload::NativeTransfer { to, amount, data } => {
                let tx = TransactionRequest {
                    from: self.from,
                    to: Some(to),
                    value: Some(amount),
                    data,
                    gas: None,
                };
                Ok(self.eth.send_transaction(&tx).await?)
            }
        }
    }
}
