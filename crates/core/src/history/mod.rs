//! Read-side history sources.
//!
//! - [`alchemy`]: every asset transfer of an address, via Alchemy.
//! - [`graph`]: DataLogger records from a deployed subgraph.
//! - [`direct`]: DataLogger records read from the contract itself.
//!
//! [`TransferHistory`] combines the Alchemy transfers with transaction input
//! from the node and classifies each one relative to the DataLogger contract.

pub mod alchemy;
pub mod direct;
pub mod graph;

pub use alchemy::{AlchemyClient, AlchemyError, AssetTransfer, TransferCategory};
pub use direct::{DirectHistory, UserRecords};
pub use graph::{GraphClient, GraphError};

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::abi::{parse_input_data, ParsedInput};
use crate::contract::ContractError;
use crate::rpc::{EthClient, RpcError};
use crate::store::{StoreError, TtlCache};

/// Only the newest transfers are enhanced with input data.
pub const MAX_ENHANCED: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Alchemy API key is required to view transfer history")]
    NotConfigured,
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Alchemy(#[from] AlchemyError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    /// Sent to or from the DataLogger contract.
    OurContract,
    OtherContract,
    Normal,
    Token,
}

/// An asset transfer with its transaction input interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedTransfer {
    #[serde(flatten)]
    pub transfer: AssetTransfer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<ParsedInput>,
    pub transaction_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_method: Option<String>,
}

impl EnhancedTransfer {
    pub fn has_data(&self) -> bool {
        self.input_data.as_ref().is_some_and(|input| !input.is_empty())
    }

    /// Whether `address` sent this transfer.
    pub fn is_outgoing(&self, address: Address) -> bool {
        self.transfer.from == address
    }
}

/// Classify a transfer relative to `our_contract`.
pub fn classify(
    transfer: &AssetTransfer,
    input: Option<&[u8]>,
    our_contract: Option<Address>,
) -> TransactionType {
    if let Some(ours) = our_contract {
        if transfer.to == Some(ours) || transfer.from == ours {
            return TransactionType::OurContract;
        }
    }
    if transfer.category.is_token() {
        return TransactionType::Token;
    }
    // Readable memos on plain transfers stay normal.
    if input.is_some_and(|input| parse_input_data(input, transfer.to, our_contract).is_contract_call()) {
        return TransactionType::OtherContract;
    }
    TransactionType::Normal
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    pub our_contract: usize,
    pub other_contracts: usize,
    pub normal: usize,
    pub tokens: usize,
}

impl TransferStats {
    pub fn from_transfers(transfers: &[EnhancedTransfer]) -> Self {
        let mut stats = Self::default();
        for transfer in transfers {
            match transfer.transaction_type {
                TransactionType::OurContract => stats.our_contract += 1,
                TransactionType::OtherContract => stats.other_contracts += 1,
                TransactionType::Normal => stats.normal += 1,
                TransactionType::Token => stats.tokens += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferFilter {
    #[default]
    All,
    OurContract,
    OtherContracts,
    Normal,
    Tokens,
    WithData,
}

impl TransferFilter {
    pub fn matches(self, transfer: &EnhancedTransfer) -> bool {
        match self {
            TransferFilter::All => true,
            TransferFilter::OurContract => transfer.transaction_type == TransactionType::OurContract,
            TransferFilter::OtherContracts => {
                transfer.transaction_type == TransactionType::OtherContract
            }
            TransferFilter::Normal => transfer.transaction_type == TransactionType::Normal,
            TransferFilter::Tokens => transfer.transaction_type == TransactionType::Token,
            TransferFilter::WithData => transfer.has_data(),
        }
    }

    pub fn apply(self, transfers: &[EnhancedTransfer]) -> Vec<&EnhancedTransfer> {
        transfers.iter().filter(|t| self.matches(t)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferHistoryPage {
    pub transfers: Vec<EnhancedTransfer>,
    pub stats: TransferStats,
    pub from_cache: bool,
}

pub fn cache_key(address: Address, chain_id: u64) -> String {
    format!("tx_cache_unified_{address}_{chain_id}")
}

/// Transfer history of an address, cached for the cache TTL.
pub struct TransferHistory {
    alchemy: AlchemyClient,
    eth: EthClient,
    cache: TtlCache,
    contract: Option<Address>,
}

impl TransferHistory {
    pub fn new(alchemy: AlchemyClient, eth: EthClient, cache: TtlCache, contract: Option<Address>) -> Self {
        Self {
            alchemy,
            eth,
            cache,
            contract,
        }
    }

    pub async fn load(&self, address: Address, chain_id: u64) -> Result<TransferHistoryPage, HistoryError> {
        let key = cache_key(address, chain_id);
        if let Some(transfers) = self.cache.load::<Vec<EnhancedTransfer>>(&key) {
            tracing::debug!(%address, count = transfers.len(), "Transfer history served from cache");
            return Ok(TransferHistoryPage {
                stats: TransferStats::from_transfers(&transfers),
                transfers,
                from_cache: true,
            });
        }
        self.fetch(address, &key).await
    }

    /// Drop the cached page and load again.
    pub async fn refresh(&self, address: Address, chain_id: u64) -> Result<TransferHistoryPage, HistoryError> {
        let key = cache_key(address, chain_id);
        self.cache.invalidate(&key);
        self.fetch(address, &key).await
    }

    async fn fetch(&self, address: Address, key: &str) -> Result<TransferHistoryPage, HistoryError> {
        if !self.alchemy.is_configured() {
            return Err(HistoryError::NotConfigured);
        }

        let mut transfers = self.alchemy.asset_transfers(address).await?;
        transfers.truncate(MAX_ENHANCED);
        let enhanced = transfers.into_iter().map(|t| self.enhance(t));
        let mut transfers = futures::future::join_all(enhanced).await;
        transfers.sort_by_key(|t| std::cmp::Reverse(t.transfer.timestamp_ms()));

        let stats = TransferStats::from_transfers(&transfers);
        tracing::info!(
            %address,
            count = transfers.len(),
            our_contract = stats.our_contract,
            other_contracts = stats.other_contracts,
            normal = stats.normal,
            tokens = stats.tokens,
            "Loaded transfer history"
        );

        if let Err(e) = self.cache.store(key, &transfers) {
            tracing::warn!(error = %e, "Failed to cache transfer history");
        }
        Ok(TransferHistoryPage {
            transfers,
            stats,
            from_cache: false,
        })
    }

    async fn enhance(&self, transfer: AssetTransfer) -> EnhancedTransfer {
        let input = if transfer.category.is_native() {
            match self.eth.transaction(transfer.hash).await {
                Ok(tx) => tx.map(|tx| tx.input),
                Err(e) => {
                    tracing::debug!(hash = %transfer.hash, error = %e, "Transaction input unavailable");
                    None
                }
            }
        } else {
            None
        };

        let transaction_type = classify(&transfer, input.as_deref().map(|v| &**v), self.contract);
        let parsed_data = input
            .as_ref()
            .map(|input| parse_input_data(input, transfer.to, self.contract));
        let contract_method = match &parsed_data {
            Some(ParsedInput::Contract(method)) => Some(method.clone()),
            _ => None,
        };
        EnhancedTransfer {
            transfer,
            input_data: input,
            parsed_data,
            transaction_type,
            contract_method,
        }
    }
}
