//! Asset transfer history through Alchemy's `alchemy_getAssetTransfers`.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{alchemy_url, is_usable_alchemy_key};
use crate::rpc::{EthClient, RpcError};

pub const MAX_TRANSFERS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum AlchemyError {
    #[error(transparent)]
    Client(#[from] RpcError),
    #[error("fetching {direction} transfers of {address}: {source}")]
    Transfers {
        direction: Direction,
        address: Address,
        #[source]
        source: RpcError,
    },
}

const CATEGORIES: [TransferCategory; 5] = [
    TransferCategory::External,
    TransferCategory::Internal,
    TransferCategory::Erc20,
    TransferCategory::Erc721,
    TransferCategory::Erc1155,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferCategory {
    External,
    Internal,
    Erc20,
    Erc721,
    Erc1155,
    #[serde(other)]
    Other,
}

impl TransferCategory {
    pub fn is_token(self) -> bool {
        matches!(
            self,
            TransferCategory::Erc20 | TransferCategory::Erc721 | TransferCategory::Erc1155
        )
    }

    /// Native ETH movements, the ones carrying transaction input.
    pub fn is_native(self) -> bool {
        matches!(self, TransferCategory::External | TransferCategory::Internal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    /// ISO-8601 block time.
    pub block_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub decimal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
    pub hash: B256,
    #[serde(default)]
    pub block_num: Option<String>,
    #[serde(default)]
    pub unique_id: Option<String>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    /// Decimal amount in units of `asset`; absent for NFTs.
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub asset: Option<String>,
    pub category: TransferCategory,
    #[serde(default)]
    pub raw_contract: Option<RawContract>,
    #[serde(default)]
    pub metadata: Option<TransferMetadata>,
}

impl AssetTransfer {
    /// Block time in Unix milliseconds; 0 when missing or unparsable.
    pub fn timestamp_ms(&self) -> i64 {
        self.metadata
            .as_ref()
            .and_then(|m| chrono::DateTime::parse_from_rfc3339(&m.block_timestamp).ok())
            .map_or(0, |t| t.timestamp_millis())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetTransfersPage {
    #[serde(default)]
    transfers: Vec<AssetTransfer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        })
    }
}

/// Client for the Alchemy transfers API.
///
/// An unconfigured client (no usable key, or a chain Alchemy does not serve)
/// answers every query with an empty list.
#[derive(Debug, Clone)]
pub struct AlchemyClient {
    eth: Option<EthClient>,
}

impl AlchemyClient {
    pub fn new(api_key: Option<&str>, chain_key: &str) -> Result<Self, AlchemyError> {
        let url = api_key
            .filter(|key| is_usable_alchemy_key(Some(key)))
            .and_then(|key| alchemy_url(chain_key, key));
        match url {
            Some(url) => Self::with_url(&url),
            None => Ok(Self::unconfigured()),
        }
    }

    pub fn with_url(url: &str) -> Result<Self, AlchemyError> {
        Ok(Self {
            eth: Some(EthClient::http(url)?),
        })
    }

    pub fn with_client(eth: EthClient) -> Self {
        Self { eth: Some(eth) }
    }

    pub fn unconfigured() -> Self {
        Self { eth: None }
    }

    pub fn is_configured(&self) -> bool {
        self.eth.is_some()
    }

    /// Transfers sent or received by `address`, newest first, one entry per
    /// transaction hash.
    pub async fn asset_transfers(&self, address: Address) -> Result<Vec<AssetTransfer>, AlchemyError> {
        let Some(eth) = &self.eth else {
            tracing::warn!("Alchemy API key not configured, transfer history unavailable");
            return Ok(Vec::new());
        };

        let sent = fetch(eth, address, Direction::Sent).await?;
        let received = fetch(eth, address, Direction::Received).await?;
        let merged = merge_transfers(sent, received);
        tracing::debug!(%address, count = merged.len(), "Loaded asset transfers");
        Ok(merged)
    }
}

async fn fetch(
    eth: &EthClient,
    address: Address,
    direction: Direction,
) -> Result<Vec<AssetTransfer>, AlchemyError> {
    let mut params = json!({
        "fromBlock": "0x0",
        "toBlock": "latest",
        "category": CATEGORIES,
        "maxCount": format!("{MAX_TRANSFERS:#x}"),
        "withMetadata": true,
        "order": "desc",
    });
    let field = match direction {
        Direction::Sent => "fromAddress",
        Direction::Received => "toAddress",
    };
    params[field] = json!(address);

    let page: AssetTransfersPage = eth
        .request("alchemy_getAssetTransfers", json!([params]))
        .await
        .map_err(|source| AlchemyError::Transfers {
            direction,
            address,
            source,
        })?;
    Ok(page.transfers)
}

/// Newest first by block time; the first occurrence of a hash wins.
pub fn merge_transfers(sent: Vec<AssetTransfer>, received: Vec<AssetTransfer>) -> Vec<AssetTransfer> {
    let mut all: Vec<AssetTransfer> = sent.into_iter().chain(received).collect();
    // Stable, so equal timestamps keep sent-before-received order.
    all.sort_by_key(|t| std::cmp::Reverse(t.timestamp_ms()));

    let mut seen = std::collections::HashSet::new();
    all.retain(|t| seen.insert(t.hash));
    all
}
