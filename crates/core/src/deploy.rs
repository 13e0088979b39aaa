//! Contract deployment from a Hardhat artifact, and post-deployment checks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::abi::{event_signatures, normalize_hex};
use crate::config::ENV_PREFIX;
use crate::contract::{ContractError, DataLoggerClient, LogMeta};
use crate::records::RecordCounts;
use crate::rpc::{EthClient, LogFilter, RpcError, TransactionRequest};

pub const DEFAULT_VERIFY_LOOKBACK: u64 = 100;

const RECEIPT_POLL: Duration = Duration::from_secs(1);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: invalid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: artifact has no bytecode", .0.display())]
    MissingBytecode(PathBuf),
    #[error("artifact bytecode is not hex: {0}")]
    InvalidBytecode(#[from] hex::FromHexError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("deployment transaction {0} reverted")]
    Reverted(B256),
    #[error("receipt of {0} has no contract address")]
    NoContractAddress(B256),
    #[error("no contract code at {0}")]
    NoCode(Address),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    bytecode: Option<String>,
}

/// Creation bytecode from a Hardhat artifact file.
pub fn read_bytecode(path: &Path) -> Result<Bytes, DeployError> {
    let raw = std::fs::read(path).map_err(|source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact: Artifact = serde_json::from_slice(&raw).map_err(|source| DeployError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let bytecode = artifact
        .bytecode
        .filter(|code| !code.trim_start_matches("0x").is_empty())
        .ok_or_else(|| DeployError::MissingBytecode(path.to_path_buf()))?;
    tracing::debug!(
        contract = artifact.contract_name.as_deref().unwrap_or("?"),
        size = bytecode.len() / 2,
        "Read artifact"
    );
    Ok(normalize_hex(&bytecode)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub network: String,
    pub address: Address,
    pub deploy_block: u64,
    pub deploy_tx: B256,
    /// RFC 3339.
    pub timestamp: String,
}

impl DeploymentInfo {
    pub fn path(dir: &Path, network: &str) -> PathBuf {
        dir.join(format!("{network}.json"))
    }

    /// Write `{dir}/{network}.json`, creating `dir` if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, DeployError> {
        let path = Self::path(dir, &self.network);
        let io_err = |source| DeployError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let json = serde_json::to_vec_pretty(self).map_err(|source| DeployError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(io_err)?;
        Ok(path)
    }

    pub fn load(dir: &Path, network: &str) -> Result<Self, DeployError> {
        let path = Self::path(dir, network);
        let raw = std::fs::read(&path).map_err(|source| DeployError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| DeployError::Json { path, source })
    }

    /// `.env` lines that point the tools at this deployment.
    pub fn env_lines(&self) -> [String; 2] {
        let upper = self.network.to_ascii_uppercase();
        [
            format!("{ENV_PREFIX}CONTRACT_ADDRESS_{upper}={}", self.address),
            format!("{ENV_PREFIX}CONTRACT_BLOCK_{upper}={}", self.deploy_block),
        ]
    }
}

/// Deploy the artifact at `artifact_path` from `from` and wait for it to be
/// mined.
pub async fn deploy_artifact(
    eth: &EthClient,
    from: Address,
    artifact_path: &Path,
    network: &str,
) -> Result<DeploymentInfo, DeployError> {
    let bytecode = read_bytecode(artifact_path)?;
    let hash = eth
        .send_transaction(&TransactionRequest {
            from,
            data: Some(bytecode),
            ..Default::default()
        })
        .await?;
    tracing::info!(%hash, %from, network, "Deployment transaction sent");

    let receipt = eth.wait_for_receipt(hash, RECEIPT_POLL, RECEIPT_TIMEOUT).await?;
    if !receipt.succeeded() {
        return Err(DeployError::Reverted(hash));
    }
    let address = receipt
        .contract_address
        .ok_or(DeployError::NoContractAddress(hash))?;
    tracing::info!(%address, block = receipt.block_number, "Contract deployed");

    Ok(DeploymentInfo {
        network: network.to_string(),
        address,
        deploy_block: receipt.block_number,
        deploy_tx: hash,
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

/// Event activity in the verification window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub count: usize,
    pub latest: Option<LogMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub address: Address,
    pub code_size: usize,
    pub counts: RecordCounts,
    pub from_block: u64,
    pub to_block: u64,
    pub data_stored: EventSummary,
    pub transaction_logged: EventSummary,
}

/// Check that `address` holds a DataLogger and summarize its recent events.
pub async fn verify_deployment(
    eth: &EthClient,
    address: Address,
    lookback: u64,
) -> Result<VerificationReport, DeployError> {
    let code = eth.code(address).await?;
    if code.is_empty() {
        return Err(DeployError::NoCode(address));
    }
    let counts = DataLoggerClient::new(eth.clone(), address)
        .record_counts()
        .await?;

    let head = eth.block_number().await?;
    let from_block = head.saturating_sub(lookback);
    let filter = LogFilter::new(from_block, head)
        .address(address)
        .events(event_signatures());
    let logs = eth.logs(&filter).await?;

    let [data_stored_sig, transaction_logged_sig] = event_signatures();
    let mut data_stored = EventSummary::default();
    let mut transaction_logged = EventSummary::default();
    for log in &logs {
        let summary = match log.topics.first() {
            Some(topic) if *topic == data_stored_sig => &mut data_stored,
            Some(topic) if *topic == transaction_logged_sig => &mut transaction_logged,
            _ => continue,
        };
        summary.count += 1;
        summary.latest = Some(LogMeta::from_log(log));
    }

    Ok(VerificationReport {
        address,
        code_size: code.len(),
        counts,
        from_block,
        to_block: head,
        data_stored,
        transaction_logged,
    })
}
