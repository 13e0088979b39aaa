//! Registry of known contracts, and detection of contract deployments on the
//! local node.
//!
//! [`full_rescan`] walks every block the slow way: one request per
//! transaction. [`ContractScanner`] is what the dashboard normally uses: it
//! remembers the last scanned block and its hash, fetches blocks with full
//! transactions, and starts over when the node was restarted underneath it.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use super::DashboardError;
use crate::rpc::{EthClient, RpcBlock, RpcTransaction};
use crate::store::LocalStore;

pub const REGISTRY_KEY: &str = "contracts";
pub const SCAN_CURSOR_KEY: &str = "contract_scan_cursor";
/// Cursor is persisted every this many blocks during a scan.
pub const CHECKPOINT_INTERVAL: u64 = 25;

/// `Contract 0x123456`.
pub fn default_contract_name(address: &Address) -> String {
    let text = address.to_string();
    format!("Contract {}", &text[..8])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEntry {
    pub id: Ulid,
    pub address: Address,
    pub name: String,
    #[serde(default)]
    pub deploy_tx: Option<B256>,
    #[serde(default)]
    pub deployer: Option<Address>,
    #[serde(default)]
    pub block_number: Option<u64>,
    /// Time of the deploying block, or of registration when the block is
    /// unknown. Unix milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub abi: Option<Value>,
    #[serde(default)]
    pub verified: bool,
}

/// A contract creation seen on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedContract {
    pub address: Address,
    pub deploy_tx: B256,
    pub deployer: Address,
    pub block_number: u64,
    /// Block time, unix seconds.
    pub block_timestamp: u64,
}

#[derive(Debug, Clone, Default)]
pub struct NewContract {
    pub address: Address,
    pub name: Option<String>,
    pub deploy_tx: Option<B256>,
    pub deployer: Option<Address>,
    pub block_number: Option<u64>,
    /// Block time of the deployment, unix seconds.
    pub block_timestamp: Option<u64>,
    pub abi: Option<Value>,
}

impl From<DetectedContract> for NewContract {
    fn from(found: DetectedContract) -> Self {
        Self {
            address: found.address,
            name: None,
            deploy_tx: Some(found.deploy_tx),
            deployer: Some(found.deployer),
            block_number: Some(found.block_number),
            block_timestamp: Some(found.block_timestamp),
            abi: None,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
pub struct ContractRegistry {
    store: Arc<LocalStore>,
    entries: Vec<ContractEntry>,
}

impl ContractRegistry {
    pub fn load(store: Arc<LocalStore>) -> Result<Self, DashboardError> {
        let entries = store.get(REGISTRY_KEY)?.unwrap_or_default();
        Ok(Self { store, entries })
    }

    pub fn entries(&self) -> &[ContractEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, address: Address) -> Option<&ContractEntry> {
        self.entries.iter().find(|e| e.address == address)
    }

    /// Add a contract unless its address is already registered. Returns
    /// whether it was added.
    pub fn add(&mut self, contract: NewContract) -> Result<bool, DashboardError> {
        if self.find(contract.address).is_some() {
            return Ok(false);
        }
        let name = contract
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_contract_name(&contract.address));
        tracing::info!(address = %contract.address, %name, "Registered contract");
        self.entries.push(ContractEntry {
            id: Ulid::new(),
            address: contract.address,
            name,
            deploy_tx: contract.deploy_tx,
            deployer: contract.deployer,
            block_number: contract.block_number,
            timestamp: contract
                .block_timestamp
                .and_then(|secs| i64::try_from(secs).ok())
                .map_or_else(|| chrono::Utc::now().timestamp_millis(), |secs| secs * 1_000),
            abi: contract.abi,
            verified: false,
        });
        self.persist()?;
        Ok(true)
    }

    pub fn remove(&mut self, address: Address) -> Result<bool, DashboardError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.address != address);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Drop detected contracts mined above `head`. Entries added by hand
    /// have no block and are kept.
    fn drop_above(&mut self, head: u64) -> Result<usize, DashboardError> {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.block_number.map_or(true, |block| block <= head));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            self.persist()?;
        }
        Ok(dropped)
    }

    fn persist(&self) -> Result<(), DashboardError> {
        self.store.set(REGISTRY_KEY, &self.entries)?;
        Ok(())
    }
}

// =============================================================================
// Detection
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Blocks looked at.
    pub scanned: u64,
    /// Newly registered contracts.
    pub added: usize,
    /// The node was restarted since the last scan.
    pub reset: bool,
}

async fn detect(
    eth: &EthClient,
    tx: &RpcTransaction,
    block: &RpcBlock,
) -> Result<Option<DetectedContract>, DashboardError> {
    if !tx.is_contract_creation() {
        return Ok(None);
    }
    let Some(receipt) = eth.receipt(tx.hash).await? else {
        return Ok(None);
    };
    Ok(receipt.contract_address.map(|address| DetectedContract {
        address,
        deploy_tx: tx.hash,
        deployer: tx.from,
        block_number: block.number,
        block_timestamp: block.timestamp,
    }))
}

fn register(registry: &mut ContractRegistry, found: Vec<DetectedContract>) -> Result<usize, DashboardError> {
    let mut added = 0;
    for contract in found {
        if registry.add(contract.into())? {
            added += 1;
        }
    }
    Ok(added)
}

/// Walk blocks `1..=head`, fetching every transaction on its own and the
/// receipt of each contract creation.
pub async fn full_rescan(eth: &EthClient, registry: &mut ContractRegistry) -> Result<ScanReport, DashboardError> {
    let head = eth.block_number().await?;
    let mut report = ScanReport::default();

    for number in 1..=head {
        let Some(block) = eth.block(number, false).await? else {
            continue;
        };
        report.scanned += 1;
        let mut found = Vec::new();
        for hash in block.transactions.hashes() {
            let Some(tx) = eth.transaction(hash).await? else {
                continue;
            };
            found.extend(detect(eth, &tx, &block).await?);
        }
        report.added += register(registry, found)?;
    }
    tracing::info!(head, added = report.added, "Full contract rescan finished");
    Ok(report)
}

/// Last block a [`ContractScanner`] finished, with its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub block: u64,
    pub hash: B256,
}

#[derive(Debug)]
pub struct ContractScanner {
    eth: EthClient,
    store: Arc<LocalStore>,
}

impl ContractScanner {
    pub fn new(eth: EthClient, store: Arc<LocalStore>) -> Self {
        Self { eth, store }
    }

    pub fn cursor(&self) -> Result<Option<ScanCursor>, DashboardError> {
        Ok(self.store.get(SCAN_CURSOR_KEY)?)
    }

    fn save_cursor(&self, block: &RpcBlock) -> Result<(), DashboardError> {
        let cursor = ScanCursor {
            block: block.number,
            hash: block.hash,
        };
        self.store.set(SCAN_CURSOR_KEY, &cursor)?;
        Ok(())
    }

    /// Scan blocks mined since the last run.
    pub async fn scan(&self, registry: &mut ContractRegistry) -> Result<ScanReport, DashboardError> {
        let head = self.eth.block_number().await?;
        let mut report = ScanReport::default();

        let start = match self.cursor()? {
            None => 1,
            Some(cursor) if cursor.block > head => {
                tracing::warn!(cursor = cursor.block, head, "Node height below scan cursor, chain was reset");
                report.reset = true;
                1
            }
            Some(cursor) => {
                let current = self.eth.block(cursor.block, false).await?;
                if current.is_some_and(|b| b.hash == cursor.hash) {
                    cursor.block + 1
                } else {
                    tracing::warn!(cursor = cursor.block, "Scan cursor hash changed, chain was reset");
                    report.reset = true;
                    1
                }
            }
        };

        if report.reset {
            self.store.remove(SCAN_CURSOR_KEY)?;
            let dropped = registry.drop_above(head)?;
            tracing::info!(dropped, "Dropped contracts above the new head");
        }

        for number in start..=head {
            let Some(block) = self.eth.block(number, true).await? else {
                continue;
            };
            let mut found = Vec::new();
            for tx in block.transactions.full().unwrap_or_default() {
                found.extend(detect(&self.eth, tx, &block).await?);
            }
            report.added += register(registry, found)?;
            report.scanned += 1;

            if number == head || report.scanned % CHECKPOINT_INTERVAL == 0 {
                self.save_cursor(&block)?;
            }
        }

        if report.scanned > 0 {
            tracing::debug!(
                from = start,
                to = head,
                added = report.added,
                "Contract scan finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{datalogger_bytecode, MockNode};
    use alloy_primitives::Bytes;
    use testresult::TestResult;

    struct Fixture {
        node: Arc<MockNode>,
        store: Arc<LocalStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            node: Arc::new(MockNode::new()),
            store: Arc::new(LocalStore::in_dir(dir.path()).unwrap()),
            _dir: dir,
        }
    }

    fn count(requests: &[String], method: &str) -> usize {
        requests.iter().filter(|m| *m == method).count()
    }

    #[test]
    fn test_registry_dedupes_and_persists() -> TestResult {
        let f = fixture();
        let address = Address::repeat_byte(0x12);
        let mut registry = ContractRegistry::load(f.store.clone())?;

        assert!(registry.add(NewContract {
            address,
            ..Default::default()
        })?);
        assert!(!registry.add(NewContract {
            address,
            name: Some("Again".into()),
            ..Default::default()
        })?);

        let reloaded = ContractRegistry::load(f.store.clone())?;
        assert_eq!(reloaded.len(), 1);
        let entry = reloaded.find(address).unwrap();
        assert_eq!(entry.name, "Contract 0x121212");
        assert!(!entry.verified);

        let mut registry = reloaded;
        assert!(registry.remove(address)?);
        assert!(!registry.remove(address)?);
        assert!(ContractRegistry::load(f.store)?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_full_rescan_finds_deployments() -> TestResult {
        let f = fixture();
        let from = f.node.accounts()[0];
        let first = f.node.deploy_datalogger(from)?;
        f.node.mine(2);
        let (second, deploy_tx) = f.node.deploy_code(from, Bytes::from_static(&[0x60, 0x00]))?;

        let mut registry = ContractRegistry::load(f.store.clone())?;
        let report = full_rescan(&f.node.client(), &mut registry).await?;
        assert_eq!(report.scanned, 4);
        assert_eq!(report.added, 2);
        assert_eq!(registry.find(first).and_then(|e| e.block_number), Some(1));
        let block = f.node.client().block(1, false).await?.unwrap();
        assert_eq!(
            registry.find(first).map(|e| e.timestamp),
            Some(block.timestamp as i64 * 1_000)
        );
        let entry = registry.find(second).unwrap();
        assert_eq!(entry.deploy_tx, Some(deploy_tx));
        assert_eq!(entry.deployer, Some(from));

        let again = full_rescan(&f.node.client(), &mut registry).await?;
        assert_eq!(again.added, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_scanner_resumes_after_cursor() -> TestResult {
        let f = fixture();
        let from = f.node.accounts()[0];
        f.node.deploy_datalogger(from)?;
        f.node.mine(3);

        let scanner = ContractScanner::new(f.node.client(), f.store.clone());
        let mut registry = ContractRegistry::load(f.store.clone())?;
        let report = scanner.scan(&mut registry).await?;
        assert_eq!((report.scanned, report.added), (4, 1));
        let cursor = scanner.cursor()?.unwrap();
        assert_eq!(cursor.block, 4);

        let second = f.node.deploy_code(from, datalogger_bytecode())?.0;
        f.node.clear_requests();
        let report = scanner.scan(&mut registry).await?;
        assert_eq!((report.scanned, report.added), (1, 1));
        assert!(!report.reset);
        assert!(registry.find(second).is_some());
        // One block to check the cursor, one to scan.
        assert_eq!(count(&f.node.requests(), "eth_getBlockByNumber"), 2);
        assert_eq!(count(&f.node.requests(), "eth_getTransactionByHash"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_interrupted_scan_keeps_checkpoint() -> TestResult {
        let f = fixture();
        f.node.mine(29);
        let contract = f.node.deploy_datalogger(f.node.accounts()[0])?;
        f.node.mine(10);
        let scanner = ContractScanner::new(f.node.client(), f.store.clone());
        let mut registry = ContractRegistry::load(f.store.clone())?;

        // The creation in block 30 needs its receipt.
        f.node.fail("eth_getTransactionReceipt", 1);
        assert!(scanner.scan(&mut registry).await.is_err());
        assert_eq!(scanner.cursor()?.map(|c| c.block), Some(CHECKPOINT_INTERVAL));

        let report = scanner.scan(&mut registry).await?;
        assert_eq!(report.scanned, 40 - CHECKPOINT_INTERVAL);
        assert_eq!(report.added, 1);
        assert!(registry.find(contract).is_some());

        let head = f.node.client().latest_block(false).await?.unwrap();
        let cursor = scanner.cursor()?.unwrap();
        assert_eq!((cursor.block, cursor.hash), (head.number, head.hash));
        Ok(())
    }

    #[tokio::test]
    async fn test_scanner_detects_reset() -> TestResult {
        let f = fixture();
        let from = f.node.accounts()[0];
        f.node.mine(5);
        let late = f.node.deploy_datalogger(from)?;
        let mut registry = ContractRegistry::load(f.store.clone())?;
        registry.add(NewContract {
            address: Address::repeat_byte(0xaa),
            name: Some("Manual".into()),
            ..Default::default()
        })?;

        let scanner = ContractScanner::new(f.node.client(), f.store.clone());
        scanner.scan(&mut registry).await?;
        assert!(registry.find(late).is_some());

        // Same height, different hashes.
        f.node.reset();
        f.node.mine(6);
        let report = scanner.scan(&mut registry).await?;
        assert!(report.reset);
        assert_eq!(report.scanned, 6);
        assert!(registry.find(late).is_some());

        // Lower height than the cursor.
        f.node.reset();
        f.node.mine(2);
        let report = scanner.scan(&mut registry).await?;
        assert!(report.reset);
        assert!(registry.find(late).is_none());
        assert!(registry.find(Address::repeat_byte(0xaa)).is_some());
        assert_eq!(scanner.cursor()?.map(|c| c.block), Some(2));
        Ok(())
    }
}
