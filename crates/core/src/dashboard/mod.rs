//! Local node inspector.
//!
//! Each panel owns one view of the node and knows how to load and refresh
//! it. [`Dashboard`] wires the panels to one client whose RPC traffic is
//! recorded by the [`ConsoleLog`], and drives them from new-block
//! notifications.

pub mod accounts;
pub mod blocks;
pub mod console;
pub mod contracts;
pub mod events;
pub mod transactions;

pub use accounts::{AccountInfo, AccountsPanel};
pub use blocks::{BlockSummary, BlocksPanel};
pub use console::{ConsoleLog, LogEntry, LogKind};
pub use contracts::{ContractEntry, ContractRegistry, ContractScanner, NewContract, ScanReport};
pub use events::{ContractEvent, EventsPanel};
pub use transactions::{TransactionDetails, TransactionFeed, TransactionSummary};

use std::sync::Arc;

use alloy_primitives::{B256, U256};

use crate::rpc::{EthClient, RpcError, RpcReceipt};
use crate::store::{LocalStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("the node has no unlocked accounts")]
    NoAccounts,
}

pub struct Dashboard {
    eth: EthClient,
    console: Arc<ConsoleLog>,
    pub accounts: AccountsPanel,
    pub blocks: BlocksPanel,
    pub transactions: TransactionFeed,
    pub contracts: ContractRegistry,
    pub events: EventsPanel,
    scanner: ContractScanner,
    gas_price: Option<U256>,
}

impl Dashboard {
    pub fn new(eth: EthClient, store: Arc<LocalStore>) -> Result<Self, DashboardError> {
        let console = Arc::new(ConsoleLog::new());
        let eth = eth.with_observer(console.clone());
        Ok(Self {
            accounts: AccountsPanel::new(eth.clone(), store.clone()),
            blocks: BlocksPanel::new(eth.clone()),
            transactions: TransactionFeed::new(eth.clone()),
            contracts: ContractRegistry::load(store.clone())?,
            events: EventsPanel::new(eth.clone()),
            scanner: ContractScanner::new(eth.clone(), store),
            gas_price: None,
            console,
            eth,
        })
    }

    pub fn eth(&self) -> &EthClient {
        &self.eth
    }

    pub fn console(&self) -> &Arc<ConsoleLog> {
        &self.console
    }

    pub fn gas_price(&self) -> Option<U256> {
        self.gas_price
    }

    /// Load every panel, in dependency order: contracts are detected before
    /// their events are read.
    pub async fn init(&mut self) -> Result<(), DashboardError> {
        let chain_id = self.eth.chain_id().await?;
        self.console.info(format!("Connected to chain {chain_id}"));
        self.refresh_all().await?;
        self.console.success("Dashboard ready");
        Ok(())
    }

    pub async fn refresh_all(&mut self) -> Result<(), DashboardError> {
        let result = self.load_panels().await;
        if let Err(e) = &result {
            self.console.error("Dashboard refresh failed", Some(e.to_string()));
        }
        result
    }

    async fn load_panels(&mut self) -> Result<(), DashboardError> {
        let accounts = self.accounts.load().await?.len();
        self.blocks.load_recent().await?;
        self.transactions.load_recent().await?;
        self.scan_contracts().await?;
        self.events.load_recent(&self.contracts).await?;
        self.refresh_gas_price().await;
        tracing::info!(
            accounts,
            blocks = self.blocks.len(),
            transactions = self.transactions.len(),
            contracts = self.contracts.len(),
            events = self.events.len(),
            "Dashboard refreshed"
        );
        Ok(())
    }

    /// Apply one new block to every panel.
    pub async fn on_new_block(&mut self, number: u64) -> Result<(), DashboardError> {
        if self.blocks.on_new_block(number).await?.is_none() {
            return Ok(());
        }
        if let Some(block) = self.eth.block(number, true).await? {
            self.transactions.ingest_block(&block).await?;
        }
        self.accounts.update_balances().await;

        let scan = self.scan_contracts().await?;
        if scan.reset {
            self.events.load_recent(&self.contracts).await?;
        } else {
            self.events.check_new_events(&self.contracts, number).await?;
        }
        self.refresh_gas_price().await;
        Ok(())
    }

    /// Detect deployments in blocks mined since the last scan.
    pub async fn scan_contracts(&mut self) -> Result<ScanReport, DashboardError> {
        let report = self.scanner.scan(&mut self.contracts).await?;
        if report.added > 0 {
            self.console
                .success(format!("Detected {} new contract(s)", report.added));
        }
        if report.reset {
            self.console.warning("Node was restarted, contract list rebuilt");
        }
        Ok(report)
    }

    /// Walk the whole chain again, one request per transaction.
    pub async fn rescan_contracts(&mut self) -> Result<ScanReport, DashboardError> {
        self.console.info("Full contract rescan started");
        let report = contracts::full_rescan(&self.eth, &mut self.contracts).await?;
        self.console
            .success(format!("Rescan found {} new contract(s)", report.added));
        Ok(report)
    }

    async fn refresh_gas_price(&mut self) {
        match self.eth.gas_price().await {
            Ok(price) => self.gas_price = Some(price),
            Err(e) => tracing::debug!(error = %e.summary(), "Gas price unavailable"),
        }
    }

    pub async fn transaction_details(&self, hash: B256) -> Result<TransactionDetails, DashboardError> {
        self.transactions.details(hash).await
    }

    /// Register the contract a transaction deployed. `Ok(false)` if the
    /// transaction is not a successful deployment or is already known.
    pub async fn add_deployed_contract(&mut self, hash: B256, name: Option<String>) -> Result<bool, DashboardError> {
        let details = self.transactions.details(hash).await?;
        let Some(address) = details.deployed_contract() else {
            return Ok(false);
        };
        let block_timestamp = match details.transaction.block_number {
            Some(number) => self.eth.block(number, false).await?.map(|b| b.timestamp),
            None => None,
        };
        self.contracts.add(NewContract {
            address,
            name,
            deploy_tx: Some(hash),
            deployer: Some(details.transaction.from),
            block_number: details.transaction.block_number,
            block_timestamp,
            abi: None,
        })
    }

    /// Send the 1 ETH test transfer from the first node account.
    pub async fn send_test_transaction(&mut self) -> Result<RpcReceipt, DashboardError> {
        let from = match self.accounts.get(0) {
            Some(account) => account.address,
            None => *self
                .eth
                .accounts()
                .await?
                .first()
                .ok_or(DashboardError::NoAccounts)?,
        };
        let receipt = transactions::send_test_transaction(&self.eth, from).await?;
        self.console.success(format!(
            "Test transaction mined in block {}",
            receipt.block_number
        ));
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::DataLoggerClient;
    use crate::mock::MockNode;
    use testresult::TestResult;

    fn dashboard(node: &Arc<MockNode>, dir: &tempfile::TempDir) -> Dashboard {
        let store = Arc::new(LocalStore::in_dir(dir.path()).unwrap());
        Dashboard::new(node.client(), store).unwrap()
    }

    #[tokio::test]
    async fn test_init_loads_every_panel() -> TestResult {
        let node = Arc::new(MockNode::new());
        let alice = node.accounts()[0];
        let address = node.deploy_datalogger(alice)?;
        DataLoggerClient::new(node.client(), address)
            .log_data(alice, "sensor", "t=1")
            .await?;
        let dir = tempfile::tempdir()?;
        let mut dash = dashboard(&node, &dir);

        dash.init().await?;
        assert_eq!(dash.accounts.accounts().len(), 20);
        assert_eq!(dash.blocks.len(), 3);
        assert_eq!(dash.transactions.len(), 2);
        assert!(dash.contracts.find(address).is_some());
        assert_eq!(dash.events.len(), 1);
        assert_eq!(dash.gas_price(), Some(U256::from(crate::mock::GAS_PRICE)));

        let messages: Vec<String> = dash.console().entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages.first().map(String::as_str), Some("Dashboard ready"));
        assert!(messages.iter().any(|m| m == "List accounts"));
        Ok(())
    }

    #[tokio::test]
    async fn test_new_block_updates_panels() -> TestResult {
        let node = Arc::new(MockNode::new());
        let dir = tempfile::tempdir()?;
        let mut dash = dashboard(&node, &dir);
        dash.init().await?;
        let before = dash.accounts.accounts()[0].balance;

        let alice = node.accounts()[0];
        let address = node.deploy_datalogger(alice)?;
        dash.on_new_block(node.head()).await?;
        assert!(dash.contracts.find(address).is_some());
        assert_eq!(dash.transactions.len(), 1);
        assert!(dash.accounts.accounts()[0].balance < before);

        DataLoggerClient::new(node.client(), address)
            .log_data(alice, "sensor", "t=2")
            .await?;
        dash.on_new_block(node.head()).await?;
        assert_eq!(dash.events.len(), 1);
        assert_eq!(dash.blocks.blocks().next().map(|b| b.number), Some(node.head()));
        Ok(())
    }

    #[tokio::test]
    async fn test_send_test_transaction_and_register_deploy() -> TestResult {
        let node = Arc::new(MockNode::new());
        let dir = tempfile::tempdir()?;
        let mut dash = dashboard(&node, &dir);

        let receipt = dash.send_test_transaction().await?;
        assert!(receipt.succeeded());
        assert!(!dash.add_deployed_contract(receipt.transaction_hash, None).await?);

        let (address, deploy_tx) = node.deploy_code(node.accounts()[3], crate::mock::datalogger_bytecode())?;
        assert!(dash.add_deployed_contract(deploy_tx, Some("Mine".into())).await?);
        let entry = dash.contracts.find(address).unwrap();
        assert_eq!(entry.name, "Mine");
        assert_eq!(entry.deployer, Some(node.accounts()[3]));
        let block = node.client().latest_block(false).await?.unwrap();
        assert_eq!(entry.timestamp, block.timestamp as i64 * 1_000);
        Ok(())
    }
}
