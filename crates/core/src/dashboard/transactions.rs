//! Feed of recent transactions and per-transaction details.

use std::collections::VecDeque;
use std::time::Duration;

use alloy_primitives::{address, Address, Bytes, B256, U256};
use serde::Serialize;

use super::DashboardError;
use crate::rpc::{EthClient, RpcBlock, RpcReceipt, RpcTransaction, TransactionRequest};

pub const MAX_TRANSACTIONS: usize = 50;
/// Blocks walked back from the head when the feed is first loaded.
pub const SCAN_BLOCKS: u64 = 5;

/// Hardhat's second default account.
pub const TEST_RECIPIENT: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

const RECEIPT_POLL: Duration = Duration::from_millis(250);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub hash: B256,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: Option<U256>,
    pub gas_limit: U256,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub nonce: u64,
    pub input: Bytes,
    /// Timestamp of the including block.
    pub timestamp: u64,
}

impl TransactionSummary {
    pub fn new(tx: RpcTransaction, block: &RpcBlock) -> Self {
        Self {
            hash: tx.hash,
            block_number: tx.block_number.unwrap_or(block.number),
            from: tx.from,
            to: tx.to,
            value: tx.value,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            max_fee_per_gas: tx.max_fee_per_gas,
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
            nonce: tx.nonce,
            input: tx.input,
            timestamp: block.timestamp,
        }
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// A transaction joined with its receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    #[serde(flatten)]
    pub transaction: RpcTransaction,
    /// `None` while pending.
    pub success: Option<bool>,
    pub gas_used: Option<u64>,
    pub contract_address: Option<Address>,
}

impl TransactionDetails {
    pub fn new(transaction: RpcTransaction, receipt: Option<&RpcReceipt>) -> Self {
        Self {
            transaction,
            success: receipt.map(RpcReceipt::succeeded),
            gas_used: receipt.map(|r| r.gas_used),
            contract_address: receipt.and_then(|r| r.contract_address),
        }
    }

    /// Mined contract creation.
    pub fn deployed_contract(&self) -> Option<Address> {
        self.contract_address
            .filter(|_| self.transaction.is_contract_creation())
    }
}

#[derive(Debug)]
pub struct TransactionFeed {
    eth: EthClient,
    transactions: VecDeque<TransactionSummary>,
}

impl TransactionFeed {
    pub fn new(eth: EthClient) -> Self {
        Self {
            eth,
            transactions: VecDeque::with_capacity(MAX_TRANSACTIONS),
        }
    }

    /// Newest first.
    pub fn transactions(&self) -> impl Iterator<Item = &TransactionSummary> {
        self.transactions.iter()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Rebuild the feed from the last [`SCAN_BLOCKS`] blocks. Genesis holds
    /// no transactions and is skipped.
    pub async fn load_recent(&mut self) -> Result<usize, DashboardError> {
        let head = self.eth.block_number().await?;
        let stop = head.saturating_sub(SCAN_BLOCKS);

        let mut transactions = VecDeque::with_capacity(MAX_TRANSACTIONS);
        'blocks: for number in ((stop + 1)..=head).rev() {
            let Some(block) = self.eth.block(number, true).await? else {
                continue;
            };
            for tx in self.block_transactions(&block).await?.into_iter().rev() {
                if transactions.len() >= MAX_TRANSACTIONS {
                    break 'blocks;
                }
                transactions.push_back(TransactionSummary::new(tx, &block));
            }
        }
        self.transactions = transactions;
        tracing::debug!(head, loaded = self.transactions.len(), "Loaded recent transactions");
        Ok(self.transactions.len())
    }

    /// Prepend the transactions of a new block and trim to
    /// [`MAX_TRANSACTIONS`]. Returns how many were added.
    pub async fn ingest_block(&mut self, block: &RpcBlock) -> Result<usize, DashboardError> {
        let txs = self.block_transactions(block).await?;
        let added = txs.len();
        for tx in txs {
            self.transactions.push_front(TransactionSummary::new(tx, block));
        }
        self.transactions.truncate(MAX_TRANSACTIONS);
        Ok(added)
    }

    /// Full transactions of `block`, fetched one by one when the block only
    /// carries hashes.
    async fn block_transactions(&self, block: &RpcBlock) -> Result<Vec<RpcTransaction>, DashboardError> {
        if let Some(full) = block.transactions.full() {
            return Ok(full.to_vec());
        }
        let mut txs = Vec::with_capacity(block.transactions.len());
        for hash in block.transactions.hashes() {
            match self.eth.transaction(hash).await? {
                Some(tx) => txs.push(tx),
                None => tracing::debug!(%hash, "Transaction vanished from node"),
            }
        }
        Ok(txs)
    }

    pub async fn details(&self, hash: B256) -> Result<TransactionDetails, DashboardError> {
        transaction_details(&self.eth, hash).await
    }
}

pub async fn transaction_details(eth: &EthClient, hash: B256) -> Result<TransactionDetails, DashboardError> {
    let (transaction, receipt) = futures::try_join!(eth.transaction(hash), eth.receipt(hash))?;
    let transaction =
        transaction.ok_or_else(|| DashboardError::NotFound(format!("transaction {hash}")))?;
    Ok(TransactionDetails::new(transaction, receipt.as_ref()))
}

/// Send 1 ETH from `from` to [`TEST_RECIPIENT`] and wait for the receipt.
pub async fn send_test_transaction(eth: &EthClient, from: Address) -> Result<RpcReceipt, DashboardError> {
    let hash = eth
        .send_transaction(&TransactionRequest {
            from,
            to: Some(TEST_RECIPIENT),
            value: Some(U256::from(10u64).pow(U256::from(18u64))),
            ..Default::default()
        })
        .await?;
    tracing::info!(%hash, %from, "Test transaction sent");
    let receipt = eth.wait_for_receipt(hash, RECEIPT_POLL, RECEIPT_TIMEOUT).await?;
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::DataLoggerClient;
    use crate::mock::MockNode;
    use std::sync::Arc;
    use testresult::TestResult;

    async fn transfer(node: &Arc<MockNode>, value: u64) -> B256 {
        let accounts = node.accounts();
        node.client()
            .send_transaction(&TransactionRequest {
                from: accounts[0],
                to: Some(accounts[2]),
                value: Some(U256::from(value)),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_load_recent_walks_last_five_blocks() -> TestResult {
        let node = Arc::new(MockNode::new());
        for value in 1..=7 {
            transfer(&node, value).await;
        }
        let mut feed = TransactionFeed::new(node.client());

        assert_eq!(feed.load_recent().await?, 5);
        let values: Vec<U256> = feed.transactions().map(|t| t.value).collect();
        let expected: Vec<U256> = (3..=7u64).rev().map(U256::from).collect();
        assert_eq!(values, expected);
        let first = feed.transactions().next().unwrap();
        assert_eq!(first.block_number, 7);
        assert_eq!(first.timestamp, 1_700_000_000 + 7 * 12);
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_prepends_and_trims() -> TestResult {
        let node = Arc::new(MockNode::new());
        let eth = node.client();
        let mut feed = TransactionFeed::new(eth.clone());
        feed.load_recent().await?;
        assert!(feed.is_empty());

        for value in 1..=(MAX_TRANSACTIONS as u64 + 3) {
            transfer(&node, value).await;
            let block = eth.latest_block(false).await?.unwrap();
            assert_eq!(feed.ingest_block(&block).await?, 1);
        }
        assert_eq!(feed.len(), MAX_TRANSACTIONS);
        assert_eq!(
            feed.transactions().next().map(|t| t.value),
            Some(U256::from(MAX_TRANSACTIONS as u64 + 3))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_details_join_receipt() -> TestResult {
        let node = Arc::new(MockNode::new());
        let from = node.accounts()[0];
        let (address, deploy_tx) = node.deploy_code(from, crate::mock::datalogger_bytecode())?;
        let contract = DataLoggerClient::new(node.client(), address);
        let log_tx = contract.log_data(from, "sensor", "t=1").await?;
        let feed = TransactionFeed::new(node.client());

        let deploy = feed.details(deploy_tx).await?;
        assert_eq!(deploy.success, Some(true));
        assert_eq!(deploy.deployed_contract(), Some(address));

        let call = feed.details(log_tx).await?;
        assert_eq!(call.transaction.to, Some(address));
        assert!(call.deployed_contract().is_none());
        assert!(call.gas_used.is_some_and(|g| g > 0));

        let missing = feed.details(B256::repeat_byte(9)).await;
        assert!(matches!(missing, Err(DashboardError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_send_test_transaction() -> TestResult {
        let node = Arc::new(MockNode::new());
        let eth = node.client();
        let before = node.balance(TEST_RECIPIENT);

        let receipt = send_test_transaction(&eth, node.accounts()[0]).await?;
        assert!(receipt.succeeded());
        assert_eq!(
            node.balance(TEST_RECIPIENT) - before,
            U256::from(10u64).pow(U256::from(18u64))
        );
        Ok(())
    }
}
