//! Recently mined blocks.

use std::collections::VecDeque;

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;

use super::DashboardError;
use crate::rpc::{EthClient, RpcBlock};
use crate::units::format_timestamp;

/// Blocks loaded on startup.
pub const RECENT_BLOCKS: u64 = 10;
/// Blocks kept as new ones arrive.
pub const MAX_BLOCKS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub miner: Address,
    pub gas_limit: u64,
    pub gas_used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    pub transactions: Vec<B256>,
}

impl BlockSummary {
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Gas used as a percentage of the limit.
    pub fn utilization(&self) -> f64 {
        if self.gas_limit == 0 {
            return 0.0;
        }
        self.gas_used as f64 * 100.0 / self.gas_limit as f64
    }
}

impl From<RpcBlock> for BlockSummary {
    fn from(block: RpcBlock) -> Self {
        Self {
            transactions: block.transactions.hashes(),
            number: block.number,
            hash: block.hash,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp,
            miner: block.miner,
            gas_limit: block.gas_limit,
            gas_used: block.gas_used,
            base_fee_per_gas: block.base_fee_per_gas,
        }
    }
}

/// "12 seconds ago", "3 minutes ago", "2 hours ago", or the local date for
/// anything older than a day.
pub fn format_age(timestamp: u64, now: u64) -> String {
    let diff = now.saturating_sub(timestamp);
    match diff {
        0..=59 => format!("{diff} seconds ago"),
        60..=3_599 => format!("{} minutes ago", diff / 60),
        3_600..=86_399 => format!("{} hours ago", diff / 3_600),
        _ => format_timestamp(timestamp),
    }
}

#[derive(Debug)]
pub struct BlocksPanel {
    eth: EthClient,
    blocks: VecDeque<BlockSummary>,
}

impl BlocksPanel {
    pub fn new(eth: EthClient) -> Self {
        Self {
            eth,
            blocks: VecDeque::with_capacity(MAX_BLOCKS),
        }
    }

    /// Newest first.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockSummary> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Replace the list with the [`RECENT_BLOCKS`] newest blocks.
    pub async fn load_recent(&mut self) -> Result<usize, DashboardError> {
        let head = self.eth.block_number().await?;
        let oldest = head.saturating_sub(RECENT_BLOCKS - 1);

        let mut blocks = VecDeque::with_capacity(MAX_BLOCKS);
        for number in (oldest..=head).rev() {
            if let Some(block) = self.eth.block(number, false).await? {
                blocks.push_back(BlockSummary::from(block));
            }
        }
        self.blocks = blocks;
        tracing::debug!(head, loaded = self.blocks.len(), "Loaded recent blocks");
        Ok(self.blocks.len())
    }

    /// Put a freshly mined block at the front. A number at or below the
    /// newest known block means the chain restarted; everything from that
    /// height up is dropped first.
    pub async fn on_new_block(&mut self, number: u64) -> Result<Option<&BlockSummary>, DashboardError> {
        let Some(block) = self.eth.block(number, false).await? else {
            return Ok(None);
        };
        self.blocks.retain(|b| b.number < number);
        self.blocks.push_front(BlockSummary::from(block));
        self.blocks.truncate(MAX_BLOCKS);
        Ok(self.blocks.front())
    }

    /// A block with its full transaction list, from the node.
    pub async fn details(&self, number: u64) -> Result<RpcBlock, DashboardError> {
        self.eth
            .block(number, true)
            .await?
            .ok_or_else(|| DashboardError::NotFound(format!("block {number}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use rstest::rstest;
    use std::sync::Arc;
    use testresult::TestResult;

    #[tokio::test]
    async fn test_load_recent_blocks() -> TestResult {
        let node = Arc::new(MockNode::new());
        node.mine(14);
        let mut blocks = BlocksPanel::new(node.client());

        assert_eq!(blocks.load_recent().await?, 10);
        let numbers: Vec<u64> = blocks.blocks().map(|b| b.number).collect();
        assert_eq!(numbers, (5..=14).rev().collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn test_short_chain_includes_genesis() -> TestResult {
        let node = Arc::new(MockNode::new());
        node.mine(3);
        let mut blocks = BlocksPanel::new(node.client());

        assert_eq!(blocks.load_recent().await?, 4);
        assert_eq!(blocks.blocks().last().map(|b| b.number), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn test_new_blocks_are_capped() -> TestResult {
        let node = Arc::new(MockNode::new());
        let mut blocks = BlocksPanel::new(node.client());
        blocks.load_recent().await?;

        for _ in 0..25 {
            node.mine(1);
            blocks.on_new_block(node.head()).await?;
        }
        assert_eq!(blocks.len(), MAX_BLOCKS);
        assert_eq!(blocks.blocks().next().map(|b| b.number), Some(25));
        assert!(blocks.on_new_block(999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_restarted_chain_drops_stale_blocks() -> TestResult {
        let node = Arc::new(MockNode::new());
        node.mine(8);
        let mut blocks = BlocksPanel::new(node.client());
        blocks.load_recent().await?;

        node.reset();
        node.mine(2);
        let newest = blocks.on_new_block(2).await?.cloned();
        assert_eq!(newest.map(|b| b.number), Some(2));
        let numbers: Vec<u64> = blocks.blocks().map(|b| b.number).collect();
        assert_eq!(numbers, vec![2, 1, 0]);
        Ok(())
    }

    #[tokio::test]
    async fn test_details_include_transactions() -> TestResult {
        let node = Arc::new(MockNode::new());
        let from = node.accounts()[0];
        node.deploy_datalogger(from)?;
        let blocks = BlocksPanel::new(node.client());

        let block = blocks.details(1).await?;
        let txs = block.transactions.full().map(<[_]>::len);
        assert_eq!(txs, Some(1));
        assert!(matches!(blocks.details(50).await, Err(DashboardError::NotFound(_))));
        Ok(())
    }

    #[rstest]
    #[case(10_000, "0 seconds ago")]
    #[case(9_955, "45 seconds ago")]
    #[case(9_700, "5 minutes ago")]
    #[case(2_800, "2 hours ago")]
    fn test_format_age(#[case] timestamp: u64, #[case] expected: &str) {
        assert_eq!(format_age(timestamp, 10_000), expected);
    }
}
