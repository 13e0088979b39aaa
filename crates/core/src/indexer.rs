//! In-process DataLogger indexer.
//!
//! Builds the same entities as the DataLogger subgraph from `eth_getLogs`, so
//! record queries work against a node with no Graph deployment. Entity ids are
//! `{txHash}-{logIndex}` and categories are stored as their topic hash, since
//! the event only carries the hash of the indexed string.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::abi::event_signatures;
use crate::contract::{decode_event, DataLoggerEvent, DataStoredEvent, TransactionLoggedEvent};
use crate::history::graph::{GraphMeta, MetaBlock};
use crate::refresh::{next_backoff, with_jitter};
use crate::rpc::{EthClient, LogFilter, RpcError};
use crate::store::{LocalStore, StoreError};

/// Blocks per `eth_getLogs` request.
pub const DEFAULT_BATCH_SIZE: u64 = 2_000;

pub const DEFAULT_FOLLOW_INTERVAL: Duration = Duration::from_secs(12);

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("node has no block {0}")]
    MissingBlock(u64),
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDataRecord {
    pub id: String,
    pub record_id: U256,
    pub sender: Address,
    pub category: B256,
    pub data: String,
    pub timestamp: u64,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedTransactionRecord {
    pub id: String,
    pub record_id: U256,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub memo: String,
    pub timestamp: u64,
    pub block_number: u64,
}

/// Last indexed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCursor {
    pub number: u64,
    pub hash: B256,
}

pub fn entity_id(transaction_hash: B256, log_index: u64) -> String {
    format!("{transaction_hash}-{log_index}")
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityState {
    data_records: BTreeMap<String, IndexedDataRecord>,
    transaction_records: BTreeMap<String, IndexedTransactionRecord>,
    cursor: Option<IndexCursor>,
    has_indexing_errors: bool,
}

/// Indexed entities, persisted as one entry of a [`LocalStore`].
pub struct EntityStore {
    store: Arc<LocalStore>,
    key: String,
    state: Mutex<EntityState>,
}

impl EntityStore {
    /// Store key for the entities of `contract` on `chain_id`.
    pub fn key_for(chain_id: u64, contract: Address) -> String {
        format!("indexer_{chain_id}_{contract}")
    }

    pub fn open(store: Arc<LocalStore>, key: impl Into<String>) -> Result<Self, StoreError> {
        let key = key.into();
        let state = store.get::<EntityState>(&key)?.unwrap_or_default();
        Ok(Self {
            store,
            key,
            state: Mutex::new(state),
        })
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        let state = self.state.lock();
        self.store.set(&self.key, &*state)
    }

    pub fn cursor(&self) -> Option<IndexCursor> {
        self.state.lock().cursor
    }

    pub fn set_cursor(&self, cursor: IndexCursor) {
        self.state.lock().cursor = Some(cursor);
    }

    pub fn mark_indexing_error(&self) {
        self.state.lock().has_indexing_errors = true;
    }

    /// Drop every entity and the cursor.
    pub fn clear(&self) {
        *self.state.lock() = EntityState::default();
    }

    pub fn handle_data_stored(&self, event: &DataStoredEvent) {
        let id = entity_id(event.meta.transaction_hash, event.meta.log_index);
        let record = IndexedDataRecord {
            id: id.clone(),
            record_id: event.record_id,
            sender: event.sender,
            category: event.category_topic,
            data: event.data.clone(),
            timestamp: event.timestamp,
            block_number: event.meta.block_number,
        };
        self.state.lock().data_records.insert(id, record);
    }

    pub fn handle_transaction_logged(&self, event: &TransactionLoggedEvent) {
        let id = entity_id(event.meta.transaction_hash, event.meta.log_index);
        let record = IndexedTransactionRecord {
            id: id.clone(),
            record_id: event.record_id,
            from: event.from,
            to: event.to,
            amount: event.amount,
            memo: event.memo.clone(),
            timestamp: event.timestamp,
            block_number: event.meta.block_number,
        };
        self.state.lock().transaction_records.insert(id, record);
    }

    pub fn handle(&self, event: &DataLoggerEvent) {
        match event {
            DataLoggerEvent::DataStored(e) => self.handle_data_stored(e),
            DataLoggerEvent::TransactionLogged(e) => self.handle_transaction_logged(e),
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Newest block first.
    pub fn data_records(&self, first: usize, skip: usize) -> Vec<IndexedDataRecord> {
        let state = self.state.lock();
        let mut records: Vec<_> = state.data_records.values().cloned().collect();
        records.sort_by(|a, b| b.block_number.cmp(&a.block_number).then_with(|| a.id.cmp(&b.id)));
        records.into_iter().skip(skip).take(first).collect()
    }

    /// Newest block first.
    pub fn transaction_records(&self, first: usize, skip: usize) -> Vec<IndexedTransactionRecord> {
        let state = self.state.lock();
        let mut records: Vec<_> = state.transaction_records.values().cloned().collect();
        records.sort_by(|a, b| b.block_number.cmp(&a.block_number).then_with(|| a.id.cmp(&b.id)));
        records.into_iter().skip(skip).take(first).collect()
    }

    pub fn records_by_sender(&self, sender: Address) -> Vec<IndexedDataRecord> {
        self.state
            .lock()
            .data_records
            .values()
            .filter(|r| r.sender == sender)
            .cloned()
            .collect()
    }

    /// Records in `[start_block, end_block]`.
    pub fn records_by_block_range(&self, start_block: u64, end_block: u64) -> Vec<IndexedDataRecord> {
        self.state
            .lock()
            .data_records
            .values()
            .filter(|r| (start_block..=end_block).contains(&r.block_number))
            .cloned()
            .collect()
    }

    /// Same shape as the subgraph's `_meta`.
    pub fn meta(&self) -> GraphMeta {
        let state = self.state.lock();
        GraphMeta {
            block: MetaBlock {
                number: state.cursor.map_or(0, |c| c.number),
                hash: state.cursor.map(|c| c.hash),
            },
            has_indexing_errors: state.has_indexing_errors,
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.data_records.len(), state.transaction_records.len())
    }
}

// =============================================================================
// Indexer
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Blocks scanned, inclusive; `None` when already at the head.
    pub range: Option<(u64, u64)>,
    pub events: usize,
    /// The chain was reset and the store cleared first.
    pub reset: bool,
}

pub struct Indexer {
    eth: EthClient,
    contract: Address,
    deploy_block: u64,
    batch_size: u64,
    entities: Arc<EntityStore>,
}

impl Indexer {
    pub fn new(eth: EthClient, contract: Address, deploy_block: u64, entities: Arc<EntityStore>) -> Self {
        Self {
            eth,
            contract,
            deploy_block,
            batch_size: DEFAULT_BATCH_SIZE,
            entities,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn entities(&self) -> &Arc<EntityStore> {
        &self.entities
    }

    /// Index every block between the cursor and the current head.
    pub async fn sync(&self) -> Result<SyncReport, IndexerError> {
        let head = self.eth.block_number().await?;
        let mut report = SyncReport::default();

        if let Some(cursor) = self.entities.cursor() {
            if self.is_reset(cursor, head).await? {
                tracing::warn!(
                    cursor = cursor.number,
                    head,
                    "Chain reset detected, clearing indexed entities"
                );
                self.entities.clear();
                self.entities.persist()?;
                report.reset = true;
            }
        }

        let start = self
            .entities
            .cursor()
            .map_or(0, |c| c.number + 1)
            .max(self.deploy_block);
        if start > head {
            return Ok(report);
        }

        let mut from = start;
        while from <= head {
            let to = from.saturating_add(self.batch_size - 1).min(head);
            report.events += self.index_batch(from, to).await?;
            from = to + 1;
        }
        report.range = Some((start, head));
        tracing::info!(from = start, to = head, events = report.events, "Indexed blocks");
        Ok(report)
    }

    async fn is_reset(&self, cursor: IndexCursor, head: u64) -> Result<bool, IndexerError> {
        if head < cursor.number {
            return Ok(true);
        }
        let block = self.eth.block(cursor.number, false).await?;
        Ok(block.map_or(true, |b| b.hash != cursor.hash))
    }

    async fn index_batch(&self, from: u64, to: u64) -> Result<usize, IndexerError> {
        let filter = LogFilter::new(from, to)
            .address(self.contract)
            .events(event_signatures());
        let logs = self.eth.logs(&filter).await?;

        let mut applied = 0;
        for log in &logs {
            match decode_event(log) {
                Ok(Some(event)) => {
                    self.entities.handle(&event);
                    applied += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        tx = ?log.transaction_hash,
                        log_index = ?log.log_index,
                        error = %e,
                        "Failed to handle event"
                    );
                    self.entities.mark_indexing_error();
                }
            }
        }

        let block = self
            .eth
            .block(to, false)
            .await?
            .ok_or(IndexerError::MissingBlock(to))?;
        self.entities.set_cursor(IndexCursor {
            number: to,
            hash: block.hash,
        });
        self.entities.persist()?;
        tracing::debug!(from, to, events = applied, "Indexed batch");
        Ok(applied)
    }

    /// Sync every `interval` until the task is dropped. Failures are retried
    /// with exponential backoff.
    pub async fn follow(&self, interval: Duration) {
        let mut backoff = interval;
        loop {
            match self.sync().await {
                Ok(_) => {
                    backoff = interval;
                    tokio::time::sleep(interval).await;
                }
                Err(e) => {
                    let delay = with_jitter(backoff);
                    tracing::warn!(error = %e, retry_in = ?delay, "Index sync failed");
                    tokio::time::sleep(delay).await;
                    backoff = next_backoff(backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::data_category_topic;
    use crate::contract::DataLoggerClient;
    use crate::mock::MockNode;
    use testresult::TestResult;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<LocalStore>,
        node: Arc<MockNode>,
        contract: DataLoggerClient,
        deploy_block: u64,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::in_dir(dir.path()).unwrap());
        let node = Arc::new(MockNode::new());
        node.mine(3);
        let address = node.deploy_datalogger(node.accounts()[0]).unwrap();
        let deploy_block = node.head();
        let contract = DataLoggerClient::new(node.client(), address);
        Fixture {
            _dir: dir,
            store,
            node,
            contract,
            deploy_block,
        }
    }

    impl Fixture {
        fn indexer(&self) -> Indexer {
            let key = EntityStore::key_for(31337, self.contract.address());
            let entities = Arc::new(EntityStore::open(self.store.clone(), key).unwrap());
            Indexer::new(
                self.node.client(),
                self.contract.address(),
                self.deploy_block,
                entities,
            )
        }
    }

    #[tokio::test]
    async fn test_sync_builds_subgraph_entities() -> TestResult {
        let fx = fixture();
        let accounts = fx.node.accounts();
        let tx = fx.contract.log_data(accounts[0], "sensor", "t=20").await?;
        fx.contract
            .log_with_payment(accounts[0], accounts[1], "rent", U256::from(7u64))
            .await?;

        let indexer = fx.indexer().with_batch_size(1);
        let report = indexer.sync().await?;
        assert_eq!(report.events, 2);
        assert_eq!(report.range, Some((fx.deploy_block, fx.node.head())));

        let records = indexer.entities().data_records(10, 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, format!("{tx}-0"));
        assert_eq!(records[0].category, data_category_topic("sensor"));
        assert_eq!(records[0].record_id, U256::from(1u64));

        let payments = indexer.entities().transaction_records(10, 0);
        assert_eq!(payments[0].amount, U256::from(7u64));
        assert_eq!(payments[0].to, accounts[1]);

        let meta = indexer.entities().meta();
        assert_eq!(meta.block.number, fx.node.head());
        assert!(!meta.has_indexing_errors);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_resumes_from_persisted_cursor() -> TestResult {
        let fx = fixture();
        let sender = fx.node.accounts()[0];
        fx.contract.log_data(sender, "a", "1").await?;
        fx.indexer().sync().await?;

        fx.contract.log_data(sender, "a", "2").await?;
        let indexer = fx.indexer();
        let report = indexer.sync().await?;
        assert_eq!(report.events, 1);
        assert_eq!(report.range, Some((fx.node.head(), fx.node.head())));
        assert_eq!(indexer.entities().counts(), (2, 0));

        let newest = indexer.entities().data_records(1, 0);
        assert_eq!(newest[0].data, "2");
        assert_eq!(indexer.entities().data_records(10, 1)[0].data, "1");
        Ok(())
    }

    #[tokio::test]
    async fn test_up_to_date_sync_scans_nothing() -> TestResult {
        let fx = fixture();
        let indexer = fx.indexer();
        indexer.sync().await?;
        let report = indexer.sync().await?;
        assert_eq!(report.range, None);
        assert_eq!(report.events, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_clears_entities() -> TestResult {
        let fx = fixture();
        fx.contract.log_data(fx.node.accounts()[0], "a", "1").await?;
        let indexer = fx.indexer();
        indexer.sync().await?;
        assert_eq!(indexer.entities().counts(), (1, 0));

        fx.node.reset();
        let report = indexer.sync().await?;
        assert!(report.reset);
        assert_eq!(indexer.entities().counts(), (0, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_queries_by_sender_and_range() -> TestResult {
        let fx = fixture();
        let accounts = fx.node.accounts();
        fx.contract.log_data(accounts[0], "a", "first").await?;
        let middle = fx.node.head() + 1;
        fx.contract.log_data(accounts[1], "a", "second").await?;
        fx.contract.log_data(accounts[0], "a", "third").await?;

        let indexer = fx.indexer();
        indexer.sync().await?;
        let entities = indexer.entities();
        assert_eq!(entities.records_by_sender(accounts[0]).len(), 2);
        let ranged = entities.records_by_block_range(middle, middle);
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].data, "second");
        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_log_flags_indexing_error() -> TestResult {
        let fx = fixture();
        // Right signature, truncated data.
        let topics = vec![
            event_signatures()[0],
            B256::left_padding_from(&[1]),
            B256::left_padding_from(fx.node.accounts()[0].as_slice()),
            data_category_topic("x"),
        ];
        fx.node
            .emit_raw_log(fx.contract.address(), topics, alloy_primitives::Bytes::from_static(&[1, 2]));

        let indexer = fx.indexer();
        let report = indexer.sync().await?;
        assert_eq!(report.events, 0);
        assert!(indexer.entities().meta().has_indexing_errors);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_picks_up_new_events() -> TestResult {
        let fx = fixture();
        let indexer = Arc::new(fx.indexer());
        let task = tokio::spawn({
            let indexer = indexer.clone();
            async move { indexer.follow(Duration::from_secs(1)).await }
        });

        fx.node.fail("eth_blockNumber", 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        fx.contract.log_data(fx.node.accounts()[0], "a", "late").await?;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(indexer.entities().counts(), (1, 0));
        task.abort();
        Ok(())
    }
}
