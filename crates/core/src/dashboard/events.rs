//! Recent events of registered contracts.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use alloy_primitives::{Address, Bytes, B256};
use serde::Serialize;
use serde_json::json;

use super::contracts::ContractRegistry;
use super::DashboardError;
use crate::contract::{decode_event, DataLoggerEvent};
use crate::rpc::{EthClient, LogFilter, RpcLog};

/// Blocks searched back from the head.
pub const EVENT_LOOKBACK: u64 = 100;
pub const MAX_EVENTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvent {
    pub address: Address,
    pub contract_name: String,
    /// Event name, or `Unknown` for logs that are not DataLogger events.
    pub name: String,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
    /// Block timestamp, unix seconds.
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<DataLoggerEvent>,
    pub topic0: Option<B256>,
    pub data: Bytes,
}

impl ContractEvent {
    pub fn from_log(log: RpcLog, contract_name: &str) -> Self {
        let decoded = match decode_event(&log) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(address = %log.address, error = %e, "Keeping undecodable log raw");
                None
            }
        };
        Self {
            address: log.address,
            contract_name: contract_name.to_string(),
            name: decoded.as_ref().map_or("Unknown", DataLoggerEvent::name).to_string(),
            block_number: log.block_number.unwrap_or_default(),
            transaction_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            timestamp: None,
            decoded,
            topic0: log.topics.first().copied(),
            data: log.data,
        }
    }

    fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

#[derive(Debug)]
pub struct EventsPanel {
    eth: EthClient,
    events: Vec<ContractEvent>,
}

impl EventsPanel {
    pub fn new(eth: EthClient) -> Self {
        Self {
            eth,
            events: Vec::new(),
        }
    }

    /// Newest first.
    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Reload events of every registered contract from the last
    /// [`EVENT_LOOKBACK`] blocks.
    pub async fn load_recent(&mut self, registry: &ContractRegistry) -> Result<usize, DashboardError> {
        let head = self.eth.block_number().await?;
        let from = head.saturating_sub(EVENT_LOOKBACK);
        let mut events = self.fetch(registry, from, head).await?;
        sort_newest_first(&mut events);
        events.truncate(MAX_EVENTS);
        self.fill_timestamps(&mut events).await?;
        self.events = events;
        tracing::debug!(from, to = head, loaded = self.events.len(), "Loaded contract events");
        Ok(self.events.len())
    }

    /// Prepend events of registered contracts emitted in `block`.
    pub async fn check_new_events(
        &mut self,
        registry: &ContractRegistry,
        block: u64,
    ) -> Result<usize, DashboardError> {
        let mut fresh = self.fetch(registry, block, block).await?;
        if fresh.is_empty() {
            return Ok(0);
        }
        sort_newest_first(&mut fresh);
        self.fill_timestamps(&mut fresh).await?;
        let added = fresh.len();
        self.events
            .retain(|e| !fresh.iter().any(|f| f.position() == e.position()));
        fresh.append(&mut self.events);
        fresh.truncate(MAX_EVENTS);
        self.events = fresh;
        Ok(added)
    }

    async fn fetch(
        &self,
        registry: &ContractRegistry,
        from: u64,
        to: u64,
    ) -> Result<Vec<ContractEvent>, DashboardError> {
        let mut events = Vec::new();
        for contract in registry.entries() {
            let filter = LogFilter::new(from, to).address(contract.address);
            let logs = self.eth.logs(&filter).await?;
            events.extend(
                logs.into_iter()
                    .filter(|log| !log.removed)
                    .map(|log| ContractEvent::from_log(log, &contract.name)),
            );
        }
        Ok(events)
    }

    /// One block lookup per distinct block number.
    async fn fill_timestamps(&self, events: &mut [ContractEvent]) -> Result<(), DashboardError> {
        let blocks: BTreeSet<u64> = events.iter().map(|e| e.block_number).collect();
        let mut timestamps = HashMap::with_capacity(blocks.len());
        for number in blocks {
            if let Some(block) = self.eth.block(number, false).await? {
                timestamps.insert(number, block.timestamp);
            }
        }
        for event in events {
            event.timestamp = timestamps.get(&event.block_number).copied();
        }
        Ok(())
    }

    /// Write `{events, exportTime, totalEvents}` as pretty JSON to `path`.
    pub fn export(&self, path: &Path) -> std::io::Result<usize> {
        let total = self.events.len();
        let document = json!({
            "events": self.events,
            "exportTime": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "totalEvents": total,
        });
        let bytes = serde_json::to_vec_pretty(&document).map_err(std::io::Error::other)?;
        std::fs::write(path, bytes)?;
        Ok(total)
    }
}

fn sort_newest_first(events: &mut [ContractEvent]) {
    events.sort_by(|a, b| b.position().cmp(&a.position()));
}
