//! Off-chain tooling for the `DataLogger` contract.
//!
//! The crate covers three areas:
//!
//! - **Contract client**: ABI bindings, typed reads, and the three upload
//!   modes (event log, contract payment, native transfer with data).
//! - **History sources**: direct contract reads, Alchemy asset transfers, The
//!   Graph subgraph queries, and an in-process indexer that mirrors the
//!   subgraph mapping from `eth_getLogs`.
//! - **Dashboard**: a local node inspector (accounts, blocks, transactions,
//!   contract detection, events, RPC console log).

pub mod abi;
pub mod config;
pub mod contract;
pub mod dashboard;
pub mod deploy;
pub mod history;
pub mod indexer;
pub mod logging;
pub mod records;
pub mod refresh;
pub mod rpc;
pub mod store;
pub mod units;
pub mod upload;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use alloy_primitives::{Address, Bytes, B256, U256};
