//! Dashboard console: a bounded, newest-first log of notable actions and RPC
//! traffic.

use std::collections::VecDeque;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ulid::Ulid;

use crate::rpc::{RpcError, RpcObserver};
use crate::units::shorten;

pub const MAX_LOGS: usize = 200;

/// Polled constantly; logging them would drown everything else.
const HIGH_FREQUENCY: [&str; 3] = ["eth_blockNumber", "eth_chainId", "net_version"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
    Rpc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Ulid,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    pub data: Option<Value>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

pub fn friendly_name(method: &str) -> String {
    let name = match method {
        "eth_blockNumber" => "Get block number",
        "eth_getBalance" => "Get balance",
        "eth_getTransactionCount" => "Get transaction count",
        "eth_getBlockByNumber" | "eth_getBlockByHash" => "Get block",
        "eth_getTransactionReceipt" => "Get transaction receipt",
        "eth_getTransactionByHash" => "Get transaction",
        "eth_sendTransaction" => "Send transaction",
        "eth_sendRawTransaction" => "Send raw transaction",
        "eth_call" => "Call contract",
        "eth_estimateGas" => "Estimate gas",
        "eth_gasPrice" => "Get gas price",
        "eth_getLogs" => "Get logs",
        "eth_getCode" => "Get contract code",
        "eth_getStorageAt" => "Get storage",
        "eth_chainId" => "Get chain id",
        "net_version" => "Get network version",
        "eth_accounts" => "List accounts",
        other => return format!("RPC: {other}"),
    };
    name.to_string()
}

/// Shorten address and hash strings among positional params.
pub fn display_params(params: &Value) -> Option<Value> {
    let items = params.as_array().filter(|items| !items.is_empty())?;
    let shortened = items
        .iter()
        .map(|item| match item.as_str() {
            Some(s) if s.starts_with("0x") && s.len() == 42 => Value::String(shorten(s, 6)),
            Some(s) if s.starts_with("0x") && s.len() == 66 => Value::String(shorten(s, 8)),
            _ => item.clone(),
        })
        .collect();
    Some(Value::Array(shortened))
}

#[derive(Debug)]
pub struct ConsoleLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOGS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn log(&self, kind: LogKind, message: impl Into<String>, data: Option<Value>) -> LogEntry {
        let entry = LogEntry {
            id: Ulid::new(),
            kind,
            message: message.into(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        mirror(&entry);

        let mut entries = self.entries.lock();
        entries.push_front(entry.clone());
        entries.truncate(self.capacity);
        entry
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogKind::Info, message, None);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogKind::Success, message, None);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogKind::Warning, message, None);
    }

    pub fn error(&self, message: impl Into<String>, detail: Option<String>) {
        self.log(LogKind::Error, message, detail.map(Value::String));
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        self.info("Console cleared");
    }

    /// Write `{logs, exportTime, totalLogs}` as pretty JSON to `path`.
    pub fn export(&self, path: &Path) -> std::io::Result<usize> {
        let logs = self.entries();
        let total = logs.len();
        let document = json!({
            "logs": logs,
            "exportTime": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "totalLogs": total,
        });
        let bytes = serde_json::to_vec_pretty(&document).map_err(std::io::Error::other)?;
        std::fs::write(path, bytes)?;
        self.info(format!("Logs exported to {}", path.display()));
        Ok(total)
    }
}

fn mirror(entry: &LogEntry) {
    let data = entry.data.as_ref().map(Value::to_string);
    let data = data.as_deref();
    match entry.kind {
        LogKind::Error => tracing::error!(target: "datalogger::console", data, "{}", entry.message),
        LogKind::Warning => tracing::warn!(target: "datalogger::console", data, "{}", entry.message),
        LogKind::Rpc => tracing::debug!(target: "datalogger::console", data, "{}", entry.message),
        LogKind::Info | LogKind::Success => {
            tracing::info!(target: "datalogger::console", data, "{}", entry.message)
        }
    }
}

impl RpcObserver for ConsoleLog {
    fn on_request(&self, method: &str, params: &Value) {
        if HIGH_FREQUENCY.contains(&method) {
            return;
        }
        self.log(LogKind::Rpc, friendly_name(method), display_params(params));
    }

    fn on_error(&self, method: &str, error: &RpcError) {
        self.error(format!("RPC error: {method}"), Some(error.summary()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use crate::rpc::EthClient;
    use alloy_primitives::Address;
    use std::sync::Arc;

    #[test]
    fn test_ring_buffer_keeps_newest_first() {
        let console = ConsoleLog::with_capacity(3);
        for i in 0..5 {
            console.info(format!("message {i}"));
        }
        let messages: Vec<String> = console.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["message 4", "message 3", "message 2"]);
    }

    #[test]
    fn test_params_are_shortened() {
        let params = json!([
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            format!("0x{}", "ab".repeat(32)),
            "latest",
            true,
        ]);
        let shown = display_params(&params).unwrap();
        assert_eq!(shown[0], "0xf39fd6...b92266");
        assert_eq!(shown[1], "0xabababab...abababab");
        assert_eq!(shown[2], "latest");
        assert_eq!(shown[3], true);
        assert!(display_params(&json!([])).is_none());
    }

    #[tokio::test]
    async fn test_observes_rpc_traffic() {
        let node = Arc::new(MockNode::new());
        let console = Arc::new(ConsoleLog::new());
        let client: EthClient = node.client().with_observer(console.clone());

        client.block_number().await.unwrap();
        client.balance(Address::ZERO).await.unwrap();
        node.fail("eth_accounts", 1);
        client.accounts().await.unwrap_err();

        let entries = console.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind, LogKind::Error);
        assert_eq!(entries[0].message, "RPC error: eth_accounts");
        assert_eq!(entries[1].message, "List accounts");
        assert_eq!(entries[2].message, "Get balance");
        assert_eq!(entries[2].kind, LogKind::Rpc);
    }

    #[test]
    fn test_export_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.json");
        let console = ConsoleLog::new();
        console.success("Connected");
        console.warning("Slow node");

        assert_eq!(console.export(&path).unwrap(), 2);
        let document: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(document["totalLogs"], 2);
        assert_eq!(document["logs"][0]["type"], "warning");
        assert!(document["exportTime"].is_string());

        console.clear();
        assert_eq!(console.len(), 1);
        assert_eq!(console.entries()[0].message, "Console cleared");
    }

    #[test]
    fn test_friendly_names() {
        assert_eq!(friendly_name("eth_getLogs"), "Get logs");
        assert_eq!(friendly_name("debug_traceTransaction"), "RPC: debug_traceTransaction");
    }
}
