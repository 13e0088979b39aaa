//! Application configuration.
//!
//! Everything is read from `DATALOGGER_*` environment variables (the binary
//! loads `.env` first). [`AppConfig::from_lookup`] takes any variable source so
//! tests never touch the process environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::store::{self, LocalStore, StoreError};

pub const ENV_PREFIX: &str = "DATALOGGER_";
pub const DEFAULT_CHAIN: &str = "sepolia";
pub const DEFAULT_DASHBOARD_RPC: &str = "http://localhost:8545";
pub const LOCALHOST_CHAIN_ID: u64 = 31337;

/// Store key of the persisted provider preference.
pub const PROVIDER_PREFERENCE_KEY: &str = "preferred_provider";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("unknown chain {0:?}")]
    UnknownChain(String),
    #[error("{} is disabled; set {}ENABLE_{}=true", .0, ENV_PREFIX, .0.env_suffix())]
    FeatureDisabled(Feature),
    #[error("no subgraph endpoint for chain {0}")]
    NoGraphEndpoint(u64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Chains
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Short name used in variables and on the command line (`sepolia`).
    pub key: String,
    pub id: u64,
    pub name: String,
    pub contract_address: Option<Address>,
    pub deploy_block: u64,
    pub rpc_url: Option<String>,
    pub explorer_url: String,
    pub explorer_api_url: Option<String>,
    pub testnet: bool,
}

struct ChainPreset {
    key: &'static str,
    id: u64,
    name: &'static str,
    explorer_url: &'static str,
    explorer_api_url: Option<&'static str>,
    testnet: bool,
}

const CHAIN_PRESETS: &[ChainPreset] = &[
    ChainPreset {
        key: "sepolia",
        id: 11_155_111,
        name: "Sepolia",
        explorer_url: "https://sepolia.etherscan.io",
        explorer_api_url: Some("https://api-sepolia.etherscan.io/api"),
        testnet: true,
    },
    ChainPreset {
        key: "mainnet",
        id: 1,
        name: "Ethereum",
        explorer_url: "https://etherscan.io",
        explorer_api_url: Some("https://api.etherscan.io/api"),
        testnet: false,
    },
    ChainPreset {
        key: "base",
        id: 8453,
        name: "Base",
        explorer_url: "https://basescan.org",
        explorer_api_url: Some("https://api.basescan.org/api"),
        testnet: false,
    },
    ChainPreset {
        key: "arbitrum",
        id: 42_161,
        name: "Arbitrum One",
        explorer_url: "https://arbiscan.io",
        explorer_api_url: Some("https://api.arbiscan.io/api"),
        testnet: false,
    },
    ChainPreset {
        key: "localhost",
        id: LOCALHOST_CHAIN_ID,
        name: "Hardhat Local",
        explorer_url: "",
        explorer_api_url: None,
        testnet: true,
    },
];

/// What an explorer link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerKind {
    Tx,
    Address,
    Block,
}

// =============================================================================
// Providers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Alchemy,
    Infura,
    /// Keyless public endpoints, or the chain's RPC override.
    Public,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Alchemy => "alchemy",
            ProviderKind::Infura => "infura",
            ProviderKind::Public => "public",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alchemy" => Ok(ProviderKind::Alchemy),
            "infura" => Ok(ProviderKind::Infura),
            "public" => Ok(ProviderKind::Public),
            other => Err(format!("unknown provider {other:?}")),
        }
    }
}

/// Whether an Alchemy key is real: set, not the template placeholder, and
/// longer than 10 characters.
pub fn is_usable_alchemy_key(key: Option<&str>) -> bool {
    key.is_some_and(|k| !k.is_empty() && k != "YOUR_ALCHEMY_KEY" && k.len() > 10)
}

pub fn is_usable_infura_key(key: Option<&str>) -> bool {
    key.is_some_and(|k| !k.is_empty() && k != "YOUR_INFURA_KEY")
}

/// Alchemy endpoint for a chain key, if Alchemy serves that chain.
pub fn alchemy_url(chain_key: &str, key: &str) -> Option<String> {
    let host = match chain_key {
        "sepolia" => "eth-sepolia",
        "mainnet" => "eth-mainnet",
        "base" => "base-mainnet",
        "arbitrum" => "arb-mainnet",
        _ => return None,
    };
    Some(format!("https://{host}.g.alchemy.com/v2/{key}"))
}

fn public_rpc(chain_key: &str) -> Option<&'static str> {
    match chain_key {
        "sepolia" => Some("https://rpc.sepolia.org"),
        "mainnet" => Some("https://ethereum.publicnode.com"),
        "base" => Some("https://mainnet.base.org"),
        "arbitrum" => Some("https://arb1.arbitrum.io/rpc"),
        _ => None,
    }
}

/// Chooses which RPC provider serves remote chains.
///
/// Selection order: the persisted preference, then the configured default,
/// then automatic (Alchemy, Infura, public). A preference naming a provider
/// without a usable key is ignored.
#[derive(Debug, Clone)]
pub struct ProviderManager {
    alchemy_key: Option<String>,
    infura_key: Option<String>,
    current: ProviderKind,
}

impl ProviderManager {
    pub fn new(api: &ApiConfig, stored: Option<ProviderKind>) -> Self {
        let mut manager = Self {
            alchemy_key: api
                .alchemy_key
                .clone()
                .filter(|k| is_usable_alchemy_key(Some(k))),
            infura_key: api
                .infura_key
                .clone()
                .filter(|k| is_usable_infura_key(Some(k))),
            current: ProviderKind::Public,
        };
        manager.current = [stored, api.default_provider]
            .into_iter()
            .flatten()
            .find(|kind| manager.is_available(*kind))
            .unwrap_or_else(|| manager.auto_select());
        manager
    }

    /// Build from config and the preference persisted in `store`, and persist
    /// the resulting choice.
    pub fn load(api: &ApiConfig, store: &LocalStore) -> Result<Self, ConfigError> {
        let stored = store
            .get::<String>(PROVIDER_PREFERENCE_KEY)?
            .and_then(|s| s.parse().ok());
        let manager = Self::new(api, stored);
        manager.persist(store)?;
        Ok(manager)
    }

    fn persist(&self, store: &LocalStore) -> Result<(), ConfigError> {
        match self.current {
            ProviderKind::Public => {
                store.remove(PROVIDER_PREFERENCE_KEY)?;
            }
            kind => store.set(PROVIDER_PREFERENCE_KEY, &kind.to_string())?,
        }
        Ok(())
    }

    fn auto_select(&self) -> ProviderKind {
        if self.alchemy_key.is_some() {
            ProviderKind::Alchemy
        } else if self.infura_key.is_some() {
            ProviderKind::Infura
        } else {
            tracing::warn!("No provider API keys configured, using public RPC");
            ProviderKind::Public
        }
    }

    pub fn is_available(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Alchemy => self.alchemy_key.is_some(),
            ProviderKind::Infura => self.infura_key.is_some(),
            ProviderKind::Public => true,
        }
    }

    pub fn current(&self) -> ProviderKind {
        self.current
    }

    pub fn available(&self) -> Vec<ProviderKind> {
        [ProviderKind::Public, ProviderKind::Alchemy, ProviderKind::Infura]
            .into_iter()
            .filter(|k| self.is_available(*k))
            .collect()
    }

    /// Switch provider. Returns `false` when `kind` has no usable key.
    pub fn switch(&mut self, kind: ProviderKind, store: Option<&LocalStore>) -> Result<bool, ConfigError> {
        if !self.is_available(kind) {
            return Ok(false);
        }
        self.current = kind;
        if let Some(store) = store {
            self.persist(store)?;
        }
        Ok(true)
    }

    /// Whether the current provider offers `alchemy_getAssetTransfers`.
    pub fn supports_asset_transfers(&self) -> bool {
        self.current == ProviderKind::Alchemy
    }

    /// The Alchemy key regardless of the current provider. Asset transfers
    /// are served by Alchemy even when another provider handles plain RPC.
    pub fn alchemy_key(&self) -> Option<&str> {
        self.alchemy_key.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        match self.current {
            ProviderKind::Alchemy => self.alchemy_key.as_deref(),
            ProviderKind::Infura => self.infura_key.as_deref(),
            ProviderKind::Public => None,
        }
    }

    pub fn rpc_url(&self, chain: &ChainConfig) -> Option<String> {
        let keyed = match (self.current, self.api_key()) {
            (ProviderKind::Alchemy, Some(key)) => alchemy_url(&chain.key, key),
            (ProviderKind::Infura, Some(key)) => {
                let host = match chain.key.as_str() {
                    "sepolia" => Some("sepolia"),
                    "mainnet" => Some("mainnet"),
                    "base" => Some("base-mainnet"),
                    "arbitrum" => Some("arbitrum-mainnet"),
                    _ => None,
                };
                host.map(|h| format!("https://{h}.infura.io/v3/{key}"))
            }
            _ => None,
        };
        keyed
            .or_else(|| chain.rpc_url.clone())
            .or_else(|| public_rpc(&chain.key).map(str::to_string))
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Opt-in switches; each is off unless its variable is `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    pub enable_graph: bool,
    pub enable_alchemy: bool,
    pub enable_infura: bool,
    pub enable_mainnet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Graph,
    Alchemy,
    Infura,
    Mainnet,
}

impl Feature {
    fn env_suffix(self) -> &'static str {
        match self {
            Feature::Graph => "GRAPH",
            Feature::Alchemy => "ALCHEMY",
            Feature::Infura => "INFURA",
            Feature::Mainnet => "MAINNET",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::Graph => "The Graph",
            Feature::Alchemy => "Alchemy",
            Feature::Infura => "Infura",
            Feature::Mainnet => "Mainnet",
        })
    }
}

impl Features {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Graph => self.enable_graph,
            Feature::Alchemy => self.enable_alchemy,
            Feature::Infura => self.enable_infura,
            Feature::Mainnet => self.enable_mainnet,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(skip_serializing)]
    pub alchemy_key: Option<String>,
    #[serde(skip_serializing)]
    pub infura_key: Option<String>,
    pub default_provider: Option<ProviderKind>,
    /// Subgraph endpoints keyed by chain key, plus `studio`.
    pub graph_endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub default_chain: String,
    pub chains: Vec<ChainConfig>,
    pub features: Features,
    pub api: ApiConfig,
    /// Node the dashboard inspects.
    pub dashboard_rpc: String,
    pub data_dir: Option<PathBuf>,
    pub debug: bool,
}

fn parse_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build config from `lookup`, which receives full variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |suffix: &str| non_empty(lookup(&format!("{ENV_PREFIX}{suffix}")));

        let mut chains = Vec::with_capacity(CHAIN_PRESETS.len());
        for preset in CHAIN_PRESETS {
            let upper = preset.key.to_ascii_uppercase();
            let address_var = format!("CONTRACT_ADDRESS_{upper}");
            let contract_address = match var(&address_var) {
                Some(raw) => Some(raw.parse::<Address>().map_err(|_| ConfigError::InvalidValue {
                    var: format!("{ENV_PREFIX}{address_var}"),
                    value: raw.clone(),
                })?),
                None => None,
            };
            let block_var = format!("CONTRACT_BLOCK_{upper}");
            let deploy_block = match var(&block_var) {
                Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    var: format!("{ENV_PREFIX}{block_var}"),
                    value: raw.clone(),
                })?,
                None => 0,
            };
            let mut rpc_url = var(&format!("{upper}_RPC"));
            if preset.id == LOCALHOST_CHAIN_ID && rpc_url.is_none() {
                rpc_url = Some(
                    var("DASHBOARD_RPC").unwrap_or_else(|| DEFAULT_DASHBOARD_RPC.to_string()),
                );
            }
            chains.push(ChainConfig {
                key: preset.key.to_string(),
                id: preset.id,
                name: preset.name.to_string(),
                contract_address,
                deploy_block,
                rpc_url,
                explorer_url: preset.explorer_url.to_string(),
                explorer_api_url: preset.explorer_api_url.map(str::to_string),
                testnet: preset.testnet,
            });
        }

        let default_provider = match var("DEFAULT_PROVIDER") {
            Some(raw) if raw.eq_ignore_ascii_case("auto") => None,
            Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: format!("{ENV_PREFIX}DEFAULT_PROVIDER"),
                value: raw.clone(),
            })?),
            None => None,
        };

        let mut graph_endpoints = BTreeMap::new();
        for (key, suffix) in [
            ("sepolia", "GRAPH_ENDPOINT_SEPOLIA"),
            ("mainnet", "GRAPH_ENDPOINT_MAINNET"),
            ("studio", "GRAPH_STUDIO_ENDPOINT"),
        ] {
            if let Some(url) = var(suffix) {
                graph_endpoints.insert(key.to_string(), url);
            }
        }

        Ok(Self {
            default_chain: var("DEFAULT_CHAIN").unwrap_or_else(|| DEFAULT_CHAIN.to_string()),
            chains,
            features: Features {
                enable_graph: parse_flag(var("ENABLE_GRAPH")),
                enable_alchemy: parse_flag(var("ENABLE_ALCHEMY")),
                enable_infura: parse_flag(var("ENABLE_INFURA")),
                enable_mainnet: parse_flag(var("ENABLE_MAINNET")),
            },
            api: ApiConfig {
                alchemy_key: var("ALCHEMY_KEY"),
                infura_key: var("INFURA_KEY"),
                default_provider,
                graph_endpoints,
            },
            dashboard_rpc: var("DASHBOARD_RPC")
                .unwrap_or_else(|| DEFAULT_DASHBOARD_RPC.to_string()),
            data_dir: var("DATA_DIR").map(PathBuf::from),
            debug: parse_flag(var("DEBUG")),
        })
    }

    /// Chain by key, e.g. `sepolia`.
    pub fn chain(&self, key: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.key.eq_ignore_ascii_case(key))
    }

    pub fn chain_by_id(&self, id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.id == id)
    }

    pub fn default_chain_config(&self) -> Result<&ChainConfig, ConfigError> {
        self.chain(&self.default_chain)
            .ok_or_else(|| ConfigError::UnknownChain(self.default_chain.clone()))
    }

    pub fn contract_address(&self, chain_id: u64) -> Option<Address> {
        self.chain_by_id(chain_id).and_then(|c| c.contract_address)
    }

    pub fn deploy_block(&self, chain_id: u64) -> u64 {
        self.chain_by_id(chain_id).map_or(0, |c| c.deploy_block)
    }

    /// Explorer link, or the explorer root when `hash` is `None`. `None` for
    /// unknown chains and chains without an explorer.
    pub fn explorer_url(&self, chain_id: u64, kind: ExplorerKind, hash: Option<&str>) -> Option<String> {
        let chain = self.chain_by_id(chain_id)?;
        if chain.explorer_url.is_empty() {
            return None;
        }
        let base = &chain.explorer_url;
        let Some(hash) = hash else {
            return Some(base.clone());
        };
        let path = match kind {
            ExplorerKind::Tx => "tx",
            ExplorerKind::Address => "address",
            ExplorerKind::Block => "block",
        };
        Some(format!("{base}/{path}/{hash}"))
    }

    pub fn graph_endpoint(&self, chain_id: u64) -> Option<&str> {
        let chain = self.chain_by_id(chain_id)?;
        self.api.graph_endpoints.get(&chain.key).map(String::as_str)
    }

    pub fn require(&self, feature: Feature) -> Result<(), ConfigError> {
        if self.features.is_enabled(feature) {
            Ok(())
        } else {
            Err(ConfigError::FeatureDisabled(feature))
        }
    }

    /// Subgraph endpoint of `chain_id`, when The Graph is enabled.
    pub fn subgraph_endpoint(&self, chain_id: u64) -> Result<&str, ConfigError> {
        self.require(Feature::Graph)?;
        self.graph_endpoint(chain_id)
            .ok_or(ConfigError::NoGraphEndpoint(chain_id))
    }

    /// API settings with the keys of disabled providers removed.
    pub fn provider_api(&self) -> ApiConfig {
        let mut api = self.api.clone();
        if !self.features.enable_alchemy {
            api.alchemy_key = None;
        }
        if !self.features.enable_infura {
            api.infura_key = None;
        }
        api
    }

    /// Alchemy key for asset transfers; errors when Alchemy is disabled.
    pub fn alchemy_key(&self) -> Result<Option<&str>, ConfigError> {
        self.require(Feature::Alchemy)?;
        Ok(self
            .api
            .alchemy_key
            .as_deref()
            .filter(|k| is_usable_alchemy_key(Some(k))))
    }

    pub fn is_chain_supported(&self, chain_id: u64) -> bool {
        self.chain_by_id(chain_id).is_some()
    }

    /// Chains with a contract that are testnets, or mainnets when enabled.
    pub fn supported_chains(&self) -> Vec<&ChainConfig> {
        self.chains
            .iter()
            .filter(|c| {
                c.contract_address.is_some() && (c.testnet || self.features.is_enabled(Feature::Mainnet))
            })
            .collect()
    }

    /// Check the configuration. Returns warnings on success.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let mut errors = Vec::new();
        if self.chain(&self.default_chain).is_none() {
            errors.push(format!(
                "default chain '{}' not found in chain configs",
                self.default_chain
            ));
        }
        if !self.chains.iter().any(|c| c.contract_address.is_some()) {
            errors.push("no contract addresses configured for any chain".to_string());
        }
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        let mut warnings = Vec::new();
        if self.api.alchemy_key.is_none() && self.api.infura_key.is_none() {
            warnings.push("no Infura or Alchemy API key configured".to_string());
        }
        Ok(warnings)
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(store::default_data_dir()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.default_chain, "sepolia");
        assert_eq!(cfg.dashboard_rpc, DEFAULT_DASHBOARD_RPC);
        assert_eq!(cfg.chains.len(), 5);
        assert!(!cfg.debug);
        assert_eq!(cfg.deploy_block(11_155_111), 0);
        assert_eq!(
            cfg.chain("localhost").unwrap().rpc_url.as_deref(),
            Some(DEFAULT_DASHBOARD_RPC)
        );
    }

    #[test]
    fn test_chain_variables() {
        let cfg = config(&[
            ("CONTRACT_ADDRESS_SEPOLIA", CONTRACT),
            ("CONTRACT_BLOCK_SEPOLIA", "5123456"),
            ("SEPOLIA_RPC", "https://example.org/rpc"),
        ]);
        let sepolia = cfg.chain_by_id(11_155_111).unwrap();
        assert_eq!(sepolia.contract_address, Some(CONTRACT.parse().unwrap()));
        assert_eq!(sepolia.deploy_block, 5_123_456);
        assert_eq!(sepolia.rpc_url.as_deref(), Some("https://example.org/rpc"));
    }

    #[test]
    fn test_invalid_address_is_an_error() {
        let vars: HashMap<String, String> =
            [("DATALOGGER_CONTRACT_ADDRESS_BASE".to_string(), "0x123".to_string())].into();
        let err = AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "DATALOGGER_CONTRACT_ADDRESS_BASE"));
    }

    #[test]
    fn test_supported_chains_respects_mainnet_flag() {
        let vars = [
            ("CONTRACT_ADDRESS_SEPOLIA", CONTRACT),
            ("CONTRACT_ADDRESS_MAINNET", CONTRACT),
        ];
        let cfg = config(&vars);
        let keys: Vec<_> = cfg.supported_chains().iter().map(|c| c.key.clone()).collect();
        assert_eq!(keys, vec!["sepolia"]);

        let mut with_mainnet = vars.to_vec();
        with_mainnet.push(("ENABLE_MAINNET", "true"));
        let cfg = config(&with_mainnet);
        assert_eq!(cfg.supported_chains().len(), 2);
    }

    #[test]
    fn test_explorer_urls() {
        let cfg = config(&[]);
        assert_eq!(
            cfg.explorer_url(1, ExplorerKind::Tx, Some("0xabc")).as_deref(),
            Some("https://etherscan.io/tx/0xabc")
        );
        assert_eq!(
            cfg.explorer_url(8453, ExplorerKind::Address, None).as_deref(),
            Some("https://basescan.org")
        );
        assert_eq!(cfg.explorer_url(31337, ExplorerKind::Block, Some("1")), None);
        assert_eq!(cfg.explorer_url(5, ExplorerKind::Block, Some("1")), None);
    }

    #[test]
    fn test_graph_endpoint_by_chain_name() {
        let cfg = config(&[("GRAPH_ENDPOINT_SEPOLIA", "https://api.studio.thegraph.com/query/1/dl/v1")]);
        assert!(cfg.graph_endpoint(11_155_111).is_some());
        assert!(cfg.graph_endpoint(1).is_none());
    }

    #[test]
    fn test_validate() {
        let err = config(&[("DEFAULT_CHAIN", "goerli")]).validate().unwrap_err();
        match err {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        let warnings = config(&[("CONTRACT_ADDRESS_SEPOLIA", CONTRACT)])
            .validate()
            .unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_placeholder_keys_are_unusable() {
        assert!(!is_usable_alchemy_key(Some("YOUR_ALCHEMY_KEY")));
        assert!(!is_usable_alchemy_key(Some("short")));
        assert!(is_usable_alchemy_key(Some("abcdefghijklmnop")));
        assert!(!is_usable_infura_key(Some("YOUR_INFURA_KEY")));
        assert!(!is_usable_infura_key(None));
    }

    #[test]
    fn test_provider_selection_order() {
        let both = ApiConfig {
            alchemy_key: Some("alchemy-key-123456".into()),
            infura_key: Some("infura".into()),
            default_provider: Some(ProviderKind::Infura),
            ..Default::default()
        };
        // Env default beats auto.
        assert_eq!(ProviderManager::new(&both, None).current(), ProviderKind::Infura);
        // Stored preference beats env default.
        assert_eq!(
            ProviderManager::new(&both, Some(ProviderKind::Alchemy)).current(),
            ProviderKind::Alchemy
        );

        let only_infura = ApiConfig {
            infura_key: Some("infura".into()),
            default_provider: Some(ProviderKind::Alchemy),
            ..Default::default()
        };
        // Unavailable preferences fall through to auto.
        assert_eq!(
            ProviderManager::new(&only_infura, Some(ProviderKind::Alchemy)).current(),
            ProviderKind::Infura
        );
        assert_eq!(
            ProviderManager::new(&ApiConfig::default(), None).current(),
            ProviderKind::Public
        );
    }

    #[test]
    fn test_provider_rpc_urls() {
        let cfg = config(&[("BASE_RPC", "https://my-base.example")]);
        let alchemy = ApiConfig {
            alchemy_key: Some("alchemy-key-123456".into()),
            ..Default::default()
        };
        let manager = ProviderManager::new(&alchemy, None);
        assert_eq!(
            manager.rpc_url(cfg.chain("sepolia").unwrap()).as_deref(),
            Some("https://eth-sepolia.g.alchemy.com/v2/alchemy-key-123456")
        );
        assert!(manager.supports_asset_transfers());

        let public = ProviderManager::new(&ApiConfig::default(), None);
        assert_eq!(
            public.rpc_url(cfg.chain("base").unwrap()).as_deref(),
            Some("https://my-base.example")
        );
        assert_eq!(
            public.rpc_url(cfg.chain("mainnet").unwrap()).as_deref(),
            Some("https://ethereum.publicnode.com")
        );
    }

    #[test]
    fn test_disabled_features_are_refused() {
        let vars = [
            ("ALCHEMY_KEY", "alchemy-key-123456"),
            ("INFURA_KEY", "infura"),
            ("GRAPH_ENDPOINT_SEPOLIA", "https://api.studio.thegraph.com/query/1/dl/v1"),
        ];
        let off = config(&vars);
        assert!(matches!(
            off.subgraph_endpoint(11_155_111),
            Err(ConfigError::FeatureDisabled(Feature::Graph))
        ));
        assert!(matches!(
            off.alchemy_key(),
            Err(ConfigError::FeatureDisabled(Feature::Alchemy))
        ));
        // Keys of disabled providers are never offered.
        let providers = ProviderManager::new(&off.provider_api(), Some(ProviderKind::Infura));
        assert_eq!(providers.current(), ProviderKind::Public);
        assert_eq!(providers.available(), vec![ProviderKind::Public]);

        let mut on = vars.to_vec();
        on.extend([("ENABLE_GRAPH", "true"), ("ENABLE_INFURA", "true")]);
        let on = config(&on);
        assert!(on.subgraph_endpoint(11_155_111).is_ok());
        assert!(matches!(on.subgraph_endpoint(1), Err(ConfigError::NoGraphEndpoint(1))));
        let providers = ProviderManager::new(&on.provider_api(), None);
        assert_eq!(providers.current(), ProviderKind::Infura);
        assert!(!providers.is_available(ProviderKind::Alchemy));
    }

    #[test]
    fn test_provider_preference_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::in_dir(dir.path()).unwrap();
        let api = ApiConfig {
            alchemy_key: Some("alchemy-key-123456".into()),
            infura_key: Some("infura".into()),
            ..Default::default()
        };
        let mut manager = ProviderManager::load(&api, &store).unwrap();
        assert_eq!(manager.current(), ProviderKind::Alchemy);
        assert!(manager.switch(ProviderKind::Infura, Some(&store)).unwrap());

        let reloaded = ProviderManager::load(&api, &store).unwrap();
        assert_eq!(reloaded.current(), ProviderKind::Infura);
    }
}
