use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use anyhow::{bail, Context as _};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use datalogger::config::{AppConfig, ChainConfig, ExplorerKind, ProviderKind, ProviderManager};
use datalogger::contract::DataLoggerClient;
use datalogger::dashboard::Dashboard;
use datalogger::deploy::{self, DeploymentInfo, DEFAULT_VERIFY_LOOKBACK};
use datalogger::history::{
    AlchemyClient, DirectHistory, GraphClient, TransferFilter, TransferHistory,
};
use datalogger::indexer::{EntityStore, Indexer, DEFAULT_FOLLOW_INTERVAL};
use datalogger::logging::{self, LogFormat};
use datalogger::refresh::{AutoRefresh, AutoRefreshSettings, BlockFeed};
use datalogger::rpc::EthClient;
use datalogger::store::{LocalStore, TtlCache};
use datalogger::units::{format_ether, format_gwei, format_timestamp};
use datalogger::upload::{Payload, UploadRequest, Uploader};

#[derive(Parser)]
#[command(author, version, about = "DataLogger contract tools and local node dashboard")]
struct Cli {
    /// Chain key: sepolia, mainnet, base, arbitrum or localhost.
    #[arg(long, global = true, env = "DATALOGGER_CHAIN")]
    chain: Option<String>,
    /// Override the RPC endpoint.
    #[arg(long, global = true)]
    rpc_url: Option<String>,
    #[arg(long, global = true, env = "DATALOGGER_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,
    /// Sending account. Defaults to the node's first unlocked account.
    #[arg(long, global = true)]
    from: Option<Address>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write to the DataLogger contract or send a native transfer
    #[command(subcommand)]
    Upload(UploadCommand),
    /// Records of an address, read from the contract
    Records { address: Option<Address> },
    /// Total records held by the contract
    Counts,
    #[command(subcommand)]
    History(HistoryCommand),
    /// Build subgraph-style entities from contract events
    Index {
        /// Keep following new blocks until interrupted.
        #[arg(long)]
        follow: bool,
        #[arg(long)]
        batch_size: Option<u64>,
        /// Print this many newest records afterwards.
        #[arg(long, default_value_t = 10)]
        show: usize,
    },
    /// Inspect a local development node
    #[command(subcommand)]
    Dashboard(DashboardCommand),
    #[command(subcommand)]
    Refresh(RefreshCommand),
    /// Deploy the DataLogger contract from a Hardhat artifact
    Deploy {
        #[arg(long, default_value = "artifacts/contracts/DataLogger.sol/DataLogger.json")]
        artifact: PathBuf,
        #[arg(long, default_value = "deployments")]
        out: PathBuf,
    },
    /// Check a deployment and summarize its recent events
    Verify {
        /// Defaults to the saved deployment, then the configured address.
        address: Option<Address>,
        #[arg(long, default_value_t = DEFAULT_VERIFY_LOOKBACK)]
        lookback: u64,
        #[arg(long, default_value = "deployments")]
        deployments: PathBuf,
    },
    /// Show the effective configuration
    Config {
        /// Switch and remember the RPC provider.
        #[arg(long)]
        provider: Option<ProviderKind>,
    },
}

#[derive(Subcommand)]
enum UploadCommand {
    /// Store a categorized data entry
    Log { category: String, data: String },
    /// Pay an address through the contract with a memo
    Pay { to: String, amount: String, memo: String },
    /// Plain transfer, optionally carrying data
    Transfer {
        to: String,
        amount: String,
        #[arg(long, conflicts_with = "hex")]
        text: Option<String>,
        #[arg(long)]
        hex: Option<String>,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Asset transfers of an address, via Alchemy
    Transfers {
        address: Option<Address>,
        #[arg(long, default_value = "all", value_parser = parse_filter)]
        filter: TransferFilter,
        /// Ignore the cache.
        #[arg(long)]
        refresh: bool,
    },
    /// Newest records from the subgraph
    Graph {
        #[arg(long, default_value_t = 20)]
        first: u32,
        #[arg(long, default_value_t = 0)]
        skip: u32,
    },
    /// Contract events since the deploy block
    Events {
        #[arg(long)]
        from_block: Option<u64>,
    },
}

#[derive(Subcommand)]
enum DashboardCommand {
    Accounts,
    Blocks,
    Transactions,
    /// Transaction with its receipt
    Tx { hash: B256 },
    /// Known contracts, after scanning for new deployments
    Contracts {
        /// Rescan every block from 1.
        #[arg(long)]
        full: bool,
    },
    Events,
    /// Load everything and write the console log to a file
    ConsoleExport { path: PathBuf },
    /// Follow new blocks and auto refresh as the refresh settings say, until interrupted
    Watch {
        #[arg(long, default_value_t = 1_000)]
        poll_ms: u64,
    },
    /// Send 1 ETH from the first account to the second
    SendTest,
}

#[derive(Subcommand)]
enum RefreshCommand {
    Show,
    Enable,
    Disable,
    Interval { ms: u64 },
    WatchBlocks {
        #[arg(action = ArgAction::Set)]
        on: bool,
    },
}

/// How often `dashboard watch` re-reads settings changed by `refresh`.
const SETTINGS_RELOAD: Duration = Duration::from_secs(2);

fn parse_filter(raw: &str) -> Result<TransferFilter, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown filter {raw:?}"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Context
// =============================================================================

struct Context {
    config: AppConfig,
    chain: ChainConfig,
    store: Arc<LocalStore>,
    rpc_url: Option<String>,
    from: Option<Address>,
}

impl Context {
    fn new(cli: &Cli, config: AppConfig) -> anyhow::Result<Self> {
        match config.validate() {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("{warning}");
                }
            }
            Err(e) => tracing::debug!(error = %e, "Configuration incomplete"),
        }
        let key = cli.chain.as_deref().unwrap_or(&config.default_chain);
        let chain = config
            .chain(key)
            .cloned()
            .with_context(|| format!("unknown chain {key:?}"))?;
        let data_dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => config.data_dir()?,
        };
        let store = Arc::new(LocalStore::in_dir(&data_dir)?);
        Ok(Self {
            config,
            chain,
            store,
            rpc_url: cli.rpc_url.clone(),
            from: cli.from,
        })
    }

    fn providers(&self) -> anyhow::Result<ProviderManager> {
        Ok(ProviderManager::load(&self.config.provider_api(), &self.store)?)
    }

    fn eth(&self) -> anyhow::Result<EthClient> {
        let url = match &self.rpc_url {
            Some(url) => url.clone(),
            None => self
                .providers()?
                .rpc_url(&self.chain)
                .with_context(|| format!("no RPC endpoint for {}", self.chain.name))?,
        };
        tracing::debug!(%url, chain = %self.chain.key, "Using RPC endpoint");
        Ok(EthClient::http(&url)?)
    }

    /// Client for the local node. `localhost` can resolve to an address the
    /// node does not listen on, so `127.0.0.1` is tried next.
    async fn dashboard_eth(&self) -> anyhow::Result<EthClient> {
        let url = self
            .rpc_url
            .clone()
            .unwrap_or_else(|| self.config.dashboard_rpc.clone());
        let eth = EthClient::http(&url)?;
        match eth.chain_id().await {
            Ok(_) => Ok(eth),
            Err(e) if url.contains("localhost") => {
                let fallback = url.replace("localhost", "127.0.0.1");
                tracing::warn!(error = %e.summary(), %fallback, "Node unreachable, retrying");
                let eth = EthClient::http(&fallback)?;
                eth.chain_id()
                    .await
                    .with_context(|| format!("no node at {url} or {fallback}"))?;
                Ok(eth)
            }
            Err(e) => Err(e).with_context(|| format!("no node at {url}")),
        }
    }

    fn contract_address(&self) -> anyhow::Result<Address> {
        self.chain.contract_address.with_context(|| {
            format!(
                "no contract address for {}; set DATALOGGER_CONTRACT_ADDRESS_{}",
                self.chain.name,
                self.chain.key.to_ascii_uppercase()
            )
        })
    }

    async fn sender(&self, eth: &EthClient) -> anyhow::Result<Address> {
        if let Some(from) = self.from {
            return Ok(from);
        }
        let accounts = eth.accounts().await?;
        accounts
            .first()
            .copied()
            .context("node has no unlocked accounts; pass --from")
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn upload(ctx: &Context, command: UploadCommand) -> anyhow::Result<()> {
    let request = match command {
        UploadCommand::Log { category, data } => UploadRequest::EventLog { category, data },
        UploadCommand::Pay { to, amount, memo } => UploadRequest::ContractPayment { to, amount, memo },
        UploadCommand::Transfer {
            to,
            amount,
            text,
            hex,
        } => UploadRequest::NativeTransfer {
            to,
            amount,
            payload: text.map(Payload::Text).or(hex.map(Payload::Hex)),
        },
    };
    let eth = ctx.eth()?;
    let from = ctx.sender(&eth).await?;
    let outcome = Uploader::new(eth, ctx.chain.contract_address, from)
        .submit(&request)
        .await?;
    print_json(&outcome)?;
    if let Some(link) = ctx.config.explorer_url(
        ctx.chain.id,
        ExplorerKind::Tx,
        Some(&outcome.tx_hash.to_string()),
    ) {
        eprintln!("{link}");
    }
    Ok(())
}

async fn history(ctx: &Context, command: HistoryCommand) -> anyhow::Result<()> {
    match command {
        HistoryCommand::Transfers {
            address,
            filter,
            refresh,
        } => {
            let eth = ctx.eth()?;
            let address = match address {
                Some(address) => address,
                None => ctx.sender(&eth).await?,
            };
            let alchemy = AlchemyClient::new(ctx.config.alchemy_key()?, &ctx.chain.key)?;
            let cache = TtlCache::with_default_ttl(ctx.store.clone());
            let history = TransferHistory::new(alchemy, eth, cache, ctx.chain.contract_address);
            let page = if refresh {
                history.refresh(address, ctx.chain.id).await?
            } else {
                history.load(address, ctx.chain.id).await?
            };
            eprintln!(
                "{} transfers ({}), cached: {}",
                page.transfers.len(),
                serde_json::to_string(&page.stats)?,
                page.from_cache
            );
            print_json(&filter.apply(&page.transfers))
        }
        HistoryCommand::Graph { first, skip } => {
            let endpoint = ctx.config.subgraph_endpoint(ctx.chain.id)?;
            let graph = GraphClient::new(endpoint)?;
            let page = graph.data_records(first, skip).await?;
            print_json(&page)
        }
        HistoryCommand::Events { from_block } => {
            let eth = ctx.eth()?;
            let head = eth.block_number().await?;
            let contract = DataLoggerClient::new(eth, ctx.contract_address()?);
            let from = from_block.unwrap_or(ctx.chain.deploy_block);
            let events = contract.events(from, head).await?;
            print_json(&events)
        }
    }
}

async fn index(ctx: &Context, follow: bool, batch_size: Option<u64>, show: usize) -> anyhow::Result<()> {
    let eth = ctx.eth()?;
    let contract = ctx.contract_address()?;
    let key = EntityStore::key_for(ctx.chain.id, contract);
    let entities = Arc::new(EntityStore::open(ctx.store.clone(), key)?);
    let mut indexer = Indexer::new(eth, contract, ctx.chain.deploy_block, entities.clone());
    if let Some(size) = batch_size {
        indexer = indexer.with_batch_size(size);
    }

    let report = indexer.sync().await?;
    print_json(&report)?;
    if follow {
        tokio::select! {
            _ = indexer.follow(DEFAULT_FOLLOW_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        }
    }
    print_json(&entities.meta())?;
    print_json(&entities.data_records(show, 0))
}

async fn dashboard(ctx: &Context, command: DashboardCommand) -> anyhow::Result<()> {
    let eth = ctx.dashboard_eth().await?;
    let mut dash = Dashboard::new(eth, ctx.store.clone())?;

    match command {
        DashboardCommand::Accounts => {
            dash.accounts.load().await?;
            for a in dash.accounts.accounts() {
                let marker = if a.error { " (unavailable)" } else { "" };
                println!(
                    "{:>2}  {}  {:>24} ETH  {:>5} txs  {}{marker}",
                    a.index,
                    a.address,
                    format_ether(a.balance),
                    a.tx_count,
                    a.nickname
                );
            }
        }
        DashboardCommand::Blocks => {
            dash.blocks.load_recent().await?;
            for b in dash.blocks.blocks() {
                println!(
                    "#{:<8} {}  {:>3} txs  {:>5.1}% gas  {}",
                    b.number,
                    b.hash,
                    b.tx_count(),
                    b.utilization(),
                    format_timestamp(b.timestamp)
                );
            }
        }
        DashboardCommand::Transactions => {
            dash.transactions.load_recent().await?;
            print_json(&dash.transactions.transactions().collect::<Vec<_>>())?;
        }
        DashboardCommand::Tx { hash } => {
            print_json(&dash.transaction_details(hash).await?)?;
        }
        DashboardCommand::Contracts { full } => {
            let report = if full {
                dash.rescan_contracts().await?
            } else {
                dash.scan_contracts().await?
            };
            eprintln!(
                "scanned {} blocks, {} new contract(s){}",
                report.scanned,
                report.added,
                if report.reset { ", node was reset" } else { "" }
            );
            print_json(&dash.contracts.entries())?;
        }
        DashboardCommand::Events => {
            dash.scan_contracts().await?;
            dash.events.load_recent(&dash.contracts).await?;
            print_json(&dash.events.events())?;
        }
        DashboardCommand::ConsoleExport { path } => {
            dash.init().await?;
            let total = dash.console().export(&path)?;
            eprintln!("{total} entries written to {}", path.display());
        }
        DashboardCommand::Watch { poll_ms } => watch(ctx, &mut dash, Duration::from_millis(poll_ms)).await?,
        DashboardCommand::SendTest => {
            let receipt = dash.send_test_transaction().await?;
            print_json(&receipt)?;
        }
    }
    Ok(())
}

async fn watch(ctx: &Context, dash: &mut Dashboard, poll: Duration) -> anyhow::Result<()> {
    dash.init().await?;
    let auto = AutoRefresh::load(ctx.store.clone());
    let mut changes = auto.subscribe();
    let mut settings = auto.settings();

    let mut feed = BlockFeed::new(dash.eth().clone(), poll);
    feed.apply(&settings);
    let mut ticker = refresh_ticker(&settings).await;
    let mut reload = tokio::time::interval(SETTINGS_RELOAD);
    eprintln!("{}, Ctrl-C to stop", describe(&settings));

    loop {
        tokio::select! {
            number = feed.next_block() => {
                if let Err(e) = dash.on_new_block(number).await {
                    tracing::warn!(number, error = %e, "Failed to apply new block");
                    continue;
                }
                if let Some(block) = dash.blocks.blocks().next() {
                    let gas = dash.gas_price().map(format_gwei).unwrap_or_default();
                    println!("#{} {} txs, gas {gas} gwei", block.number, block.tx_count());
                }
            }
            _ = ticker.tick(), if settings.enabled => {
                if let Err(e) = dash.refresh_all().await {
                    tracing::warn!(error = %e, "Auto refresh failed");
                }
            }
            _ = reload.tick() => {
                if let Err(e) = auto.reload() {
                    tracing::warn!(error = %e, "Failed to reload auto refresh settings");
                }
            }
            Ok(()) = changes.changed() => {
                let next = *changes.borrow_and_update();
                if next.interval_ms != settings.interval_ms {
                    ticker = refresh_ticker(&next).await;
                }
                feed.apply(&next);
                settings = next;
                eprintln!("{}", describe(&settings));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    feed.stop();
    Ok(())
}

/// Interval ticker whose immediate first tick is already consumed.
async fn refresh_ticker(settings: &AutoRefreshSettings) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(settings.interval());
    ticker.tick().await;
    ticker
}

fn describe(settings: &AutoRefreshSettings) -> String {
    let on_off = |on: bool| if on { "on" } else { "off" };
    format!(
        "auto refresh {} every {}s, block watching {}",
        on_off(settings.enabled),
        settings.interval_ms / 1_000,
        on_off(settings.block_watching)
    )
}

fn refresh(ctx: &Context, command: RefreshCommand) -> anyhow::Result<()> {
    let auto = AutoRefresh::load(ctx.store.clone());
    let settings = match command {
        RefreshCommand::Show => auto.settings(),
        RefreshCommand::Enable => auto.set_enabled(true)?,
        RefreshCommand::Disable => auto.set_enabled(false)?,
        RefreshCommand::Interval { ms } => auto.set_interval(ms)?,
        RefreshCommand::WatchBlocks { on } => {
            if on && !auto.settings().enabled {
                bail!("enable auto refresh before block watching");
            }
            auto.set_block_watching(on)?
        }
    };
    print_json(&settings)
}

async fn deploy_contract(ctx: &Context, artifact: PathBuf, out: PathBuf) -> anyhow::Result<()> {
    let eth = ctx.eth()?;
    let from = ctx.sender(&eth).await?;
    let balance = eth.balance(from).await?;
    eprintln!("deploying from {from} ({} ETH)", format_ether(balance));

    let info = deploy::deploy_artifact(&eth, from, &artifact, &ctx.chain.key).await?;
    let path = info.save(&out)?;
    print_json(&info)?;
    eprintln!("saved to {}", path.display());
    eprintln!("add to .env:");
    for line in info.env_lines() {
        eprintln!("  {line}");
    }
    Ok(())
}

async fn verify(ctx: &Context, address: Option<Address>, lookback: u64, deployments: &Path) -> anyhow::Result<()> {
    let address = match address {
        Some(address) => address,
        None => match DeploymentInfo::load(deployments, &ctx.chain.key) {
            Ok(info) => info.address,
            Err(_) => ctx.contract_address()?,
        },
    };
    let eth = ctx.eth()?;
    let report = deploy::verify_deployment(&eth, address, lookback).await?;
    print_json(&report)?;
    if let Some(link) = ctx.config.explorer_url(
        ctx.chain.id,
        ExplorerKind::Address,
        Some(&address.to_string()),
    ) {
        eprintln!("{link}");
    }
    Ok(())
}

fn show_config(ctx: &Context, provider: Option<ProviderKind>) -> anyhow::Result<()> {
    let mut providers = ctx.providers()?;
    if let Some(kind) = provider {
        if !providers.switch(kind, Some(ctx.store.as_ref()))? {
            bail!("provider {kind} has no usable API key");
        }
    }
    print_json(&serde_json::json!({
        "chain": ctx.chain,
        "provider": providers.current().to_string(),
        "availableProviders": providers
            .available()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        "rpcUrl": providers.rpc_url(&ctx.chain),
        "features": ctx.config.features,
        "graphEndpoints": ctx.config.api.graph_endpoints,
        "dashboardRpc": ctx.config.dashboard_rpc,
        "dataDir": ctx.store.path().parent(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    logging::init(cli.log_format, config.debug);

    let ctx = Context::new(&cli, config)?;
    match cli.command {
        Command::Upload(command) => upload(&ctx, command).await,
        Command::Records { address } => {
            let eth = ctx.eth()?;
            let user = match address {
                Some(address) => address,
                None => ctx.sender(&eth).await?,
            };
            let direct = DirectHistory::new(DataLoggerClient::new(eth, ctx.contract_address()?));
            print_json(&direct.user_records(user).await?)
        }
        Command::Counts => {
            let contract = DataLoggerClient::new(ctx.eth()?, ctx.contract_address()?);
            print_json(&contract.record_counts().await?)
        }
        Command::History(command) => history(&ctx, command).await,
        Command::Index {
            follow,
            batch_size,
            show,
        } => index(&ctx, follow, batch_size, show).await,
        Command::Dashboard(command) => dashboard(&ctx, command).await,
        Command::Refresh(command) => refresh(&ctx, command),
        Command::Deploy { artifact, out } => deploy_contract(&ctx, artifact, out).await,
        Command::Verify {
            address,
            lookback,
            deployments,
        } => verify(&ctx, address, lookback, &deployments).await,
        Command::Config { provider } => show_config(&ctx, provider),
    }
}
