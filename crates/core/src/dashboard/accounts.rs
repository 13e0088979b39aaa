//! Node accounts with balances, nonces and user-chosen nicknames.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use futures::future::join_all;
use serde::Serialize;

use super::DashboardError;
use crate::rpc::{EthClient, RpcError};
use crate::store::LocalStore;

pub const MAX_ACCOUNTS: usize = 20;

pub fn nickname_key(address: &Address) -> String {
    format!("nickname_{address}")
}

pub fn default_nickname(index: usize) -> String {
    format!("Account {index}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub index: usize,
    pub address: Address,
    pub balance: U256,
    pub tx_count: u64,
    pub nickname: String,
    /// The last balance or nonce lookup failed.
    pub error: bool,
}

#[derive(Debug)]
pub struct AccountsPanel {
    eth: EthClient,
    store: Arc<LocalStore>,
    accounts: Vec<AccountInfo>,
}

impl AccountsPanel {
    pub fn new(eth: EthClient, store: Arc<LocalStore>) -> Self {
        Self {
            eth,
            store,
            accounts: Vec::new(),
        }
    }

    pub fn accounts(&self) -> &[AccountInfo] {
        &self.accounts
    }

    pub fn get(&self, index: usize) -> Option<&AccountInfo> {
        self.accounts.get(index)
    }

    /// Reload the node's accounts. A failed lookup keeps the account with a
    /// zero balance and its default nickname.
    pub async fn load(&mut self) -> Result<&[AccountInfo], DashboardError> {
        let addresses = self.eth.accounts().await?;
        let lookups = addresses
            .into_iter()
            .take(MAX_ACCOUNTS)
            .enumerate()
            .map(|(index, address)| self.load_account(index, address));
        let accounts = join_all(lookups).await;
        self.accounts = accounts;

        let failed = self.accounts.iter().filter(|a| a.error).count();
        tracing::info!(accounts = self.accounts.len(), failed, "Loaded accounts");
        Ok(&self.accounts)
    }

    async fn load_account(&self, index: usize, address: Address) -> AccountInfo {
        match self.lookup(address).await {
            Ok((balance, tx_count)) => AccountInfo {
                index,
                address,
                balance,
                tx_count,
                nickname: self.nickname(index, &address),
                error: false,
            },
            Err(e) => {
                tracing::warn!(%address, error = %e.summary(), "Failed to load account");
                AccountInfo {
                    index,
                    address,
                    balance: U256::ZERO,
                    tx_count: 0,
                    nickname: default_nickname(index),
                    error: true,
                }
            }
        }
    }

    async fn lookup(&self, address: Address) -> Result<(U256, u64), RpcError> {
        futures::try_join!(
            self.eth.balance(address),
            self.eth.transaction_count(address),
        )
    }

    fn nickname(&self, index: usize, address: &Address) -> String {
        match self.store.get::<String>(&nickname_key(address)) {
            Ok(Some(name)) => name,
            Ok(None) => default_nickname(index),
            Err(e) => {
                tracing::warn!(%address, error = %e, "Stored nickname unreadable");
                default_nickname(index)
            }
        }
    }

    /// Refresh balances and nonces of the loaded accounts, one at a time.
    /// Accounts whose lookup fails keep their previous values.
    pub async fn update_balances(&mut self) {
        for i in 0..self.accounts.len() {
            let address = self.accounts[i].address;
            match self.lookup(address).await {
                Ok((balance, tx_count)) => {
                    let account = &mut self.accounts[i];
                    account.balance = balance;
                    account.tx_count = tx_count;
                    account.error = false;
                }
                Err(e) => {
                    tracing::debug!(%address, error = %e.summary(), "Balance update failed");
                }
            }
        }
    }

    /// Persist a nickname. An empty name restores the default.
    pub fn set_nickname(&mut self, index: usize, name: &str) -> Result<&AccountInfo, DashboardError> {
        let account = self
            .accounts
            .get_mut(index)
            .ok_or_else(|| DashboardError::NotFound(format!("account {index}")))?;
        let key = nickname_key(&account.address);
        let name = name.trim();
        if name.is_empty() {
            self.store.remove(&key)?;
            account.nickname = default_nickname(index);
        } else {
            self.store.set(&key, name)?;
            account.nickname = name.to_string();
        }
        Ok(account)
    }
}
