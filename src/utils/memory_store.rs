//! In-memory ledger store implementation for testing and development

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::LedgerStore;
use crate::types::*;

/// In-memory [`LedgerStore`] with a seeded account tree.
///
/// Accounts are keyed by full path; committed entries by external key.
/// Balances are recomputed from splits on every query, with income and
/// liability balances reported credit-positive to match the real store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    entries: Arc<RwLock<HashMap<String, LedgerEntry>>>,
    saves: Arc<RwLock<usize>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            entries: Arc::new(RwLock::new(HashMap::new())),
            saves: Arc::new(RwLock::new(0)),
        }
    }

    /// Create a store pre-seeded with an account tree.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.add_account(account);
        }
        store
    }

    /// Seed one account (test setup only; the engine never creates them).
    pub fn add_account(&self, account: Account) {
        self.accounts
            .write()
            .unwrap()
            .insert(account.path.clone(), account);
    }

    /// Number of committed entries.
    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// How many times `save` was called (flush-per-line assertions).
    pub fn save_count(&self) -> usize {
        *self.saves.read().unwrap()
    }

    fn account_posting_sum(
        &self,
        path: &str,
        at_date: NaiveDate,
        recursive: bool,
    ) -> BigDecimal {
        let prefix = format!("{}:", path);
        let entries = self.entries.read().unwrap();

        let mut sum = BigDecimal::from(0);
        for entry in entries.values() {
            if entry.post_date > at_date {
                continue;
            }
            for split in &entry.splits {
                if split.account == path || (recursive && split.account.starts_with(&prefix)) {
                    sum += &split.value;
                }
            }
        }
        sum
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn resolve_account(&self, path: &str) -> ReconcileResult<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(path).cloned())
    }

    async fn find_entry_by_key(&self, key: &str) -> ReconcileResult<Option<LedgerEntry>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn commit_entry(&mut self, entry: &LedgerEntry) -> ReconcileResult<()> {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&entry.external_key) {
            return Err(ReconcileError::Store(format!(
                "duplicate external key: {}",
                entry.external_key
            )));
        }
        entries.insert(entry.external_key.clone(), entry.clone());
        Ok(())
    }

    async fn get_balance(
        &self,
        path: &str,
        at_date: NaiveDate,
        recursive: bool,
    ) -> ReconcileResult<BigDecimal> {
        let account = self
            .accounts
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ReconcileError::AccountNotFound(path.to_string()))?;

        let sum = self.account_posting_sum(path, at_date, recursive);

        // natural sign: income and liabilities are credit-positive
        let balance = match account.account_type {
            AccountType::Income | AccountType::Liability => -sum,
            AccountType::Asset | AccountType::Expense | AccountType::Imbalance => sum,
        };
        Ok(balance)
    }

    async fn child_accounts(&self, path: &str) -> ReconcileResult<Vec<Account>> {
        let accounts = self.accounts.read().unwrap();
        let mut children: Vec<Account> = accounts
            .values()
            .filter(|account| account.parent_path() == Some(path))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn list_accounts(
        &self,
        account_type: Option<AccountType>,
    ) -> ReconcileResult<Vec<Account>> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts
            .values()
            .filter(|account| account_type.is_none_or(|t| account.account_type == t))
            .cloned()
            .collect())
    }

    async fn save(&mut self) -> ReconcileResult<()> {
        *self.saves.write().unwrap() += 1;
        Ok(())
    }
}
