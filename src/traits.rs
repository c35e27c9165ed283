//! Traits for the ledger store and payment feed abstractions

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};

use crate::types::*;

/// Narrow interface onto the external double-entry ledger store.
///
/// The engine treats the store as a single-writer resource: one
/// reconciliation run holds exclusive write access for its duration. The
/// store owns accounts and committed entries; this trait only resolves,
/// reads balances, appends and flushes.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Resolve an account by its full hierarchical path.
    async fn resolve_account(&self, path: &str) -> ReconcileResult<Option<Account>>;

    /// Find a committed entry by its external idempotency key.
    async fn find_entry_by_key(&self, key: &str) -> ReconcileResult<Option<LedgerEntry>>;

    /// Append a new entry. The caller has already validated it.
    async fn commit_entry(&mut self, entry: &LedgerEntry) -> ReconcileResult<()>;

    /// Balance of an account at the end of `at_date`, optionally including
    /// all descendant accounts.
    ///
    /// Balances are reported in the account's natural sign: income and
    /// liability balances come back credit-positive, assets and expenses
    /// debit-positive.
    async fn get_balance(
        &self,
        path: &str,
        at_date: NaiveDate,
        recursive: bool,
    ) -> ReconcileResult<BigDecimal>;

    /// Direct children of an account, in the store's display order.
    async fn child_accounts(&self, path: &str) -> ReconcileResult<Vec<Account>>;

    /// All accounts, optionally filtered by type.
    async fn list_accounts(
        &self,
        account_type: Option<AccountType>,
    ) -> ReconcileResult<Vec<Account>>;

    /// Flush committed entries to durable storage.
    async fn save(&mut self) -> ReconcileResult<()>;
}

/// A paginated external payment source.
///
/// Implementations own the HTTP/OAuth plumbing; the engine only sees
/// already-shaped [`ExternalTransaction`] records. A fetch failure aborts
/// the run before any ledger mutation, so reruns are always safe.
#[async_trait]
pub trait TransactionFeed: Send + Sync {
    /// Short label used in watermarks and log lines, e.g. `"stripe"`.
    fn source_name(&self) -> &str;

    /// Fetch one page (up to 1000 records) of transactions created after
    /// `lower_bound`, oldest first.
    async fn list_since(
        &self,
        lower_bound: DateTime<Utc>,
    ) -> ReconcileResult<Vec<ExternalTransaction>>;

    /// Retrieve the metadata of an originating charge by its native id.
    ///
    /// Used to re-classify positive-net adjustments against the category
    /// of the charge they adjust. Sources without this capability return
    /// `Ok(None)`.
    async fn retrieve_origin(
        &self,
        charge_id: &str,
    ) -> ReconcileResult<Option<TransactionMetadata>>;
}
