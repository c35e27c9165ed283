//! Ledger importer: per-transaction state machine and batch orchestration
//!
//! Each transaction moves `FETCHED → CHECKED → {SKIPPED | CLASSIFIED →
//! ALLOCATED → COMMITTED}`. Skips are normal terminal states; every
//! outcome produces one log record with enough context to audit or replay.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;

use crate::config::SourceProfile;
use crate::reconcile::allocate::SplitAllocator;
use crate::reconcile::key::derive_key;
use crate::reconcile::router::AccountRouter;
use crate::traits::{LedgerStore, TransactionFeed};
use crate::types::*;

/// Counts and warnings for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Records fetched from the source
    pub fetched: usize,
    /// New ledger entries committed
    pub committed: usize,
    /// Records skipped (already recorded, unresolvable, deferred, ...)
    pub skipped: usize,
    /// Warnings raised while allocating (e.g. loan table misses)
    pub warnings: Vec<String>,
}

/// One line of the bank statement stream, as received on stdin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankLineRecord {
    pub date: DateTime<chrono::FixedOffset>,
    pub description: String,
    /// Signed amount in minor units, as on the statement
    pub amount: i64,
    /// Ledger path of the transfer account, supplied by the upstream feed
    pub transfer_account: String,
}

impl BankLineRecord {
    fn into_transaction(self) -> ExternalTransaction {
        ExternalTransaction {
            external_id: None,
            timestamp: self.date,
            amount_minor: self.amount,
            fee_minor: 0,
            net_minor: self.amount,
            kind: SourceKind::BankLine,
            description: self.description,
            metadata: TransactionMetadata {
                transfer_account: Some(self.transfer_account),
                ..Default::default()
            },
        }
    }
}

/// Orchestrates reconciliation of one source into the ledger store.
///
/// Single-threaded and run-to-completion: the importer assumes exclusive
/// write access to the store for the duration of a run.
pub struct LedgerImporter<S: LedgerStore> {
    store: S,
    router: AccountRouter,
    allocator: SplitAllocator,
    profile: SourceProfile,
    pending_warnings: Vec<String>,
}

impl<S: LedgerStore> LedgerImporter<S> {
    pub fn new(
        store: S,
        router: AccountRouter,
        allocator: SplitAllocator,
        profile: SourceProfile,
    ) -> Self {
        Self {
            store,
            router,
            allocator,
            profile,
            pending_warnings: Vec::new(),
        }
    }

    /// Read access to the underlying store (reports, assertions).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back when the importer is done.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Run one transaction through the state machine.
    pub async fn import_one(&mut self, tx: &ExternalTransaction) -> ReconcileResult<ImportOutcome> {
        let metadata = tx.metadata.clone();
        self.import_with_metadata(tx, &metadata).await
    }

    /// Like [`import_one`](Self::import_one) but routed against explicitly
    /// supplied metadata (originating-charge substitution for adjustments).
    pub async fn import_with_metadata(
        &mut self,
        tx: &ExternalTransaction,
        metadata: &TransactionMetadata,
    ) -> ReconcileResult<ImportOutcome> {
        let key = derive_key(tx);

        // FETCHED -> CHECKED: the idempotency gate
        if self.store.find_entry_by_key(&key).await?.is_some() {
            info!("SKIPPED: {}", key);
            return Ok(ImportOutcome::Skipped {
                key,
                reason: SkipReason::AlreadyRecorded,
            });
        }

        // CHECKED -> CLASSIFIED
        let dest_account = match self.router.route_with(tx, metadata) {
            Ok(path) => path,
            Err(reason) => {
                info!("SKIPPED: {}, {}", key, reason);
                return Ok(ImportOutcome::Skipped { key, reason });
            }
        };

        // CLASSIFIED -> ALLOCATED
        let allocation = self.allocator.allocate(tx, &self.profile, &dest_account)?;
        if let Some(warning) = &allocation.warning {
            self.pending_warnings.push(warning.clone());
        }

        // Every posted-to account must already exist; nothing is ever
        // auto-created, and a missing account skips the transaction with a
        // warning rather than dropping it silently. An account denominated
        // in a different currency than the source is an operator setup
        // defect and aborts the run before any value is mis-stated.
        for split in &allocation.splits {
            match self.store.resolve_account(&split.account).await? {
                None => {
                    warn!("WARNING: unable to find account {} for {}", split.account, key);
                    return Ok(ImportOutcome::Skipped {
                        key,
                        reason: SkipReason::AccountMissing(split.account.clone()),
                    });
                }
                Some(account) if account.currency != self.profile.currency => {
                    return Err(ReconcileError::Config(format!(
                        "account {} is denominated in {}, source {} posts {}",
                        account.path,
                        account.currency,
                        self.profile.source_name,
                        self.profile.currency
                    )));
                }
                Some(_) => {}
            }
        }

        // ALLOCATED -> COMMITTED
        let entry = LedgerEntry {
            currency: self.profile.currency.clone(),
            enter_date: tx.timestamp,
            post_date: tx.timestamp.date_naive(),
            external_key: key.clone(),
            description: tx.description.clone(),
            splits: allocation.splits,
        };
        entry.validate()?;
        self.store.commit_entry(&entry).await?;

        info!(
            "COMMITTED: {}, {}, {}",
            key, entry.post_date, entry.description
        );
        Ok(ImportOutcome::Committed { key })
    }

    /// Import one fetched page sequentially, then flush once.
    ///
    /// Partial-failure tolerant: a skipped transaction never stops the
    /// batch. Only rules-engine defects and store failures abort.
    pub async fn import_page(
        &mut self,
        transactions: &[ExternalTransaction],
    ) -> ReconcileResult<BatchSummary> {
        let mut summary = BatchSummary {
            fetched: transactions.len(),
            ..Default::default()
        };

        for tx in transactions {
            match self.import_one(tx).await? {
                ImportOutcome::Committed { .. } => summary.committed += 1,
                ImportOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }

        self.store.save().await?;
        summary.warnings = std::mem::take(&mut self.pending_warnings);
        Ok(summary)
    }

    /// Full reconciliation run against a paginated batch source.
    ///
    /// Fetches one page from the watermark's 24-hour-overlap lower bound;
    /// a fetch failure aborts before any ledger mutation, leaving the
    /// watermark untouched and the run safe to repeat. The watermark only
    /// advances (to `now`) after the page committed and flushed cleanly.
    pub async fn reconcile_feed<F: TransactionFeed>(
        &mut self,
        feed: &F,
        watermark: &mut ImportWatermark,
        now: DateTime<Utc>,
    ) -> ReconcileResult<BatchSummary> {
        let lower_bound = watermark.fetch_lower_bound();
        info!(
            "Importing {} transactions since {}",
            feed.source_name(),
            lower_bound
        );

        let page = feed.list_since(lower_bound).await?;
        info!(
            "Fetched {} transactions from {}",
            page.len(),
            feed.source_name()
        );
        if page.is_empty() {
            info!("No transactions to import");
            return Ok(BatchSummary::default());
        }

        let mut summary = BatchSummary {
            fetched: page.len(),
            ..Default::default()
        };

        for tx in &page {
            let metadata = self.adjustment_metadata(feed, tx).await;
            match self.import_with_metadata(tx, &metadata).await? {
                ImportOutcome::Committed { .. } => summary.committed += 1,
                ImportOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }

        self.store.save().await?;
        watermark.advance(now);
        summary.warnings = std::mem::take(&mut self.pending_warnings);
        Ok(summary)
    }

    /// Metadata to route a record with: for positive-net adjustments, the
    /// originating charge's metadata when the feed can supply it.
    async fn adjustment_metadata<F: TransactionFeed>(
        &self,
        feed: &F,
        tx: &ExternalTransaction,
    ) -> TransactionMetadata {
        if tx.kind == SourceKind::CardAdjustment && tx.net_minor > 0 {
            if let Some(charge_id) = &tx.metadata.origin_charge_id {
                match feed.retrieve_origin(charge_id).await {
                    Ok(Some(origin)) => return origin,
                    Ok(None) => {}
                    Err(e) => {
                        warn!("WARNING: could not retrieve origin charge {}: {}", charge_id, e);
                    }
                }
            }
        }
        tx.metadata.clone()
    }

    /// Process one JSON bank-statement line and flush immediately.
    ///
    /// Streaming discipline: each line is committed and durably saved
    /// before the next one is read, so a crash mid-run loses nothing and a
    /// rerun re-skips committed lines through the idempotency check. The
    /// returned string is the JSON-encoded status for stdout.
    pub async fn import_bank_line(&mut self, line: &str) -> ReconcileResult<String> {
        let record: BankLineRecord = serde_json::from_str(line)
            .map_err(|e| ReconcileError::MalformedInput(format!("bank line: {}", e)))?;
        let tx = record.into_transaction();

        let outcome = self.import_one(&tx).await?;
        let status = match &outcome {
            ImportOutcome::Committed { key } => {
                self.store.save().await?;
                format!("Imported: {}", key)
            }
            ImportOutcome::Skipped {
                key,
                reason: SkipReason::AlreadyRecorded,
            } => format!("Skipped already recorded: {}", key),
            ImportOutcome::Skipped { reason, .. } => {
                format!("Transaction not imported: {}", reason)
            }
        };

        serde_json::to_string(&status)
            .map_err(|e| ReconcileError::MalformedInput(format!("status encoding: {}", e)))
    }
}
