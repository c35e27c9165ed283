//! Account routing: transaction metadata to destination account path

use crate::config::RouteTable;
use crate::types::{ExternalTransaction, SkipReason, SourceKind, TransactionMetadata};

/// Maps a classified external transaction to the ledger account its
/// counter-split should post to.
///
/// Pure and deterministic: the same transaction always routes to the same
/// path. Routing never checks that the path exists; the importer resolves
/// it against the store and skips with a warning when it does not.
pub struct AccountRouter {
    table: RouteTable,
}

impl AccountRouter {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    /// Route a transaction using its own metadata.
    pub fn route(&self, tx: &ExternalTransaction) -> Result<String, SkipReason> {
        self.route_with(tx, &tx.metadata)
    }

    /// Route a transaction against explicitly supplied metadata.
    ///
    /// Positive-net card adjustments are routed against the originating
    /// charge's metadata, which the importer fetches and passes in here.
    pub fn route_with(
        &self,
        tx: &ExternalTransaction,
        metadata: &TransactionMetadata,
    ) -> Result<String, SkipReason> {
        match tx.kind {
            // Bank lines carry the destination from the upstream feed.
            // Resolved as-is: no classification heuristics, no auto-create.
            SourceKind::BankLine => metadata
                .transfer_account
                .clone()
                .ok_or_else(|| SkipReason::FeedAnomaly("bank line without transfer account".into())),

            // Payouts show up on the bank statement and are recorded there
            SourceKind::CardPayout => Err(SkipReason::PayoutDeferred),

            SourceKind::CardCharge => Ok(self.classify(metadata).to_string()),

            SourceKind::CardAdjustment | SourceKind::PosChargeback => {
                if tx.net_minor < 0 {
                    Ok(self.table.miscellaneous_account.clone())
                } else if tx.kind == SourceKind::PosChargeback {
                    Ok(self.table.pos_default_account.clone())
                } else {
                    Ok(self.classify(metadata).to_string())
                }
            }

            SourceKind::CardRefund | SourceKind::PosRefund => {
                Ok(self.table.miscellaneous_account.clone())
            }

            SourceKind::PosPayment => Ok(self.table.pos_default_account.clone()),
        }
    }

    /// Rule precedence for charge-like records, first match wins:
    /// category tag, then known descriptor, then the donations default.
    fn classify<'a>(&'a self, metadata: &TransactionMetadata) -> &'a str {
        for tag_key in ["type", "purpose"] {
            if let Some(value) = metadata.tag(tag_key) {
                if let Some(account) = self.table.category_account(value) {
                    return account;
                }
            }
        }

        if let Some(descriptor) = &metadata.statement_descriptor {
            if let Some(account) = self.table.descriptor_account(descriptor) {
                return account;
            }
        }
        if let Some(suffix) = &metadata.descriptor_suffix {
            if let Some(account) = self.table.descriptor_account(suffix) {
                return account;
            }
        }

        &self.table.donations_account
    }
}
