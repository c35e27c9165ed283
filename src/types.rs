//! Core types and data structures for the reconciliation engine

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Where an external transaction record came from, and what shape it has.
///
/// Each payment source reports its own closed set of record types; keeping
/// them in one enum lets the router and allocator dispatch exhaustively
/// instead of comparing type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Card processor charge (gross/fee/net all populated)
    CardCharge,
    /// Card processor balance adjustment
    CardAdjustment,
    /// Card processor refund
    CardRefund,
    /// Card processor payout to the bank account
    CardPayout,
    /// Point-of-sale aggregator payment
    PosPayment,
    /// Point-of-sale chargeback
    PosChargeback,
    /// Point-of-sale refund
    PosRefund,
    /// One line of the bank statement stream
    BankLine,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::CardCharge => "card-charge",
            SourceKind::CardAdjustment => "card-adjustment",
            SourceKind::CardRefund => "card-refund",
            SourceKind::CardPayout => "card-payout",
            SourceKind::PosPayment => "pos-payment",
            SourceKind::PosChargeback => "pos-chargeback",
            SourceKind::PosRefund => "pos-refund",
            SourceKind::BankLine => "bank-line",
        };
        write!(f, "{}", name)
    }
}

/// Free-form metadata carried alongside an external transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Statement descriptor as shown to the payer
    pub statement_descriptor: Option<String>,
    /// Descriptor suffix, where the processor splits it out
    pub descriptor_suffix: Option<String>,
    /// Arbitrary key/value tags attached at payment time
    pub tags: HashMap<String, String>,
    /// Destination account path supplied by the upstream feed (bank lines)
    pub transfer_account: Option<String>,
    /// Identifier of the originating charge, for adjustments and refunds
    pub origin_charge_id: Option<String>,
}

impl TransactionMetadata {
    /// Look up a tag value, case-insensitive on the key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// One transaction record as fetched from an external payment source.
///
/// Immutable once fetched. All amounts are signed integer minor currency
/// units (pence); conversion to major units happens at allocation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTransaction {
    /// Native transaction identifier, when the source provides one
    pub external_id: Option<String>,
    /// When the transaction occurred, with the source's timezone offset
    pub timestamp: DateTime<FixedOffset>,
    /// Gross amount in minor units as the source reports it: positive for
    /// card/POS charges, signed as on the statement for bank lines
    pub amount_minor: i64,
    /// Processor fee in minor units
    pub fee_minor: i64,
    /// Net amount in minor units (`gross - fee` for charge-like records)
    pub net_minor: i64,
    /// What kind of record this is
    pub kind: SourceKind,
    /// Free-text description for the ledger entry
    pub description: String,
    /// Source-specific metadata
    pub metadata: TransactionMetadata,
}

/// Ledger account classification, mirroring the external store's types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Asset,
    Income,
    Expense,
    Liability,
    /// The store's imbalance account for the reporting currency
    Imbalance,
}

/// A ledger account, owned by the external store.
///
/// The engine only ever resolves accounts by full path and reads balances;
/// it never creates or mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Full colon-separated hierarchical path, e.g. `Income:Donations`
    pub path: String,
    /// Leaf name (the last path segment)
    pub name: String,
    /// Account classification
    pub account_type: AccountType,
    /// Placeholder accounts only group children and carry no own postings
    pub placeholder: bool,
    /// Reporting currency code
    pub currency: String,
}

impl Account {
    pub fn new(path: impl Into<String>, account_type: AccountType) -> Self {
        let path = path.into();
        let name = path.rsplit(':').next().unwrap_or(path.as_str()).to_string();
        Self {
            path,
            name,
            account_type,
            placeholder: false,
            currency: "GBP".to_string(),
        }
    }

    /// Path of the parent account, if this is not a top-level account.
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once(':').map(|(parent, _)| parent)
    }
}

/// One signed-value line within a balanced ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    /// Full path of the account this split posts to
    pub account: String,
    /// Signed value in major units, scale 2
    pub value: BigDecimal,
}

impl Split {
    pub fn new(account: impl Into<String>, value: BigDecimal) -> Self {
        Self {
            account: account.into(),
            value: value.with_scale(2),
        }
    }

    /// Build a split directly from a signed minor-unit amount.
    pub fn from_minor(account: impl Into<String>, minor: i64) -> Self {
        Self::new(account, minor_to_major(minor))
    }
}

/// A committed double-entry ledger transaction.
///
/// Created exactly once per unique external key and never mutated or
/// deleted by this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Reporting currency code
    pub currency: String,
    /// Effective timestamp of the underlying transaction
    pub enter_date: DateTime<FixedOffset>,
    /// Posting date in the ledger
    pub post_date: NaiveDate,
    /// Unique external key, the sole idempotency token
    pub external_key: String,
    /// Free-text description
    pub description: String,
    /// Ordered splits; at least two, summing to exactly zero
    pub splits: Vec<Split>,
}

impl LedgerEntry {
    /// Sum of all split values. Zero for a well-formed entry.
    pub fn split_sum(&self) -> BigDecimal {
        self.splits.iter().map(|s| &s.value).sum()
    }

    /// Validate the double-entry invariants before commit.
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.splits.len() < 2 {
            return Err(ReconcileError::InvalidEntry(format!(
                "entry {} needs at least two splits, got {}",
                self.external_key,
                self.splits.len()
            )));
        }

        let sum = self.split_sum();
        if sum != BigDecimal::from(0) {
            return Err(ReconcileError::UnbalancedSplits(format!(
                "entry {} splits sum to {}, expected 0",
                self.external_key, sum
            )));
        }

        Ok(())
    }
}

/// Per-source reconciliation progress marker.
///
/// Persisted externally by the operator; the engine only reads the fetch
/// lower bound and advances the timestamp after a clean run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportWatermark {
    /// Source label, e.g. `"stripe"`
    pub source: String,
    /// Timestamp of the last successful run
    pub last_run: DateTime<Utc>,
}

impl ImportWatermark {
    pub fn new(source: impl Into<String>, last_run: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            last_run,
        }
    }

    /// Lower bound for the next fetch: 24 hours before the last run.
    ///
    /// Every run re-requests a one-day overlap window and relies on the
    /// idempotency check, not this watermark, for exactness. The overlap
    /// tolerates settlement-timestamp jitter and out-of-order arrival.
    pub fn fetch_lower_bound(&self) -> DateTime<Utc> {
        self.last_run - Duration::days(1)
    }

    /// Advance after a clean run.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_run = now;
    }
}

/// Convert a signed minor-unit amount to major units at scale 2.
///
/// Exact base-10 construction; no binary floating point anywhere in the
/// money path.
pub fn minor_to_major(minor: i64) -> BigDecimal {
    BigDecimal::new(BigInt::from(minor), 2)
}

/// Why a transaction was skipped rather than committed.
///
/// Skips are normal outcomes, not errors: each one is logged with enough
/// context to audit or replay, and batch processing continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An entry with this external key already exists in the ledger
    AlreadyRecorded,
    /// The target account does not exist in the ledger store
    AccountMissing(String),
    /// Card payouts are recorded when they appear in the bank feed instead
    PayoutDeferred,
    /// The feed returned a structurally unusable record, including records
    /// whose source-reported type has no [`SourceKind`] mapping
    FeedAnomaly(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyRecorded => write!(f, "already recorded"),
            SkipReason::AccountMissing(path) => write!(f, "unable to find account: {}", path),
            SkipReason::PayoutDeferred => write!(f, "payout deferred to bank feed"),
            SkipReason::FeedAnomaly(reason) => write!(f, "feed anomaly: {}", reason),
        }
    }
}

/// Terminal state of one transaction through the import state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// A new ledger entry was committed under this key
    Committed { key: String },
    /// The transaction was skipped; the ledger is untouched
    Skipped { key: String, reason: SkipReason },
}

impl ImportOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ImportOutcome::Committed { .. })
    }

    /// The external key this outcome refers to.
    pub fn key(&self) -> &str {
        match self {
            ImportOutcome::Committed { key } => key,
            ImportOutcome::Skipped { key, .. } => key,
        }
    }
}

/// Errors that abort reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(String),
    #[error("Feed error: {0}")]
    Feed(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
    #[error("Unbalanced splits: {0}")]
    UnbalancedSplits(String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
