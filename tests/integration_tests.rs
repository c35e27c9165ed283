//! Integration tests for reconcile-core

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;

use reconcile_core::report::{monthly_summary, vat_snapshot, ReportAccounts};
use reconcile_core::{
    Account, AccountRouter, AccountType, AllocationConfig, ExternalTransaction,
    ImportOutcome, ImportWatermark, LedgerImporter, LedgerStore,
    LoanRepaymentTable, MembershipThreshold, MemoryStore, ReconcileError,
    ReconcileResult,
    RentSchedule, RepaymentSplit, RouteTable, SkipReason, SourceKind,
    SourceProfile, SplitAllocator, TransactionFeed, TransactionMetadata,
    minor_to_major,
};

fn seeded_store() -> MemoryStore {
    MemoryStore::with_accounts([
        Account::new("Assets", AccountType::Asset),
        Account::new("Assets:Current Assets", AccountType::Asset),
        Account::new("Assets:Current Assets:TSB Account", AccountType::Asset),
        Account::new("Assets:Current Assets:Stripe", AccountType::Asset),
        Account::new("Assets:Other Assets", AccountType::Asset),
        Account::new("Income", AccountType::Income),
        Account::new("Income:Donations", AccountType::Income),
        Account::new("Income:Donations:Membership Payments", AccountType::Income),
        Account::new("Income:Membership Payments", AccountType::Income),
        Account::new("Income:Snackspace", AccountType::Income),
        Account::new("Expenses", AccountType::Expense),
        Account::new("Expenses:Bank Service Charge", AccountType::Expense),
        Account::new("Expenses:Bizspace Rent", AccountType::Expense),
        Account::new("Expenses:Bizspace Rent:F6", AccountType::Expense),
        Account::new("Expenses:Bizspace Rent:G4,5,6", AccountType::Expense),
        Account::new("Expenses:Utilities:Electric", AccountType::Expense),
        Account::new("Expenses:Miscellaneous", AccountType::Expense),
        Account::new("Expenses:Loan Interest", AccountType::Expense),
        Account::new("Liabilities:Member Loans", AccountType::Liability),
        Account::new("Imbalance-GBP", AccountType::Imbalance),
    ])
}

fn allocation_config() -> AllocationConfig {
    AllocationConfig {
        rent: RentSchedule {
            primary_account: "Expenses:Bizspace Rent:F6".to_string(),
            secondary_account: "Expenses:Bizspace Rent:G4,5,6".to_string(),
            electric_account: "Expenses:Utilities:Electric".to_string(),
            primary_minor: 1000,
            secondary_minor: 1500,
        },
        membership: MembershipThreshold {
            income_account: "Income:Membership Payments".to_string(),
            donations_account: "Income:Donations:Membership Payments".to_string(),
            minimum_minor: 500,
        },
        loan: LoanRepaymentTable {
            liability_account: "Liabilities:Member Loans".to_string(),
            interest_account: "Expenses:Loan Interest".to_string(),
            amounts: HashMap::from([(
                -12083,
                RepaymentSplit {
                    principal_minor: 11000,
                    interest_minor: 1083,
                },
            )]),
        },
    }
}

fn route_table() -> RouteTable {
    RouteTable {
        categories: HashMap::from([(
            "snackspace".to_string(),
            "Income:Snackspace".to_string(),
        )]),
        descriptors: HashMap::new(),
        donations_account: "Income:Donations".to_string(),
        miscellaneous_account: "Expenses:Miscellaneous".to_string(),
        pos_default_account: "Income:Snackspace".to_string(),
    }
}

fn stripe_profile() -> SourceProfile {
    SourceProfile {
        source_name: "stripe".to_string(),
        source_account: "Assets:Current Assets:Stripe".to_string(),
        fee_account: "Expenses:Bank Service Charge".to_string(),
        currency: "GBP".to_string(),
    }
}

fn bank_profile() -> SourceProfile {
    SourceProfile {
        source_name: "tsb".to_string(),
        source_account: "Assets:Current Assets:TSB Account".to_string(),
        fee_account: "Expenses:Bank Service Charge".to_string(),
        currency: "GBP".to_string(),
    }
}

fn timestamp(day: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 3, day, 10, 0, 0)
        .unwrap()
}

fn card_charge(id: &str, day: u32, amount_minor: i64, fee_minor: i64) -> ExternalTransaction {
    ExternalTransaction {
        external_id: Some(id.to_string()),
        timestamp: timestamp(day),
        amount_minor,
        fee_minor,
        net_minor: amount_minor - fee_minor,
        kind: SourceKind::CardCharge,
        description: "card charge".to_string(),
        metadata: TransactionMetadata::default(),
    }
}

fn bank_line(day: u32, amount_minor: i64, transfer_account: &str) -> ExternalTransaction {
    ExternalTransaction {
        external_id: None,
        timestamp: timestamp(day),
        amount_minor,
        fee_minor: 0,
        net_minor: amount_minor,
        kind: SourceKind::BankLine,
        description: format!("bank line {}", day),
        metadata: TransactionMetadata {
            transfer_account: Some(transfer_account.to_string()),
            ..Default::default()
        },
    }
}

/// Canned feed: one fixed page, optional origin metadata, optional failure.
struct FixedFeed {
    transactions: Vec<ExternalTransaction>,
    origins: HashMap<String, TransactionMetadata>,
    fail: bool,
}

impl FixedFeed {
    fn new(transactions: Vec<ExternalTransaction>) -> Self {
        Self {
            transactions,
            origins: HashMap::new(),
            fail: false,
        }
    }
}

#[async_trait]
impl TransactionFeed for FixedFeed {
    fn source_name(&self) -> &str {
        "stripe"
    }

    async fn list_since(
        &self,
        lower_bound: DateTime<Utc>,
    ) -> ReconcileResult<Vec<ExternalTransaction>> {
        if self.fail {
            return Err(ReconcileError::Feed("connection reset".to_string()));
        }
        Ok(self
            .transactions
            .iter()
            .filter(|tx| tx.timestamp.to_utc() > lower_bound)
            .cloned()
            .collect())
    }

    async fn retrieve_origin(
        &self,
        charge_id: &str,
    ) -> ReconcileResult<Option<TransactionMetadata>> {
        Ok(self.origins.get(charge_id).cloned())
    }
}

fn stripe_importer(store: MemoryStore) -> LedgerImporter<MemoryStore> {
    LedgerImporter::new(
        store,
        AccountRouter::new(route_table()),
        SplitAllocator::new(allocation_config()),
        stripe_profile(),
    )
}

fn bank_importer(store: MemoryStore) -> LedgerImporter<MemoryStore> {
    LedgerImporter::new(
        store,
        AccountRouter::new(route_table()),
        SplitAllocator::new(allocation_config()),
        bank_profile(),
    )
}

#[tokio::test]
async fn test_repeated_import_is_idempotent() {
    let mut importer = stripe_importer(seeded_store());
    let page = vec![card_charge("txn_1", 1, 500, 20)];

    let first = importer.import_page(&page).await.unwrap();
    assert_eq!(first.committed, 1);
    assert_eq!(first.skipped, 0);

    // full overlap re-fetch: everything skips, nothing duplicates
    let second = importer.import_page(&page).await.unwrap();
    assert_eq!(second.committed, 0);
    assert_eq!(second.skipped, 1);

    let store = importer.into_store();
    assert_eq!(store.entry_count(), 1);
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn test_skip_does_not_stop_the_batch() {
    let mut importer = bank_importer(seeded_store());
    let page = vec![
        bank_line(1, -2000, "Expenses:Miscellaneous"),
        bank_line(2, -3000, "Expenses:Does Not Exist"),
        bank_line(3, 500, "Income:Membership Payments"),
    ];

    let summary = importer.import_page(&page).await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(importer.store().entry_count(), 2);
}

#[tokio::test]
async fn test_missing_account_skip_reason() {
    let mut importer = bank_importer(seeded_store());
    let tx = bank_line(1, -3000, "Expenses:Does Not Exist");

    let outcome = importer.import_one(&tx).await.unwrap();
    match outcome {
        ImportOutcome::Skipped {
            reason: SkipReason::AccountMissing(path),
            ..
        } => assert_eq!(path, "Expenses:Does Not Exist"),
        other => panic!("expected account-missing skip, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reconcile_feed_advances_watermark() {
    let mut importer = stripe_importer(seeded_store());
    let feed = FixedFeed::new(vec![
        card_charge("txn_1", 1, 500, 20),
        card_charge("txn_2", 2, 700, 25),
    ]);

    let last_run = Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
    let mut watermark = ImportWatermark::new("stripe", last_run);

    let summary = importer
        .reconcile_feed(&feed, &mut watermark, now)
        .await
        .unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.committed, 2);
    assert_eq!(watermark.last_run, now);
    assert_eq!(importer.store().save_count(), 1);
}

#[tokio::test]
async fn test_fetch_failure_aborts_before_any_mutation() {
    let mut importer = stripe_importer(seeded_store());
    let mut feed = FixedFeed::new(vec![card_charge("txn_1", 1, 500, 20)]);
    feed.fail = true;

    let last_run = Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
    let mut watermark = ImportWatermark::new("stripe", last_run);

    let result = importer.reconcile_feed(&feed, &mut watermark, now).await;
    assert!(matches!(result, Err(ReconcileError::Feed(_))));

    // safe to rerun: nothing committed, nothing flushed, watermark untouched
    assert_eq!(watermark.last_run, last_run);
    let store = importer.into_store();
    assert_eq!(store.entry_count(), 0);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_empty_page_leaves_watermark() {
    let mut importer = stripe_importer(seeded_store());
    let feed = FixedFeed::new(vec![]);

    let last_run = Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
    let mut watermark = ImportWatermark::new("stripe", last_run);

    let summary = importer
        .reconcile_feed(&feed, &mut watermark, now)
        .await
        .unwrap();
    assert_eq!(summary.fetched, 0);
    assert_eq!(watermark.last_run, last_run);
}

#[tokio::test]
async fn test_positive_adjustment_uses_origin_charge_category() {
    let mut importer = stripe_importer(seeded_store());

    let mut adjustment = card_charge("adj_1", 3, 100, 0);
    adjustment.kind = SourceKind::CardAdjustment;
    adjustment.metadata.origin_charge_id = Some("txn_9".to_string());

    let mut feed = FixedFeed::new(vec![adjustment]);
    let mut origin = TransactionMetadata::default();
    origin
        .tags
        .insert("type".to_string(), "snackspace".to_string());
    feed.origins.insert("txn_9".to_string(), origin);

    let last_run = Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
    let mut watermark = ImportWatermark::new("stripe", last_run);

    let summary = importer
        .reconcile_feed(&feed, &mut watermark, now)
        .await
        .unwrap();
    assert_eq!(summary.committed, 1);

    let store = importer.into_store();
    let entry = store.find_entry_by_key("adj_1").await.unwrap().unwrap();
    assert!(entry
        .splits
        .iter()
        .any(|s| s.account == "Income:Snackspace"));
}

#[tokio::test]
async fn test_payouts_are_deferred_to_the_bank_feed() {
    let mut importer = stripe_importer(seeded_store());
    let mut payout = card_charge("po_1", 4, 10000, 0);
    payout.kind = SourceKind::CardPayout;

    let outcome = importer.import_one(&payout).await.unwrap();
    assert_eq!(
        outcome,
        ImportOutcome::Skipped {
            key: "po_1".to_string(),
            reason: SkipReason::PayoutDeferred,
        }
    );
    assert_eq!(importer.store().entry_count(), 0);
}

#[tokio::test]
async fn test_cross_currency_account_aborts_the_run() {
    let store = seeded_store();
    store.add_account(Account {
        currency: "USD".to_string(),
        ..Account::new("Expenses:Overseas", AccountType::Expense)
    });
    let mut importer = bank_importer(store);
    let tx = bank_line(1, -3000, "Expenses:Overseas");

    let result = importer.import_one(&tx).await;
    assert!(matches!(result, Err(ReconcileError::Config(_))));
    assert_eq!(importer.store().entry_count(), 0);
}

#[tokio::test]
async fn test_loan_table_miss_warning_reaches_the_summary() {
    let mut importer = bank_importer(seeded_store());
    let page = vec![bank_line(10, -12084, "Liabilities:Member Loans")];

    let summary = importer.import_page(&page).await.unwrap();
    assert_eq!(summary.committed, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].contains("repayment table"));
}

#[tokio::test]
async fn test_bank_line_stream_statuses() {
    let mut importer = bank_importer(seeded_store());
    let line = r#"{"date":"2024-03-01T00:00:00+00:00","description":"HSBC RENT","amount":-5000,"transferAccount":"Expenses:Bizspace Rent:F6"}"#;

    let status = importer.import_bank_line(line).await.unwrap();
    assert!(status.starts_with("\"Imported: "));
    assert_eq!(importer.store().save_count(), 1);

    // replaying the statement skips without flushing again
    let status = importer.import_bank_line(line).await.unwrap();
    assert!(status.starts_with("\"Skipped already recorded: "));
    assert_eq!(importer.store().save_count(), 1);

    let missing = r#"{"date":"2024-03-02T00:00:00+00:00","description":"MYSTERY","amount":-100,"transferAccount":"Expenses:Does Not Exist"}"#;
    let status = importer.import_bank_line(missing).await.unwrap();
    assert!(status.contains("Transaction not imported"));

    let malformed = r#"{"date":"yesterday"}"#;
    let result = importer.import_bank_line(malformed).await;
    assert!(matches!(result, Err(ReconcileError::MalformedInput(_))));

    assert_eq!(importer.store().entry_count(), 1);
}

#[tokio::test]
async fn test_rent_pre_split_posts_all_components() {
    let mut importer = bank_importer(seeded_store());
    let tx = bank_line(1, -5000, "Expenses:Bizspace Rent:F6");

    let outcome = importer.import_one(&tx).await.unwrap();
    assert!(outcome.is_committed());

    let store = importer.into_store();
    let entry = store
        .find_entry_by_key(outcome.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.splits.len(), 4);
    assert_eq!(entry.split_sum(), BigDecimal::from(0));

    let at = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
    let electric = store
        .get_balance("Expenses:Utilities:Electric", at, false)
        .await
        .unwrap();
    assert_eq!(electric, minor_to_major(2500));
}

#[tokio::test]
async fn test_reports_over_a_reconciled_month() {
    let mut importer = bank_importer(seeded_store());
    let page = vec![
        bank_line(1, 500, "Income:Membership Payments"),
        bank_line(2, 750, "Income:Membership Payments"),
        bank_line(3, -5000, "Expenses:Bizspace Rent:F6"),
    ];
    let summary = importer.import_page(&page).await.unwrap();
    assert_eq!(summary.committed, 3);

    let store = importer.into_store();
    let in_march = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

    let snapshot = vat_snapshot(&store, in_march).await.unwrap();
    assert_eq!(
        snapshot.month_end,
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    );
    let membership = snapshot
        .rows
        .iter()
        .find(|row| row.account == "Income:Membership Payments")
        .unwrap();
    // 500 at the threshold plus the 500 base of the 750 payment
    assert_eq!(membership.delta, minor_to_major(1000));
    let donations = snapshot
        .rows
        .iter()
        .find(|row| row.account == "Income:Donations:Membership Payments")
        .unwrap();
    assert_eq!(donations.delta, minor_to_major(250));

    let monthly = monthly_summary(&store, in_march, &ReportAccounts::default())
        .await
        .unwrap();
    assert_eq!(monthly.total_revenue, minor_to_major(1250));
    assert_eq!(monthly.total_expenses, minor_to_major(5000));
    assert_eq!(monthly.net, minor_to_major(1250 - 5000));

    // bank in minus rent out: 1250 - 5000
    assert_eq!(monthly.overall_assets, minor_to_major(-3750));
}
