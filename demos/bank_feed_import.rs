//! Streaming bank-statement import demo.
//!
//! Reads one JSON bank line per stdin line, e.g.
//! `{"date":"2024-03-01T00:00:00+00:00","description":"HSBC RENT","amount":-5000,"transferAccount":"Expenses:Bizspace Rent:F6"}`
//! and prints the JSON-encoded status for each. Run with:
//!
//! ```text
//! cat statement.jsonl | cargo run --example bank_feed_import
//! ```

use std::collections::HashMap;
use std::io::{self, BufRead};

use log::error;
use reconcile_core::{
    Account, AccountRouter, AccountType, AllocationConfig, LedgerImporter,
    LoanRepaymentTable, MembershipThreshold, MemoryStore, RentSchedule,
    RepaymentSplit, RouteTable, SourceProfile, SplitAllocator,
};

fn demo_store() -> MemoryStore {
    MemoryStore::with_accounts([
        Account::new("Assets:Current Assets:TSB Account", AccountType::Asset),
        Account::new("Assets:Current Assets:Stripe", AccountType::Asset),
        Account::new("Income:Membership Payments", AccountType::Income),
        Account::new("Income:Donations:Membership Payments", AccountType::Income),
        Account::new("Income:Snackspace", AccountType::Income),
        Account::new("Expenses:Bizspace Rent:F6", AccountType::Expense),
        Account::new("Expenses:Bizspace Rent:G4,5,6", AccountType::Expense),
        Account::new("Expenses:Utilities:Electric", AccountType::Expense),
        Account::new("Expenses:Miscellaneous", AccountType::Expense),
        Account::new("Liabilities:Member Loans", AccountType::Liability),
        Account::new("Expenses:Loan Interest", AccountType::Expense),
    ])
}

fn demo_config() -> AllocationConfig {
    AllocationConfig {
        rent: RentSchedule {
            primary_account: "Expenses:Bizspace Rent:F6".to_string(),
            secondary_account: "Expenses:Bizspace Rent:G4,5,6".to_string(),
            electric_account: "Expenses:Utilities:Electric".to_string(),
            primary_minor: 44400,
            secondary_minor: 102000,
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

fn demo_routes() -> RouteTable {
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

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = demo_config();
    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    let profile = SourceProfile {
        source_name: "bank".to_string(),
        source_account: "Assets:Current Assets:TSB Account".to_string(),
        fee_account: "Expenses:Bank Service Charge".to_string(),
        currency: "GBP".to_string(),
    };

    let mut importer = LedgerImporter::new(
        demo_store(),
        AccountRouter::new(demo_routes()),
        SplitAllocator::new(config),
        profile,
    );

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        // a bad line is reported and the stream keeps going
        match importer.import_bank_line(&line).await {
            Ok(status) => println!("{}", status),
            Err(e) => {
                error!("{}", e);
                println!("\"Transaction not imported: {}\"", e);
            }
        }
    }

    let store = importer.into_store();
    println!("{} entries committed", store.entry_count());
}
